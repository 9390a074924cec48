use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use transport::{DebugProcess, Logger, ProcessProvider, ResponseSink};

use crate::state::{DebuggerState, Event};
use crate::types::{Breakpoint, BreakpointId};

pub(crate) struct DebuggerInternals {
    events: crossbeam_channel::Sender<Event>,
    state: Mutex<DebuggerState>,
    breakpoints: Mutex<BreakpointStore>,
}

#[derive(Default)]
struct BreakpointStore {
    current_id: BreakpointId,
    by_id: HashMap<BreakpointId, Breakpoint>,
}

impl DebuggerInternals {
    pub(crate) fn new(events: crossbeam_channel::Sender<Event>) -> Self {
        Self {
            events,
            state: Mutex::new(DebuggerState::Initialised),
            breakpoints: Mutex::new(BreakpointStore::default()),
        }
    }

    pub(crate) fn set_state(&self, new_state: DebuggerState) {
        let event = Event::from(&new_state);
        *self.state.lock().unwrap() = new_state;
        self.publish(event);
    }

    fn publish(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Decode one status line into debugger state.
    ///
    /// `200 OK` is an acknowledgement and carries no state of its own; run
    /// state changes when we issue the resume command, not when it is acked.
    pub(crate) fn on_resp(&self, code: i32, context: Option<&str>) {
        match code {
            200 => tracing::debug!("command acknowledged"),
            202 | 203 => match context.and_then(parse_position) {
                Some((file, line)) => self.set_state(DebuggerState::Paused { file, line }),
                None => tracing::warn!(code, ?context, "malformed pause position"),
            },
            204 => self.publish(Event::Output(context.unwrap_or_default().to_string())),
            401 => self.publish(Event::Error(context.unwrap_or_default().to_string())),
            other => tracing::debug!(code = other, ?context, "unhandled status code"),
        }
    }

    pub(crate) fn register_breakpoint(&self, breakpoint: &Breakpoint) -> BreakpointId {
        let mut store = self.breakpoints.lock().unwrap();
        store.current_id += 1;
        let id = store.current_id;
        store.by_id.insert(id, breakpoint.clone());
        id
    }

    pub(crate) fn unregister_breakpoint(&self, breakpoint: &Breakpoint) {
        let mut store = self.breakpoints.lock().unwrap();
        store.by_id.retain(|_, known| known != breakpoint);
    }

    pub(crate) fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.lock().unwrap().by_id.values().cloned().collect()
    }
}

/// `<file> <line>[ <watch>]`, as carried by pause status lines.
fn parse_position(context: &str) -> Option<(String, u32)> {
    let mut parts = context.split_whitespace();
    let file = parts.next()?.to_string();
    let line = parts.next()?.parse().ok()?;
    Some((file, line))
}

impl DebugProcess for DebuggerInternals {
    fn on_command_error(&self, message: &str) {
        self.publish(Event::Error(message.to_string()));
    }
}

/// The capability bundle handed to the transport, delegating to the shared
/// internals.
pub(crate) struct DebuggerListener {
    pub(crate) internals: Arc<DebuggerInternals>,
}

impl Logger for DebuggerListener {
    fn println(&self, line: &str) {
        tracing::debug!("{line}");
    }
}

impl ResponseSink for DebuggerListener {
    fn handle_resp(&self, code: i32, context: Option<&str>) {
        self.internals.on_resp(code, context);
    }

    fn on_socket_closed(&self) {
        self.internals.set_state(DebuggerState::Ended);
    }
}

impl ProcessProvider for DebuggerListener {
    fn process(&self) -> Arc<dyn DebugProcess> {
        Arc::clone(&self.internals) as Arc<dyn DebugProcess>
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use transport::DebugProcess;

    use super::DebuggerInternals;
    use crate::state::Event;
    use crate::types::Breakpoint;

    fn internals() -> (Arc<DebuggerInternals>, crossbeam_channel::Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(DebuggerInternals::new(tx)), rx)
    }

    #[test]
    fn pause_line_is_decoded() {
        let (internals, rx) = internals();
        internals.on_resp(202, Some("main.lua 12"));
        assert_eq!(
            rx.try_recv().expect("paused event"),
            Event::Paused {
                file: "main.lua".to_string(),
                line: 12
            }
        );
    }

    #[test]
    fn malformed_pause_context_is_ignored() {
        let (internals, rx) = internals();
        internals.on_resp(202, None);
        internals.on_resp(202, Some("main.lua"));
        internals.on_resp(202, Some("main.lua twelve"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn output_and_errors_become_events() {
        let (internals, rx) = internals();
        internals.on_resp(204, Some("stdout 5"));
        internals.on_resp(401, Some("in Execution 9"));
        assert_eq!(
            rx.try_recv().expect("output event"),
            Event::Output("stdout 5".to_string())
        );
        assert_eq!(
            rx.try_recv().expect("error event"),
            Event::Error("in Execution 9".to_string())
        );
    }

    #[test]
    fn command_errors_are_published() {
        let (internals, rx) = internals();
        internals.on_command_error("bad input");
        assert_eq!(
            rx.try_recv().expect("error event"),
            Event::Error("bad input".to_string())
        );
    }

    #[test]
    fn breakpoint_ids_are_monotonic_and_removal_matches_by_position() {
        let (internals, _rx) = internals();
        let a = Breakpoint {
            file: "a.lua".to_string(),
            line: 1,
        };
        let b = Breakpoint {
            file: "b.lua".to_string(),
            line: 2,
        };
        let first = internals.register_breakpoint(&a);
        let second = internals.register_breakpoint(&b);
        assert!(second > first);

        internals.unregister_breakpoint(&a);
        assert_eq!(internals.breakpoints(), vec![b]);
    }
}
