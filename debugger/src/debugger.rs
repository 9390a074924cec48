use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use transport::{EvalCommand, EvalResponse, MobServer, DEFAULT_MOBDEBUG_PORT};

use crate::internals::{DebuggerInternals, DebuggerListener};
use crate::state::{DebuggerState, Event};
use crate::types::{Breakpoint, BreakpointId};

pub struct Debugger {
    server: MobServer,
    internals: Arc<DebuggerInternals>,
    rx: crossbeam_channel::Receiver<Event>,
}

impl Debugger {
    /// Start listening for a debuggee on `port`.
    #[tracing::instrument]
    pub fn on_port(port: u16) -> eyre::Result<Self> {
        tracing::debug!("starting debug session server");

        let (tx, rx) = crossbeam_channel::unbounded();
        let internals = Arc::new(DebuggerInternals::new(tx));
        let server = MobServer::new(Arc::new(DebuggerListener {
            internals: Arc::clone(&internals),
        }));
        server.start(port).wrap_err("starting debug server")?;

        Ok(Self {
            server,
            internals,
            rx,
        })
    }

    pub fn new() -> eyre::Result<Self> {
        Self::on_port(DEFAULT_MOBDEBUG_PORT)
    }

    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.rx.clone()
    }

    pub fn add_breakpoint(&self, breakpoint: &Breakpoint) -> BreakpointId {
        let id = self.internals.register_breakpoint(breakpoint);
        self.server
            .send_add_breakpoint(&breakpoint.file, breakpoint.line);
        id
    }

    pub fn remove_breakpoint(&self, breakpoint: &Breakpoint) {
        self.internals.unregister_breakpoint(breakpoint);
        self.server
            .send_remove_breakpoint(&breakpoint.file, breakpoint.line);
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.internals.breakpoints()
    }

    /// Resume execution of the debuggee
    pub fn run(&self) {
        self.internals.set_state(DebuggerState::Running);
        self.server.add_command("RUN");
    }

    /// Step into a statement
    pub fn step_in(&self) {
        self.internals.set_state(DebuggerState::Running);
        self.server.add_command("STEP");
    }

    /// Step over a statement
    pub fn step_over(&self) {
        self.internals.set_state(DebuggerState::Running);
        self.server.add_command("OVER");
    }

    /// Step out of a statement
    pub fn step_out(&self) {
        self.internals.set_state(DebuggerState::Running);
        self.server.add_command("OUT");
    }

    /// Evaluate an expression inside the debuggee and wait for the result.
    pub fn evaluate(&self, expr: &str) -> eyre::Result<EvalResponse> {
        let (command, reply) = EvalCommand::new(expr);
        self.server.add_command_boxed(Box::new(command));
        reply
            .recv_timeout(Duration::from_secs(30))
            .wrap_err("waiting for evaluation result")
    }

    pub fn wait_for_event<F>(&self, pred: F) -> Event
    where
        F: Fn(&Event) -> bool,
    {
        let mut n = 0;
        loop {
            let event = self.rx.recv().unwrap();
            if n >= 100 {
                panic!("did not receive event");
            }

            if pred(&event) {
                tracing::debug!(event = ?event, "received expected event");
                return event;
            } else {
                tracing::trace!(event = ?event, "non-matching event");
            }
            n += 1;
        }
    }

    pub fn stop(&self) {
        self.server.stop();
    }
}
