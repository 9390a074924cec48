use std::sync::Arc;

use crate::parse;
use crate::server::{ProtocolState, ServerListener, Shared};

/// Feeds each inbound chunk to the command awaiting its response, then scans
/// the same chunk for a status line for the listener.
///
/// The two paths are independent: a command can be consuming a multi-line
/// payload while the scan reports the terminating status line.
pub(crate) struct ResponseDispatcher {
    shared: Arc<Shared>,
    listener: Arc<dyn ServerListener>,
}

impl ResponseDispatcher {
    pub(crate) fn new(shared: Arc<Shared>, listener: Arc<dyn ServerListener>) -> Self {
        Self { shared, listener }
    }

    pub(crate) fn on_resp(&self, text: &str) {
        {
            let mut state = self.shared.state.lock().unwrap();
            let ProtocolState {
                pending, buffer, ..
            } = &mut *state;
            match pending {
                Some(command) => {
                    buffer.push_str(text);
                    let eaten = command.handle(buffer);
                    if eaten > 0 {
                        buffer.drain(..eaten);
                        if command.is_finished() {
                            *pending = None;
                            self.shared.wake.notify_all();
                        }
                    }
                }
                // unconsumed data without a waiting command is stale; drop it
                None => buffer.clear(),
            }
        }

        if let Some((code, context)) = parse::status_line(text) {
            self.listener.handle_resp(code, context);
        }
    }
}
