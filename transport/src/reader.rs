use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eyre::WrapErr;

use crate::dispatcher::ResponseDispatcher;
use crate::server::{ServerListener, Shared};

/// How long to pause between reads, as a function of whether the last read
/// yielded data.
struct SleepingPolicy {
    after_data: Duration,
    when_idle: Duration,
}

impl Default for SleepingPolicy {
    fn default() -> Self {
        Self {
            after_data: Duration::from_millis(1),
            when_idle: Duration::from_millis(5),
        }
    }
}

impl SleepingPolicy {
    fn time_to_sleep(&self, was_active: bool) -> Duration {
        if was_active {
            self.after_data
        } else {
            self.when_idle
        }
    }
}

/// Reads raw bytes off the connection and forwards each decoded chunk to the
/// dispatcher. Runs on its own thread so the writer is never blocked waiting
/// on inbound data.
pub(crate) struct LineReader {
    input: TcpStream,
    dispatcher: ResponseDispatcher,
    shared: Arc<Shared>,
    listener: Arc<dyn ServerListener>,
}

impl LineReader {
    pub(crate) fn new(
        input: TcpStream,
        dispatcher: ResponseDispatcher,
        shared: Arc<Shared>,
        listener: Arc<dyn ServerListener>,
    ) -> Self {
        Self {
            input,
            dispatcher,
            shared,
            listener,
        }
    }

    /// Loop until end of stream, a stream error, or the stopped flag.
    /// However the loop ends, the socket-closed notification fires once.
    pub(crate) fn run(mut self) {
        if let Err(e) = self.read_loop() {
            tracing::warn!(error = ?e, "reader loop ended");
        }
        self.shared.mark_disconnected();
        self.listener.on_socket_closed();
    }

    fn read_loop(&mut self) -> eyre::Result<()> {
        let policy = SleepingPolicy::default();
        let mut buf = [0u8; 4096];
        loop {
            if self.shared.is_stopped() {
                return Ok(());
            }
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    let chunk =
                        std::str::from_utf8(&buf[..n]).wrap_err("non-utf8 data from debuggee")?;
                    self.dispatcher.on_resp(chunk);
                    if self.shared.is_stopped() {
                        return Ok(());
                    }
                    thread::sleep(policy.time_to_sleep(true));
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    thread::sleep(policy.time_to_sleep(false));
                }
                Err(e) => return Err(e).wrap_err("reading from debuggee"),
            }
        }
    }
}
