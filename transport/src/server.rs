use std::collections::VecDeque;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use eyre::WrapErr;

use crate::commands::{DebugCommand, DefaultCommand};
use crate::dispatcher::ResponseDispatcher;
use crate::reader::LineReader;

/// Opaque session context owned by the embedding application, bound into each
/// command just before it is written.
pub trait DebugProcess: Send + Sync {
    /// An error the debuggee reported in response to a command.
    fn on_command_error(&self, message: &str);
}

/// Log sink for protocol traffic and connection milestones.
pub trait Logger: Send + Sync {
    fn println(&self, line: &str);
}

/// Receives decoded status lines and the end-of-stream notification.
pub trait ResponseSink: Send + Sync {
    fn handle_resp(&self, code: i32, context: Option<&str>);
    fn on_socket_closed(&self);
}

pub trait ProcessProvider: Send + Sync {
    fn process(&self) -> Arc<dyn DebugProcess>;
}

/// The capability bundle the server calls back into, composed by the caller
/// from the three narrow facets.
pub trait ServerListener: Logger + ResponseSink + ProcessProvider {}

impl<T: Logger + ResponseSink + ProcessProvider> ServerListener for T {}

pub(crate) struct ProtocolState {
    pub(crate) queue: VecDeque<Box<dyn DebugCommand>>,
    pub(crate) pending: Option<Box<dyn DebugCommand>>,
    pub(crate) buffer: String,
    pub(crate) stopped: bool,
    pub(crate) connected: bool,
}

/// Queue, pending-command slot and accumulation buffer, guarded by one lock.
/// The reader's dispatch path and the writer's drain step both touch them.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ProtocolState>,
    pub(crate) wake: Condvar,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ProtocolState {
                queue: VecDeque::new(),
                pending: None,
                buffer: String::with_capacity(2048),
                stopped: false,
                connected: false,
            }),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    pub(crate) fn mark_disconnected(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        self.wake.notify_all();
    }
}

struct Inner {
    listener: Arc<dyn ServerListener>,
    shared: Arc<Shared>,
    sock: Mutex<Option<TcpListener>>,
    out: Mutex<Option<TcpStream>>,
}

/// Debug server for one MobDebug session: binds, accepts a single debuggee
/// connection, then sequences outbound commands against inbound responses.
#[derive(Clone)]
pub struct MobServer {
    inner: Arc<Inner>,
}

impl MobServer {
    pub fn new(listener: Arc<dyn ServerListener>) -> Self {
        Self {
            inner: Arc::new(Inner {
                listener,
                shared: Arc::new(Shared::new()),
                sock: Mutex::new(None),
                out: Mutex::new(None),
            }),
        }
    }

    /// Bind `port` (skipped when already bound) and start the accept loop.
    ///
    /// An instance serves at most one session; do not call twice.
    #[tracing::instrument(skip(self))]
    pub fn start(&self, port: u16) -> eyre::Result<()> {
        let accept_sock = {
            let mut sock = self.inner.sock.lock().unwrap();
            if sock.is_none() {
                let bound = TcpListener::bind(("0.0.0.0", port))
                    .wrap_err_with(|| format!("binding listening socket on port {port}"))?;
                *sock = Some(bound);
            }
            sock.as_ref()
                .unwrap()
                .try_clone()
                .wrap_err("cloning listening socket")?
        };

        let inner = Arc::clone(&self.inner);
        thread::spawn(move || accept_loop(inner, accept_sock));
        Ok(())
    }

    /// Tear the session down: best-effort `done` line, raise the stopped
    /// flag, clear the pending command, close the listening socket.
    ///
    /// Idempotent, and safe to call before `start`.
    pub fn stop(&self) {
        if let Some(stream) = self.inner.out.lock().unwrap().as_mut() {
            let _ = stream.write_all(b"done\n");
            let _ = stream.flush();
        }

        {
            let mut state = self.inner.shared.state.lock().unwrap();
            state.stopped = true;
            state.pending = None;
            self.inner.shared.wake.notify_all();
        }

        self.inner.sock.lock().unwrap().take();
    }

    pub fn send_add_breakpoint(&self, file: &str, line: u32) {
        self.add_command(&format!("SETB {file} {line}"));
    }

    pub fn send_remove_breakpoint(&self, file: &str, line: u32) {
        self.add_command(&format!("DELB {file} {line}"));
    }

    /// Enqueue a raw command line that expects no response.
    pub fn add_command(&self, text: &str) {
        self.add_command_boxed(Box::new(DefaultCommand::new(text, 0)));
    }

    pub fn add_command_boxed(&self, command: Box<dyn DebugCommand>) {
        self.inner.enqueue(command);
    }
}

impl Inner {
    fn enqueue(&self, command: Box<dyn DebugCommand>) {
        let mut state = self.shared.state.lock().unwrap();
        state.queue.push_back(command);
        self.shared.wake.notify_all();
    }
}

fn accept_loop(inner: Arc<Inner>, sock: TcpListener) {
    let stream = match sock.accept() {
        Ok((stream, addr)) => {
            tracing::debug!(%addr, "debuggee connected");
            stream
        }
        Err(e) => {
            tracing::error!(error = ?e, "accepting debuggee connection");
            return;
        }
    };

    {
        let mut state = inner.shared.state.lock().unwrap();
        if state.stopped {
            // stop() won the race; drop the late connection unused
            return;
        }
        state.connected = true;
    }

    inner.listener.println("Connected.");

    let session = (|| -> eyre::Result<()> {
        let read_half = stream.try_clone().wrap_err("cloning connection stream")?;
        read_half
            .set_read_timeout(Some(Duration::from_secs(1)))
            .wrap_err("setting read timeout")?;

        *inner.out.lock().unwrap() = Some(stream);

        let dispatcher =
            ResponseDispatcher::new(Arc::clone(&inner.shared), Arc::clone(&inner.listener));
        let reader = LineReader::new(
            read_half,
            dispatcher,
            Arc::clone(&inner.shared),
            Arc::clone(&inner.listener),
        );
        thread::spawn(move || reader.run());

        let writer_inner = Arc::clone(&inner);
        thread::spawn(move || writer_loop(writer_inner));
        Ok(())
    })();

    if let Err(e) = session {
        tracing::error!(error = ?e, "starting session loops");
        inner.shared.mark_disconnected();
    }
}

fn writer_loop(inner: Arc<Inner>) {
    match drain_until_closed(&inner) {
        Ok(()) => inner.listener.println("Disconnected."),
        Err(e) => {
            tracing::error!(error = ?e, "writer loop failed");
            inner.shared.mark_disconnected();
        }
    }
}

/// One command in flight at most: the pending slot gates the drain step, and
/// it is occupied before the payload bytes hit the wire so the response can
/// never race the slot.
fn drain_until_closed(inner: &Inner) -> eyre::Result<()> {
    let mut first_time = true;
    loop {
        loop {
            let mut command = {
                let mut state = inner.shared.state.lock().unwrap();
                if state.stopped || !state.connected {
                    return Ok(());
                }
                if state.pending.is_some() {
                    break;
                }
                match state.queue.pop_front() {
                    Some(command) => command,
                    None => break,
                }
            };

            command.set_debug_process(inner.listener.process());

            let mut payload: Vec<u8> = Vec::new();
            command
                .write(&mut payload)
                .wrap_err("rendering command payload")?;

            if command.required_response_lines() > 0 {
                inner.shared.state.lock().unwrap().pending = Some(command);
            }

            {
                let mut out = inner.out.lock().unwrap();
                let stream = out.as_mut().ok_or_else(|| eyre::eyre!("output stream gone"))?;
                stream.write_all(&payload).wrap_err("writing command")?;
                stream.write_all(b"\n").wrap_err("writing terminator")?;
                stream.flush().wrap_err("flushing command")?;
            }

            inner
                .listener
                .println(&format!("send: {}", String::from_utf8_lossy(&payload)));
        }

        if first_time {
            // a debuggee starts suspended; resume it once per connection
            first_time = false;
            inner.enqueue(Box::new(DefaultCommand::new("RUN", 0)));
            continue;
        }

        let mut state = inner.shared.state.lock().unwrap();
        while !state.stopped
            && state.connected
            && (state.pending.is_some() || state.queue.is_empty())
        {
            state = inner.shared.wake.wait(state).unwrap();
        }
    }
}
