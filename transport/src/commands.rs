use std::io::{self, Write};
use std::sync::Arc;

use crate::server::DebugProcess;

/// An outbound protocol command plus the strategy for consuming the response
/// text it provokes.
///
/// `handle` is given the accumulated not-yet-consumed response text and
/// returns how many bytes it ate from the front (always on a UTF-8 boundary).
/// A command may need several calls across inbound chunks before it reports
/// itself finished.
pub trait DebugCommand: Send {
    /// Emit the payload text, without the trailing newline.
    fn write(&mut self, out: &mut dyn Write) -> io::Result<()>;

    fn handle(&mut self, buffered: &str) -> usize;

    fn is_finished(&self) -> bool;

    /// Number of response lines expected before the command is complete.
    /// Zero means fire-and-forget: the command is never awaited.
    fn required_response_lines(&self) -> usize;

    /// Bind the session context just before the payload is written.
    fn set_debug_process(&mut self, process: Arc<dyn DebugProcess>);
}

/// A plain text command that consumes a fixed number of whole response lines.
pub struct DefaultCommand {
    text: String,
    required_lines: usize,
    handled_lines: usize,
}

impl DefaultCommand {
    pub fn new(text: impl Into<String>, required_lines: usize) -> Self {
        Self {
            text: text.into(),
            required_lines,
            handled_lines: 0,
        }
    }
}

impl DebugCommand for DefaultCommand {
    fn write(&mut self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.text.as_bytes())
    }

    fn handle(&mut self, buffered: &str) -> usize {
        let mut eaten = 0;
        while self.handled_lines < self.required_lines {
            match buffered[eaten..].find('\n') {
                Some(offset) => {
                    eaten += offset + 1;
                    self.handled_lines += 1;
                }
                None => break,
            }
        }
        eaten
    }

    fn is_finished(&self) -> bool {
        self.handled_lines >= self.required_lines
    }

    fn required_response_lines(&self) -> usize {
        self.required_lines
    }

    fn set_debug_process(&mut self, _process: Arc<dyn DebugProcess>) {}
}

/// Result of an [`EvalCommand`], resolved through the receiver handed out at
/// construction.
#[derive(Debug)]
pub struct EvalResponse {
    pub success: bool,
    pub payload: String,
}

enum EvalState {
    AwaitingHeader,
    AwaitingPayload { success: bool, len: usize },
    Done,
}

/// `EXEC <expr>`: evaluate an expression inside the debuggee.
///
/// The debuggee answers with a header line `<code> <status...> <len>` followed
/// by exactly `len` bytes of result payload, which may arrive split across any
/// number of chunks.
pub struct EvalCommand {
    expr: String,
    state: EvalState,
    process: Option<Arc<dyn DebugProcess>>,
    reply: Option<oneshot::Sender<EvalResponse>>,
}

impl EvalCommand {
    pub fn new(expr: impl Into<String>) -> (Self, oneshot::Receiver<EvalResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                expr: expr.into(),
                state: EvalState::AwaitingHeader,
                process: None,
                reply: Some(tx),
            },
            rx,
        )
    }

    fn resolve(&mut self, response: EvalResponse) {
        if !response.success {
            if let Some(process) = &self.process {
                process.on_command_error(&response.payload);
            }
        }
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(response);
        }
        self.state = EvalState::Done;
    }
}

fn parse_eval_header(header: &str) -> Option<(i32, usize)> {
    let mut parts = header.split_whitespace();
    let code = parts.next()?.parse().ok()?;
    let len = parts.next_back()?.parse().ok()?;
    Some((code, len))
}

impl DebugCommand for EvalCommand {
    fn write(&mut self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "EXEC {}", self.expr)
    }

    fn handle(&mut self, buffered: &str) -> usize {
        let mut eaten = 0;
        loop {
            match self.state {
                EvalState::AwaitingHeader => {
                    let Some(offset) = buffered[eaten..].find('\n') else {
                        return eaten;
                    };
                    let header = &buffered[eaten..eaten + offset];
                    match parse_eval_header(header) {
                        Some((code, len)) => {
                            self.state = EvalState::AwaitingPayload {
                                success: code == 200,
                                len,
                            };
                        }
                        None => {
                            let header = header.to_string();
                            self.resolve(EvalResponse {
                                success: false,
                                payload: header,
                            });
                        }
                    }
                    eaten += offset + 1;
                }
                EvalState::AwaitingPayload { success, len } => {
                    let rest = &buffered[eaten..];
                    if rest.len() < len {
                        return eaten;
                    }
                    // the declared size is in bytes; round up to a char boundary
                    let mut take = len;
                    while take < rest.len() && !rest.is_char_boundary(take) {
                        take += 1;
                    }
                    if !rest.is_char_boundary(take) {
                        return eaten;
                    }
                    let payload = rest[..take].to_string();
                    eaten += take;
                    self.resolve(EvalResponse { success, payload });
                }
                EvalState::Done => return eaten,
            }
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, EvalState::Done)
    }

    fn required_response_lines(&self) -> usize {
        2
    }

    fn set_debug_process(&mut self, process: Arc<dyn DebugProcess>) {
        self.process = Some(process);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{DebugCommand, DefaultCommand, EvalCommand};
    use crate::server::DebugProcess;

    struct ErrorCounter(AtomicUsize);

    impl DebugProcess for ErrorCounter {
        fn on_command_error(&self, _message: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn rendered(command: &mut dyn DebugCommand) -> String {
        let mut payload: Vec<u8> = Vec::new();
        command.write(&mut payload).expect("rendering payload");
        String::from_utf8(payload).expect("utf8 payload")
    }

    #[test]
    fn fire_and_forget_is_born_finished() {
        let mut command = DefaultCommand::new("RUN", 0);
        assert!(command.is_finished());
        assert_eq!(command.required_response_lines(), 0);
        assert_eq!(rendered(&mut command), "RUN");
    }

    #[test]
    fn consumes_whole_lines_only() {
        let mut command = DefaultCommand::new("STEP", 1);
        assert_eq!(command.handle("200 O"), 0);
        assert!(!command.is_finished());
        assert_eq!(command.handle("200 OK\n"), 7);
        assert!(command.is_finished());
    }

    #[test]
    fn line_count_spans_chunks() {
        let mut command = DefaultCommand::new("STACK", 2);
        assert_eq!(command.handle("first line\nsecond "), 11);
        assert!(!command.is_finished());
        assert_eq!(command.handle("second half\n"), 12);
        assert!(command.is_finished());
    }

    #[test]
    fn eval_header_and_payload_in_one_chunk() {
        let (mut command, reply) = EvalCommand::new("1 + 1");
        assert_eq!(rendered(&mut command), "EXEC 1 + 1");
        let eaten = command.handle("200 OK 1\n2");
        assert_eq!(eaten, 10);
        assert!(command.is_finished());
        let response = reply.recv().expect("eval response");
        assert!(response.success);
        assert_eq!(response.payload, "2");
    }

    #[test]
    fn eval_payload_arrives_in_pieces() {
        let (mut command, reply) = EvalCommand::new("x");
        assert_eq!(command.handle("200 OK 10\nhell"), 10);
        assert!(!command.is_finished());
        // dispatcher drained the header; the rest accumulates
        assert_eq!(command.handle("hell"), 0);
        assert_eq!(command.handle("hello worl"), 10);
        assert!(command.is_finished());
        assert_eq!(reply.recv().expect("eval response").payload, "hello worl");
    }

    #[test]
    fn eval_error_reported_to_the_process() {
        let counter = Arc::new(ErrorCounter(AtomicUsize::new(0)));
        let (mut command, reply) = EvalCommand::new("nope()");
        command.set_debug_process(counter.clone());
        command.handle("401 Error in Expression 9\nbad input");
        assert!(command.is_finished());
        let response = reply.recv().expect("eval response");
        assert!(!response.success);
        assert_eq!(response.payload, "bad input");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
