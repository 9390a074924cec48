pub(crate) enum DebuggerState {
    Initialised,
    Running,
    Paused { file: String, line: u32 },
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialised,
    Running,
    Paused { file: String, line: u32 },
    /// Output the debuggee redirected to the debugger.
    Output(String),
    /// An error the debuggee reported for a command.
    Error(String),
    Ended,
}

impl<'a> From<&'a DebuggerState> for Event {
    fn from(value: &'a DebuggerState) -> Self {
        match value {
            DebuggerState::Initialised => Event::Initialised,
            DebuggerState::Running => Event::Running,
            DebuggerState::Paused { file, line } => Event::Paused {
                file: file.clone(),
                line: *line,
            },
            DebuggerState::Ended => Event::Ended,
        }
    }
}
