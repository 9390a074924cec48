pub type BreakpointId = u64;

/// A line breakpoint, identified the way the debuggee knows the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    pub file: String,
    pub line: u32,
}
