//! High level debugger session over the MobDebug transport: decodes status
//! codes into typed events, tracks breakpoints and run state.
mod debugger;
mod internals;
pub(crate) mod state;
mod types;

pub use debugger::Debugger;
pub use state::Event;
pub use types::{Breakpoint, BreakpointId};
