//! Server-side transport for the MobDebug line protocol.
//!
//! The debuggee connects to us: we accept a single connection, write
//! newline-terminated command lines and match the asynchronous textual
//! responses back to the command that asked for them, one in flight at most.

pub mod bindings;
pub mod commands;
mod dispatcher;
pub mod parse;
mod reader;
pub mod server;

/// Port MobDebug clients dial by default.
pub const DEFAULT_MOBDEBUG_PORT: u16 = 8172;

pub use commands::{DebugCommand, DefaultCommand, EvalCommand, EvalResponse};
pub use server::{DebugProcess, Logger, MobServer, ProcessProvider, ResponseSink, ServerListener};
