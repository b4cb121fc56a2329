//! The dispatch engine: key tokens in, command invocations out.
//!
//! [`DispatchEngine::feed`] consumes one token at a time, accumulates repeat
//! counts, buffers ambiguous prefixes, resolves the operator+motion grammar
//! against the active mode's keymap, and drives the matched action's
//! asynchronous body to completion before the next token is admitted.
//! [`MacroRecorder`] captures the raw token stream under register keys for
//! later replay through the same path.

mod builtins;
mod engine;
mod matcher;
mod recorder;

pub use builtins::{register_builtin_commands, register_search_commands};
pub use engine::{DispatchEngine, DispatchOutcome};
pub use recorder::MacroRecorder;
