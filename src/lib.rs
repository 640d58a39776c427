//! Script Actor – workflow actors whose behaviour is written in an embedded
//! scripting language
//!
//! This crate turns a script plus a declared language into a workflow actor:
//! - One interpreter session per actor, created from an injected language registry
//! - Per-language strategies for constructing the actor object and binding ports,
//!   parameters, and the actor surface into the script
//! - Uniform lifecycle dispatch where a missing method is an outcome, not an error
//! - Host termination relayed verbatim; shutdown-phase failures routed to a side channel
//! - Built-in Rhai sessions, optional Lua sessions, and a minimal sequential director

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Interpreter sessions and language adapters
pub mod interpreter;
/// Dispatcher, host collaborators, registry, and configuration
pub mod runtime;
/// Programmable in-memory engine for tests
pub mod testing;

// Re-export key types for convenience
pub use runtime::{ActorConfig, DispatchError, PhaseOutcome, ScriptActor};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
