//! Error types for the script-actor runtime
//!
//! Domain errors are `thiserror` enums; the CLI and config-file boundary
//! convert them into `anyhow` errors with context.

use thiserror::Error;

use super::host::ExecutionTerminated;
use super::presence::LifecycleMethod;
use crate::interpreter::ScriptError;

/// Errors surfaced to the host by a script actor
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Language or script invalid at configure time. Fatal for the actor instance.
    #[error("configuration error in actor '{actor}': {source}")]
    Configuration {
        /// Name of the failing actor
        actor: String,
        /// What went wrong
        #[source]
        source: ConfigError,
    },

    /// The script flagged a problem through its error-reporting call
    #[error("script reported an error in {method}: {message}")]
    ScriptReported {
        /// Phase that was executing when the error was recorded
        method: LifecycleMethod,
        /// Message passed by the script
        message: String,
    },

    /// Any other failure raised while running a lifecycle method
    #[error("error in script while executing {method}: {source}")]
    Script {
        /// Phase that failed
        method: LifecycleMethod,
        /// Normalised interpreter failure
        #[source]
        source: ScriptError,
    },

    /// The workflow run is being torn down; relayed verbatim
    #[error(transparent)]
    Terminated(#[from] ExecutionTerminated),
}

impl DispatchError {
    /// Whether this is the host termination signal rather than an actor failure.
    pub fn is_termination(&self) -> bool {
        matches!(self, DispatchError::Terminated(_))
    }

    /// Lifecycle phase associated with the error, if any.
    pub fn method(&self) -> Option<LifecycleMethod> {
        match self {
            DispatchError::ScriptReported { method, .. } | DispatchError::Script { method, .. } => {
                Some(*method)
            }
            _ => None,
        }
    }
}

/// Configuration-time failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No interpreter registered under the requested identifier
    #[error("no interpreter registered for language '{0}'")]
    UnknownLanguage(String),

    /// The interpreter cannot call named methods on script objects
    #[error("interpreter for '{0}' cannot invoke named methods")]
    InvocationUnsupported(String),

    /// The interpreter factory failed
    #[error("failed to start interpreter for '{language}': {source}")]
    Session {
        /// Requested language
        language: String,
        /// Factory failure
        #[source]
        source: ScriptError,
    },

    /// Parse or top-level evaluation failure
    #[error("failed to evaluate script: {0}")]
    Evaluation(#[source] ScriptError),

    /// The declared actor class is undefined or its constructor failed
    #[error("failed to instantiate actor class '{class}': {source}")]
    Instantiation {
        /// Declared class name
        class: String,
        /// Construction failure
        #[source]
        source: ScriptError,
    },

    /// A host value could not be made visible to the script
    #[error("failed to bind '{name}': {source}")]
    Injection {
        /// Binding name
        name: String,
        /// Injection failure
        #[source]
        source: ScriptError,
    },
}

/// Result alias for dispatcher operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

pub(crate) fn configuration(actor: &str, source: ConfigError) -> DispatchError {
    DispatchError::Configuration {
        actor: actor.to_string(),
        source,
    }
}
