//! Embedded interpreter sessions.
//!
//! A script actor talks to its interpreter through the [`ScriptEngine`]
//! capability: evaluate text, manage named globals, and invoke a named method
//! on a script object or as a free function. Per-language differences in how
//! actors are constructed and how host values are made visible live in
//! [`adapter`]. Concrete sessions wrap Rhai and (optionally) Lua.

/// Instantiation and injection strategies per language family.
pub mod adapter;
#[cfg(feature = "lua")]
/// Lua sessions backed by `mlua`.
pub mod lua_engine;
#[cfg(feature = "rhai")]
/// Rhai sessions.
pub mod rhai_engine;
/// Values exchanged between host and scripts.
pub mod value;

pub use adapter::{BindContext, LanguageAdapter};
pub use value::{EngineRef, HostValue, ScriptValue, Value};

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::runtime::host::{ExecutionTerminated, PortError, TERMINATION_MARKER};

/// Convenience result alias for interpreter operations.
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Handle to a script object, by the session global that holds it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef(String);

impl ObjectRef {
    /// Refer to the object stored in global `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Global name holding the object
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Interpreter failures, normalised across engines.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The named method or function does not exist
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A referenced class, variable, or function is not defined
    #[error("undefined: {0}")]
    Undefined(String),

    /// The text did not parse
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The script raised an error at runtime.
    ///
    /// `cause` keeps the host error the script propagated, when the engine
    /// preserved it.
    #[error("{message}")]
    Raised {
        /// Rendered message
        message: String,
        /// Original host error, if any
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },

    /// The engine cannot perform the requested operation
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ScriptError {
    /// Runtime failure with only a message
    pub fn raised(message: impl Into<String>) -> Self {
        ScriptError::Raised {
            message: message.into(),
            cause: None,
        }
    }

    /// Runtime failure that preserves the host error behind it
    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ScriptError::Raised {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Failure carrying the host termination signal
    pub fn terminated(signal: ExecutionTerminated) -> Self {
        Self::with_cause(signal.to_string(), signal)
    }

    /// The termination signal behind this failure, if the engine kept it.
    pub fn termination(&self) -> Option<ExecutionTerminated> {
        let ScriptError::Raised {
            cause: Some(cause), ..
        } = self
        else {
            return None;
        };

        let first: &(dyn StdError + 'static) = &**cause;
        let mut current = Some(first);
        while let Some(error) = current {
            if let Some(signal) = error.downcast_ref::<ExecutionTerminated>() {
                return Some(signal.clone());
            }
            if let Some(PortError::Terminated(signal)) = error.downcast_ref::<PortError>() {
                return Some(signal.clone());
            }
            current = error.source();
        }
        None
    }

    /// Whether the rendered message names the termination signal.
    ///
    /// Fallback for engines that flatten host errors into text.
    pub fn mentions_termination(&self) -> bool {
        self.to_string().contains(TERMINATION_MARKER)
    }
}

impl From<PortError> for ScriptError {
    fn from(error: PortError) -> Self {
        ScriptError::with_cause(error.to_string(), error)
    }
}

/// One interpreter session.
///
/// A session belongs to exactly one script actor and is never shared.
pub trait ScriptEngine: Send {
    /// Registry identifier of the language
    fn language(&self) -> &str;

    /// Whether named methods can be invoked on objects and as functions
    fn supports_invocation(&self) -> bool {
        true
    }

    /// Load an actor script, replacing whatever the previous script defined.
    ///
    /// Functions, classes and globals of the previously loaded script must
    /// not survive; host registrations made at session creation do.
    fn load(&mut self, source: &str) -> ScriptResult<()>;

    /// Evaluate script text at top level, on top of the loaded script
    fn eval(&mut self, source: &str) -> ScriptResult<ScriptValue>;

    /// Define or overwrite a global
    fn put(&mut self, name: &str, value: ScriptValue) -> ScriptResult<()>;

    /// Whether a global is defined
    fn contains(&self, name: &str) -> bool;

    /// Remove a global; missing names are ignored
    fn remove(&mut self, name: &str);

    /// Whether the object exposes a settable field with this name
    fn has_field(&self, object: &ObjectRef, field: &str) -> bool;

    /// Assign a field on a script object
    fn set_field(&mut self, object: &ObjectRef, field: &str, value: ScriptValue)
    -> ScriptResult<()>;

    /// Call a zero-argument method on `target`, or a free function when
    /// `target` is `None`.
    ///
    /// A missing method must surface as [`ScriptError::MethodNotFound`].
    fn invoke(&mut self, target: Option<&ObjectRef>, method: &str) -> ScriptResult<ScriptValue>;
}
