//! Host collaborators consumed by script actors
//!
//! The workflow host owns ports, parameters, and the termination signal.
//! This module defines the narrow interfaces the dispatcher relies on, plus
//! in-memory implementations used by the director, the CLI, and tests.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::error::DispatchError;
use crate::interpreter::Value;

/// Type name of the host termination signal.
///
/// Some interpreters only hand back the text of a failure. The dispatcher
/// then looks for this marker in the message to recognise a termination.
pub const TERMINATION_MARKER: &str = "ExecutionTerminated";

/// The host's termination signal: the workflow run is being torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {}", TERMINATION_MARKER, .reason)]
pub struct ExecutionTerminated {
    /// Why the run is ending
    pub reason: String,
}

impl ExecutionTerminated {
    /// Create a termination signal with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Port-level failures
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// No queued token
    #[error("no token available on port '{0}'")]
    Empty(String),

    /// Reading from an output port
    #[error("port '{0}' is not an input")]
    NotInput(String),

    /// Writing to an input port
    #[error("port '{0}' is not an output")]
    NotOutput(String),

    /// The host is shutting the run down
    #[error(transparent)]
    Terminated(#[from] ExecutionTerminated),
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Receives tokens from upstream
    Input,
    /// Broadcasts tokens downstream
    Output,
}

/// Host port abstraction
pub trait Port: Send + Sync {
    /// Port name as seen by scripts
    fn name(&self) -> &str;

    /// Port direction
    fn direction(&self) -> PortDirection;

    /// Whether a token is queued
    fn has_token(&self) -> bool;

    /// Take the next queued token
    fn get(&self) -> Result<Value, PortError>;

    /// Send a token to every downstream link
    fn broadcast(&self, value: Value) -> Result<(), PortError>;

    /// Whether any downstream link exists
    fn has_sink(&self) -> bool;
}

/// Shared port handle
pub type PortRef = Arc<dyn Port>;

/// In-memory port: a token queue for inputs, a broadcast log for outputs.
pub struct MemoryPort {
    name: String,
    direction: PortDirection,
    queue: Mutex<VecDeque<Value>>,
    sent: Mutex<Vec<Value>>,
    connected: Mutex<bool>,
    terminated: Mutex<Option<ExecutionTerminated>>,
}

impl MemoryPort {
    fn new(name: impl Into<String>, direction: PortDirection) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            direction,
            queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            connected: Mutex::new(false),
            terminated: Mutex::new(None),
        })
    }

    /// Create an input port
    pub fn input(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, PortDirection::Input)
    }

    /// Create an output port with one downstream link
    pub fn output(name: impl Into<String>) -> Arc<Self> {
        let port = Self::new(name, PortDirection::Output);
        port.connect();
        port
    }

    /// Queue a token for the actor to read
    pub fn push(&self, value: Value) {
        self.queue.lock().push_back(value);
    }

    /// Mark the port as linked downstream
    pub fn connect(&self) {
        *self.connected.lock() = true;
    }

    /// Tokens broadcast so far
    pub fn broadcasts(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// Drain the broadcast log
    pub fn take_broadcasts(&self) -> Vec<Value> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Make every subsequent read or write raise the termination signal
    pub fn terminate(&self, reason: impl Into<String>) {
        *self.terminated.lock() = Some(ExecutionTerminated::new(reason));
    }

    fn check_terminated(&self) -> Result<(), PortError> {
        match self.terminated.lock().as_ref() {
            Some(signal) => Err(PortError::Terminated(signal.clone())),
            None => Ok(()),
        }
    }
}

impl Port for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> PortDirection {
        self.direction
    }

    fn has_token(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    fn get(&self) -> Result<Value, PortError> {
        self.check_terminated()?;
        if self.direction != PortDirection::Input {
            return Err(PortError::NotInput(self.name.clone()));
        }
        self.queue
            .lock()
            .pop_front()
            .ok_or_else(|| PortError::Empty(self.name.clone()))
    }

    fn broadcast(&self, value: Value) -> Result<(), PortError> {
        self.check_terminated()?;
        if self.direction != PortDirection::Output {
            return Err(PortError::NotOutput(self.name.clone()));
        }
        self.sent.lock().push(value);
        Ok(())
    }

    fn has_sink(&self) -> bool {
        *self.connected.lock()
    }
}

impl fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPort")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish()
    }
}

/// A named, settable host parameter
#[derive(Debug)]
pub struct Parameter {
    name: String,
    value: RwLock<Value>,
}

/// Shared parameter handle
pub type ParameterRef = Arc<Parameter>;

impl Parameter {
    /// Create a parameter with an initial value
    pub fn new(name: impl Into<String>, value: Value) -> ParameterRef {
        Arc::new(Self {
            name: name.into(),
            value: RwLock::new(value),
        })
    }

    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Replace the value
    pub fn set(&self, value: Value) {
        *self.value.write() = value;
    }
}

struct ContextInner {
    name: String,
    ports: RwLock<BTreeMap<String, PortRef>>,
    parameters: RwLock<BTreeMap<String, ParameterRef>>,
    reported: Mutex<Option<String>>,
}

/// The host surface of one script actor: its ports, its parameters, and the
/// error-reporting call scripts use to flag a failure.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct ActorContext {
    inner: Arc<ContextInner>,
}

impl ActorContext {
    /// Create an empty context for the named actor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                ports: RwLock::new(BTreeMap::new()),
                parameters: RwLock::new(BTreeMap::new()),
                reported: Mutex::new(None),
            }),
        }
    }

    /// Actor name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach a port; replaces any port with the same name
    pub fn add_port(&self, port: PortRef) {
        let name = port.name().to_string();
        self.inner.ports.write().insert(name, port);
    }

    /// Look up a port by name
    pub fn port(&self, name: &str) -> Option<PortRef> {
        self.inner.ports.read().get(name).cloned()
    }

    /// All ports in name order
    pub fn ports(&self) -> Vec<PortRef> {
        self.inner.ports.read().values().cloned().collect()
    }

    /// Set a parameter, creating it if missing
    pub fn set_parameter(&self, name: &str, value: Value) -> ParameterRef {
        let mut parameters = self.inner.parameters.write();
        if let Some(existing) = parameters.get(name) {
            existing.set(value);
            return existing.clone();
        }
        let parameter = Parameter::new(name, value);
        parameters.insert(name.to_string(), parameter.clone());
        parameter
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<ParameterRef> {
        self.inner.parameters.read().get(name).cloned()
    }

    /// All parameters in name order
    pub fn parameters(&self) -> Vec<ParameterRef> {
        self.inner.parameters.read().values().cloned().collect()
    }

    /// Called by scripts to flag a failure in the running lifecycle method.
    ///
    /// The last message recorded during an invocation wins.
    pub fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(actor = %self.inner.name, %message, "script reported an error");
        *self.inner.reported.lock() = Some(message);
    }

    /// Take the recorded error, clearing it
    pub fn take_reported_error(&self) -> Option<String> {
        self.inner.reported.lock().take()
    }

    /// Copy of this context for a new run: same name and parameter values,
    /// no ports, no recorded error.
    pub fn fork(&self) -> Self {
        let fresh = Self::new(self.name());
        for parameter in self.parameters() {
            fresh.set_parameter(parameter.name(), parameter.value());
        }
        fresh
    }

    /// Whether two handles refer to the same context
    pub fn same_as(&self, other: &ActorContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorContext")
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Side channel for failures in phases that must not raise
pub trait ErrorReporter: Send + Sync {
    /// Record a failure observed while servicing `actor`
    fn report(&self, actor: &str, error: &DispatchError);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, actor: &str, error: &DispatchError) {
        tracing::error!(actor, error = %error, "script actor failure during shutdown phase");
    }
}

/// One recorded side-channel report
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Actor name
    pub actor: String,
    /// Rendered error
    pub message: String,
    /// When it was reported
    pub at: DateTime<Utc>,
}

/// Reporter that keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl CollectingReporter {
    /// Create an empty reporter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reports collected so far
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, actor: &str, error: &DispatchError) {
        tracing::warn!(actor, error = %error, "collected script actor failure");
        self.reports.lock().push(ErrorReport {
            actor: actor.to_string(),
            message: error.to_string(),
            at: Utc::now(),
        });
    }
}
