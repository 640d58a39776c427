use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::runtime::host::{ActorContext, ParameterRef, PortRef};

/// Plain data that crosses the host/script boundary: tokens, parameter
/// values, and method results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Boolean(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered sequence
    List(Vec<Value>),
    /// String-keyed record
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this is [`Value::Nil`]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Handle scripts use to reach their own interpreter session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRef {
    /// Language of the session
    pub language: String,
}

/// Host objects injected into a session
#[derive(Clone)]
pub enum HostValue {
    /// An actor port
    Port(PortRef),
    /// An actor parameter
    Parameter(ParameterRef),
    /// The actor surface (error reporting, port and parameter lookup)
    Actor(ActorContext),
    /// The session itself
    Engine(EngineRef),
}

impl HostValue {
    /// Host type name, as used in typed declarations
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Port(_) => "Port",
            HostValue::Parameter(_) => "Parameter",
            HostValue::Actor(_) => "Actor",
            HostValue::Engine(_) => "Engine",
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Port(port) => write!(f, "Port({})", port.name()),
            HostValue::Parameter(parameter) => write!(f, "Parameter({})", parameter.name()),
            HostValue::Actor(context) => write!(f, "Actor({})", context.name()),
            HostValue::Engine(engine) => write!(f, "Engine({})", engine.language),
        }
    }
}

/// Anything an engine can store or return
#[derive(Debug, Clone)]
pub enum ScriptValue {
    /// Plain data
    Data(Value),
    /// Host object
    Host(HostValue),
    /// Script-only value the host cannot inspect, by type name
    Opaque(String),
}

impl ScriptValue {
    /// The nil value
    pub fn nil() -> Self {
        ScriptValue::Data(Value::Nil)
    }

    /// Whether this is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Data(Value::Nil))
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Data(value) => value.as_bool(),
            _ => None,
        }
    }

    /// Type name for diagnostics
    pub fn type_name(&self) -> &str {
        match self {
            ScriptValue::Data(value) => value.type_name(),
            ScriptValue::Host(host) => host.type_name(),
            ScriptValue::Opaque(name) => name,
        }
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        ScriptValue::Data(value)
    }
}

impl From<HostValue> for ScriptValue {
    fn from(value: HostValue) -> Self {
        ScriptValue::Host(value)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Data(Value::Boolean(value))
    }
}
