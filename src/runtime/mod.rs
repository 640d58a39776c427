//! Script-actor runtime and public API
//!
//! This module ties the pieces together: the host collaborators an actor is
//! given, the language registry it resolves interpreters from, the dispatcher
//! that runs lifecycle phases, and the configuration that assembles all of it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod bindings;
pub mod director;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod presence;
pub mod registry;
pub mod source;
pub mod storage;

pub use bindings::{BindPass, Binding, BindingSet, CONTROL_BINDING, ENGINE_BINDING};
pub use director::{Director, RunReport};
pub use dispatcher::{DispatchState, PhaseOutcome, ScriptActor};
pub use error::{ConfigError, DispatchError, DispatchResult};
pub use host::{
    ActorContext, CollectingReporter, ErrorReporter, ExecutionTerminated, MemoryPort, Parameter,
    Port, PortError, TracingReporter,
};
pub use presence::{LifecycleMethod, MethodPresence};
pub use registry::{LanguageCatalog, LanguageRegistry, LanguageSupport};
pub use source::ScriptSource;

use crate::interpreter::Value;

/// Where the script text comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptLocation {
    /// Text embedded in the config
    Inline(String),
    /// File path, relative to the config file
    Path(PathBuf),
}

/// Configuration for one script actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Actor name
    pub name: String,

    /// Language identifier
    pub language: String,

    /// Declared actor class; empty for free functions
    #[serde(default)]
    pub class_name: String,

    /// Script text or file
    pub script: ScriptLocation,

    /// Initial parameter values
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    /// Input port names
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Output port names
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Fire iterations per run
    #[serde(default = "default_iterations")]
    pub iterations: usize,
}

fn default_iterations() -> usize {
    1
}

impl ActorConfig {
    /// Config with no class, parameters, or ports
    pub fn new(name: impl Into<String>, language: impl Into<String>, script: ScriptLocation) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            class_name: String::new(),
            script,
            parameters: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            iterations: default_iterations(),
        }
    }

    /// Build the actor with in-memory ports, select its language, and bind
    /// `script`.
    pub fn assemble(&self, script: &str, registry: LanguageRegistry) -> DispatchResult<Assembly> {
        let context = ActorContext::new(&self.name);

        let mut inputs = BTreeMap::new();
        for name in &self.inputs {
            let port = MemoryPort::input(name);
            context.add_port(port.clone());
            inputs.insert(name.clone(), port);
        }
        let mut outputs = Vec::new();
        for name in &self.outputs {
            let port = MemoryPort::output(name);
            context.add_port(port.clone());
            outputs.push(port);
        }
        for (name, value) in &self.parameters {
            context.set_parameter(name, value.clone());
        }

        let mut actor = ScriptActor::new(context, registry);
        actor.configure_language(&self.language)?;
        actor.configure_script(script, self.class_name.clone())?;

        Ok(Assembly {
            actor,
            inputs,
            outputs,
        })
    }
}

/// An assembled actor and the ports it was given
#[derive(Debug)]
pub struct Assembly {
    /// The actor
    pub actor: ScriptActor,
    /// Input ports by name
    pub inputs: BTreeMap<String, Arc<MemoryPort>>,
    /// Output ports in config order
    pub outputs: Vec<Arc<MemoryPort>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_shape() {
        let json = r#"{
            "name": "scale",
            "language": "rhai",
            "script": { "inline": "fn fire() {}" },
            "parameters": { "factor": 2 }
        }"#;
        let config: ActorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.script, ScriptLocation::Inline("fn fire() {}".into()));
        assert_eq!(config.parameters["factor"], Value::Integer(2));
        assert_eq!(config.iterations, 1);
        assert!(config.class_name.is_empty());
    }
}
