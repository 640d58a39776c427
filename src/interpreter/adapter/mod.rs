//! Per-language strategies for constructing the actor object and making host
//! values visible to it.
//!
//! One adapter is chosen when a session is created and used for every bind
//! pass of that session. The four families differ only in the statements they
//! evaluate; the session mechanics (`put`, `eval`, `remove`) are shared.

mod direct;
mod metaclass;
mod reflective;
mod self_ref;

pub use direct::{DirectProperty, GLOBALS_MAP, PropertyDialect};
pub use metaclass::Metaclass;
pub use reflective::ReflectiveField;
pub use self_ref::{LEGACY_CLASS_NAME, SELF_BINDING, SELF_GLOBAL, SelfReference};

use super::{HostValue, ObjectRef, ScriptEngine, ScriptError, ScriptResult, ScriptValue};
use crate::runtime::bindings::CONTROL_BINDING;
use crate::runtime::host::ActorContext;

/// Session global that holds the constructed actor object
pub const ACTOR_HANDLE: &str = "__actor";

/// Mangled name of the temporary global used while copying `name` into place
pub fn temp_name(name: &str) -> String {
    format!("__{name}_binding")
}

/// What an adapter may need to know about the dispatcher during a bind pass
#[derive(Debug, Clone, Copy)]
pub struct BindContext<'a> {
    /// The dispatcher's host surface
    pub actor: &'a ActorContext,
    /// Language of the session being bound
    pub language: &'a str,
}

/// Instantiation and injection strategy for one language family
pub trait LanguageAdapter: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Binding name for the dispatcher's own surface
    fn control_name(&self) -> &'static str {
        CONTROL_BINDING
    }

    /// Extra globals this adapter defines that must be cleared on rebind
    fn session_globals(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether a binding with this name is injected at all
    fn injects(&self, _name: &str) -> bool {
        true
    }

    /// Construct the declared actor class and return a handle to it
    fn instantiate(
        &self,
        engine: &mut dyn ScriptEngine,
        class_name: &str,
    ) -> ScriptResult<ObjectRef> {
        construct(engine, &format!("{ACTOR_HANDLE} = new {class_name}();"))
    }

    /// Make `value` visible to the script as `name`, on `target` when there
    /// is an actor object and in the global namespace otherwise
    fn inject(
        &self,
        engine: &mut dyn ScriptEngine,
        target: Option<&ObjectRef>,
        name: &str,
        value: &HostValue,
        bind: &BindContext<'_>,
    ) -> ScriptResult<()>;
}

/// Evaluate a construction statement that assigns [`ACTOR_HANDLE`].
///
/// Any previous handle is removed first so a stale object is never returned.
pub fn construct(engine: &mut dyn ScriptEngine, statement: &str) -> ScriptResult<ObjectRef> {
    engine.remove(ACTOR_HANDLE);
    engine.eval(statement)?;
    if engine.contains(ACTOR_HANDLE) {
        Ok(ObjectRef::new(ACTOR_HANDLE))
    } else {
        Err(ScriptError::Undefined(format!(
            "construction did not define {ACTOR_HANDLE}"
        )))
    }
}

/// Copy `value` into place through a temporary global.
///
/// `statement` must read the temporary named by [`temp_name`]; the temporary
/// is removed whether or not the statement succeeds.
pub fn inject_via_temporary(
    engine: &mut dyn ScriptEngine,
    name: &str,
    value: &HostValue,
    statement: &str,
) -> ScriptResult<()> {
    let temp = temp_name(name);
    engine.put(&temp, ScriptValue::Host(value.clone()))?;
    let result = engine.eval(statement);
    engine.remove(&temp);
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_name_mangling() {
        assert_eq!(temp_name("input"), "__input_binding");
    }
}
