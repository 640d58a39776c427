use super::{ACTOR_HANDLE, BindContext, LanguageAdapter, construct};
use crate::interpreter::{
    HostValue, ObjectRef, ScriptEngine, ScriptError, ScriptResult, ScriptValue,
};
use crate::runtime::bindings::CONTROL_BINDING;

/// Reserved binding name that carries the dispatcher surface
pub const SELF_BINDING: &str = "self";

/// Global holding the dispatcher surface while it is attached to the object
pub const SELF_GLOBAL: &str = "__self";

/// Class tried when the declared class is undefined
pub const LEGACY_CLASS_NAME: &str = "Main";

/// Languages whose objects receive only a back-reference to the dispatcher.
///
/// Scripts reach ports and parameters through that reference instead of
/// having each one injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfReference;

impl LanguageAdapter for SelfReference {
    fn name(&self) -> &'static str {
        "self-reference"
    }

    fn control_name(&self) -> &'static str {
        SELF_BINDING
    }

    fn session_globals(&self) -> &'static [&'static str] {
        &[SELF_GLOBAL, CONTROL_BINDING]
    }

    fn injects(&self, name: &str) -> bool {
        name == SELF_BINDING
    }

    fn instantiate(
        &self,
        engine: &mut dyn ScriptEngine,
        class_name: &str,
    ) -> ScriptResult<ObjectRef> {
        match construct(engine, &format!("{ACTOR_HANDLE} = {class_name}()")) {
            Err(ScriptError::Undefined(missing)) if class_name != LEGACY_CLASS_NAME => {
                tracing::debug!(
                    class = class_name,
                    %missing,
                    "declared class undefined, falling back to {}",
                    LEGACY_CLASS_NAME
                );
                construct(engine, &format!("{ACTOR_HANDLE} = {LEGACY_CLASS_NAME}()"))
            }
            other => other,
        }
    }

    fn inject(
        &self,
        engine: &mut dyn ScriptEngine,
        target: Option<&ObjectRef>,
        name: &str,
        _value: &HostValue,
        bind: &BindContext<'_>,
    ) -> ScriptResult<()> {
        if name != SELF_BINDING {
            return Ok(());
        }

        let surface = ScriptValue::Host(HostValue::Actor(bind.actor.clone()));
        match target {
            Some(object) => {
                engine.put(SELF_GLOBAL, surface)?;
                engine.eval(&format!("{}.{CONTROL_BINDING} = {SELF_GLOBAL}", object.name()))?;
                Ok(())
            }
            None => engine.put(CONTROL_BINDING, surface),
        }
    }
}
