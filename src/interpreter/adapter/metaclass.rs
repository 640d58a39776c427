use super::{BindContext, LanguageAdapter, inject_via_temporary, temp_name};
use crate::interpreter::{HostValue, ObjectRef, ScriptEngine, ScriptResult};

/// Dynamic languages that attach properties through an object's metaclass.
#[derive(Debug, Default, Clone, Copy)]
pub struct Metaclass;

impl LanguageAdapter for Metaclass {
    fn name(&self) -> &'static str {
        "metaclass"
    }

    fn inject(
        &self,
        engine: &mut dyn ScriptEngine,
        target: Option<&ObjectRef>,
        name: &str,
        value: &HostValue,
        _bind: &BindContext<'_>,
    ) -> ScriptResult<()> {
        let temp = temp_name(name);
        let statement = match target {
            Some(object) => format!("{}.metaClass.{name} = {temp}", object.name()),
            None => format!("{name} = {temp}"),
        };
        inject_via_temporary(engine, name, value, &statement)
    }
}
