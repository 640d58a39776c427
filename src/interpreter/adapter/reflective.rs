use super::{BindContext, LanguageAdapter, inject_via_temporary, temp_name};
use crate::interpreter::{HostValue, ObjectRef, ScriptEngine, ScriptResult, ScriptValue};

/// Statically typed languages with reflective field access.
///
/// A declared public field is assigned directly; otherwise a typed global is
/// declared from a temporary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReflectiveField;

impl LanguageAdapter for ReflectiveField {
    fn name(&self) -> &'static str {
        "reflective-field"
    }

    fn inject(
        &self,
        engine: &mut dyn ScriptEngine,
        target: Option<&ObjectRef>,
        name: &str,
        value: &HostValue,
        _bind: &BindContext<'_>,
    ) -> ScriptResult<()> {
        if let Some(object) = target {
            if engine.has_field(object, name) {
                return engine.set_field(object, name, ScriptValue::Host(value.clone()));
            }
        }

        let statement = format!("{} {} = {};", value.type_name(), name, temp_name(name));
        inject_via_temporary(engine, name, value, &statement)
    }
}
