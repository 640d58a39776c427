use super::{ACTOR_HANDLE, BindContext, LanguageAdapter, construct, inject_via_temporary, temp_name};
use crate::interpreter::{HostValue, ObjectRef, ScriptEngine, ScriptResult};

/// Map that stands in for the global namespace of Rhai free functions
pub const GLOBALS_MAP: &str = "__globals";

/// Statement syntax for direct property assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyDialect {
    /// Object maps and `this`-bound functions
    Rhai,
    /// Tables with a `new` constructor
    Lua,
}

/// Languages where a property can simply be assigned on the object.
#[derive(Debug, Clone, Copy)]
pub struct DirectProperty {
    dialect: PropertyDialect,
}

impl DirectProperty {
    /// Adapter for the given dialect
    pub fn new(dialect: PropertyDialect) -> Self {
        Self { dialect }
    }

    /// Rhai statement forms
    pub fn rhai() -> Self {
        Self::new(PropertyDialect::Rhai)
    }

    /// Lua statement forms
    pub fn lua() -> Self {
        Self::new(PropertyDialect::Lua)
    }

    /// Dialect in use
    pub fn dialect(&self) -> PropertyDialect {
        self.dialect
    }
}

impl LanguageAdapter for DirectProperty {
    fn name(&self) -> &'static str {
        match self.dialect {
            PropertyDialect::Rhai => "direct-property/rhai",
            PropertyDialect::Lua => "direct-property/lua",
        }
    }

    fn instantiate(
        &self,
        engine: &mut dyn ScriptEngine,
        class_name: &str,
    ) -> ScriptResult<ObjectRef> {
        let statement = match self.dialect {
            PropertyDialect::Rhai => format!("{ACTOR_HANDLE} = {class_name}();"),
            PropertyDialect::Lua => format!("{ACTOR_HANDLE} = {class_name}.new()"),
        };
        construct(engine, &statement)
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
        let statement = match (self.dialect, target) {
            (PropertyDialect::Rhai, Some(object)) => format!("{}.{name} = {temp};", object.name()),
            (PropertyDialect::Rhai, None) => format!("{GLOBALS_MAP}.{name} = {temp};"),
            (PropertyDialect::Lua, Some(object)) => format!("{}.{name} = {temp}", object.name()),
            (PropertyDialect::Lua, None) => format!("{name} = {temp}"),
        };
        inject_via_temporary(engine, name, value, &statement)
    }
}
