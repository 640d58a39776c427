//! Lua sessions backed by `mlua`
//!
//! Actor classes are tables with a `new` constructor; lifecycle methods are
//! called with the instance as `self`. Without a class, lifecycle methods are
//! global functions and bindings are globals.
//!
//! ```lua
//! Scale = {}
//! Scale.__index = Scale
//! function Scale.new() return setmetatable({ factor = 2 }, Scale) end
//! function Scale:fire() self.output:broadcast(self.input:get() * self.factor) end
//! ```

use std::collections::HashSet;

use mlua::{AnyUserData, Lua, Table, UserData, UserDataMethods, Value as LuaValue, Variadic};

use super::adapter::DirectProperty;
use super::{
    EngineRef, HostValue, ObjectRef, ScriptEngine, ScriptError, ScriptResult, ScriptValue, Value,
};
use crate::runtime::host::{ActorContext, ExecutionTerminated, ParameterRef, PortError, PortRef};
use crate::runtime::registry::LanguageSupport;

/// Registry identifier
pub const LANGUAGE: &str = "lua";

/// Registry entry for Lua
pub fn support() -> LanguageSupport {
    LanguageSupport::new(
        || Ok(Box::new(LuaSession::new()?) as Box<dyn ScriptEngine>),
        DirectProperty::lua(),
    )
}

struct LuaPort(PortRef);

struct LuaParameter(ParameterRef);

struct LuaActor(ActorContext);

struct LuaEngineHandle(String);

fn port_failure(error: PortError) -> mlua::Error {
    mlua::Error::external(error)
}

impl UserData for LuaPort {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| Ok(this.0.name().to_string()));
        methods.add_method("has_token", |_, this, ()| Ok(this.0.has_token()));
        methods.add_method("has_sink", |_, this, ()| Ok(this.0.has_sink()));
        methods.add_method("get", |lua, this, ()| {
            let value = this.0.get().map_err(port_failure)?;
            to_lua(lua, value)
        });
        methods.add_method("broadcast", |_, this, value: LuaValue| {
            this.0.broadcast(from_lua(value)?).map_err(port_failure)
        });
    }
}

impl UserData for LuaParameter {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| Ok(this.0.name().to_string()));
        methods.add_method("value", |lua, this, ()| to_lua(lua, this.0.value()));
        methods.add_method("set", |_, this, value: LuaValue| {
            this.0.set(from_lua(value)?);
            Ok(())
        });
    }
}

impl UserData for LuaActor {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| Ok(this.0.name().to_string()));
        methods.add_method("report_error", |_, this, message: String| {
            this.0.report_error(message);
            Ok(())
        });
        methods.add_method("port", |_, this, name: String| {
            this.0
                .port(&name)
                .map(LuaPort)
                .ok_or_else(|| mlua::Error::RuntimeError(format!("no port named '{name}'")))
        });
        methods.add_method("param", |_, this, name: String| {
            this.0
                .parameter(&name)
                .map(LuaParameter)
                .ok_or_else(|| mlua::Error::RuntimeError(format!("no parameter named '{name}'")))
        });
    }
}

impl UserData for LuaEngineHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("language", |_, this, ()| Ok(this.0.clone()));
        methods.add_method("eval", |lua, _, code: String| {
            lua.load(code).set_name("engine:eval").eval::<LuaValue>()
        });
    }
}

fn to_lua(lua: &Lua, value: Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        Value::Nil => LuaValue::Nil,
        Value::Boolean(b) => LuaValue::Boolean(b),
        Value::Integer(i) => LuaValue::Integer(i as mlua::Integer),
        Value::Float(f) => LuaValue::Number(f),
        Value::String(s) => LuaValue::String(lua.create_string(&s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (index, item) in items.into_iter().enumerate() {
                table.raw_set(index + 1, to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Map(entries) => {
            let table = lua.create_table()?;
            for (key, item) in entries {
                table.raw_set(key, to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

fn from_lua(value: LuaValue) -> mlua::Result<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Nil),
        LuaValue::Boolean(b) => Ok(Value::Boolean(b)),
        LuaValue::Integer(i) => Ok(Value::Integer(i as i64)),
        LuaValue::Number(n) => Ok(Value::Float(n)),
        LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
        LuaValue::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut items = Vec::with_capacity(len);
                for index in 1..=len {
                    items.push(from_lua(table.raw_get(index)?)?);
                }
                Ok(Value::List(items))
            } else {
                let mut entries = std::collections::BTreeMap::new();
                for pair in table.pairs::<String, LuaValue>() {
                    let (key, item) = pair?;
                    entries.insert(key, from_lua(item)?);
                }
                Ok(Value::Map(entries))
            }
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "{} cannot leave the script",
            other.type_name()
        ))),
    }
}

fn host_from_userdata(data: &AnyUserData) -> Option<HostValue> {
    if let Ok(port) = data.borrow::<LuaPort>() {
        return Some(HostValue::Port(port.0.clone()));
    }
    if let Ok(param) = data.borrow::<LuaParameter>() {
        return Some(HostValue::Parameter(param.0.clone()));
    }
    if let Ok(actor) = data.borrow::<LuaActor>() {
        return Some(HostValue::Actor(actor.0.clone()));
    }
    None
}

fn to_script_value(value: LuaValue) -> ScriptValue {
    if let LuaValue::UserData(data) = &value {
        if let Some(host) = host_from_userdata(data) {
            return ScriptValue::Host(host);
        }
    }
    let type_name = value.type_name().to_string();
    match from_lua(value) {
        Ok(value) => ScriptValue::Data(value),
        Err(_) => ScriptValue::Opaque(type_name),
    }
}

fn termination_cause(error: &mlua::Error) -> Option<ExecutionTerminated> {
    match error {
        mlua::Error::ExternalError(inner) => {
            if let Some(signal) = inner.downcast_ref::<ExecutionTerminated>() {
                return Some(signal.clone());
            }
            match inner.downcast_ref::<PortError>() {
                Some(PortError::Terminated(signal)) => Some(signal.clone()),
                _ => None,
            }
        }
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            termination_cause(cause)
        }
        _ => None,
    }
}

fn normalise(error: mlua::Error) -> ScriptError {
    if let Some(signal) = termination_cause(&error) {
        return ScriptError::terminated(signal);
    }
    match error {
        mlua::Error::SyntaxError { message, .. } => ScriptError::Syntax(message),
        other => ScriptError::raised(other.to_string()),
    }
}

fn render(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::String(s) => format!("{}", s.to_string_lossy()),
        other => other.type_name().to_string(),
    }
}

/// One Lua interpreter session
pub struct LuaSession {
    lua: Lua,
    /// Globals present before any script ran
    builtins: HashSet<String>,
}

impl LuaSession {
    /// Fresh session with `print` routed to tracing
    pub fn new() -> ScriptResult<Self> {
        let lua = Lua::new();
        let print = lua
            .create_function(|_, args: Variadic<LuaValue>| {
                let line: Vec<String> = args.iter().map(render).collect();
                tracing::info!(target: "script_actor::script", "{}", line.join("\t"));
                Ok(())
            })
            .map_err(normalise)?;
        lua.globals().set("print", print).map_err(normalise)?;

        let mut builtins = HashSet::new();
        for pair in lua.globals().pairs::<LuaValue, LuaValue>() {
            if let (LuaValue::String(name), _) = pair.map_err(normalise)? {
                builtins.insert(name.to_string_lossy().to_string());
            }
        }
        Ok(Self { lua, builtins })
    }

    /// Drop every global a script or bind pass added
    fn clear_script_globals(&self) -> mlua::Result<()> {
        let globals = self.lua.globals();
        let mut stale = Vec::new();
        for pair in globals.clone().pairs::<LuaValue, LuaValue>() {
            let (key, _) = pair?;
            let builtin = matches!(
                &key,
                LuaValue::String(name) if self.builtins.contains(&*name.to_string_lossy())
            );
            if !builtin {
                stale.push(key);
            }
        }
        for key in stale {
            globals.raw_set(key, LuaValue::Nil)?;
        }
        Ok(())
    }

    fn to_lua_value(&self, value: ScriptValue) -> mlua::Result<LuaValue> {
        let data = match value {
            ScriptValue::Data(value) => return to_lua(&self.lua, value),
            ScriptValue::Opaque(_) => return Ok(LuaValue::Nil),
            ScriptValue::Host(HostValue::Port(port)) => self.lua.create_userdata(LuaPort(port))?,
            ScriptValue::Host(HostValue::Parameter(param)) => {
                self.lua.create_userdata(LuaParameter(param))?
            }
            ScriptValue::Host(HostValue::Actor(actor)) => self.lua.create_userdata(LuaActor(actor))?,
            ScriptValue::Host(HostValue::Engine(EngineRef { language })) => {
                self.lua.create_userdata(LuaEngineHandle(language))?
            }
        };
        Ok(LuaValue::UserData(data))
    }

    fn object(&self, object: &ObjectRef) -> ScriptResult<Table> {
        match self.lua.globals().get::<LuaValue>(object.name()).map_err(normalise)? {
            LuaValue::Table(table) => Ok(table),
            _ => Err(ScriptError::Undefined(object.name().to_string())),
        }
    }
}

impl ScriptEngine for LuaSession {
    fn language(&self) -> &str {
        LANGUAGE
    }

    fn load(&mut self, source: &str) -> ScriptResult<()> {
        self.clear_script_globals().map_err(normalise)?;
        self.lua
            .load(source)
            .set_name("script")
            .exec()
            .map_err(normalise)
    }

    fn eval(&mut self, source: &str) -> ScriptResult<ScriptValue> {
        self.lua
            .load(source)
            .set_name("script")
            .eval::<LuaValue>()
            .map(to_script_value)
            .map_err(normalise)
    }

    fn put(&mut self, name: &str, value: ScriptValue) -> ScriptResult<()> {
        let value = self.to_lua_value(value).map_err(normalise)?;
        self.lua.globals().set(name, value).map_err(normalise)
    }

    fn contains(&self, name: &str) -> bool {
        matches!(
            self.lua.globals().get::<LuaValue>(name),
            Ok(value) if !value.is_nil()
        )
    }

    fn remove(&mut self, name: &str) {
        if let Err(error) = self.lua.globals().set(name, LuaValue::Nil) {
            tracing::debug!(name, %error, "failed to clear Lua global");
        }
    }

    fn has_field(&self, object: &ObjectRef, field: &str) -> bool {
        self.object(object)
            .and_then(|table| table.contains_key(field).map_err(normalise))
            .unwrap_or(false)
    }

    fn set_field(
        &mut self,
        object: &ObjectRef,
        field: &str,
        value: ScriptValue,
    ) -> ScriptResult<()> {
        let table = self.object(object)?;
        let value = self.to_lua_value(value).map_err(normalise)?;
        table.set(field, value).map_err(normalise)
    }

    fn invoke(&mut self, target: Option<&ObjectRef>, method: &str) -> ScriptResult<ScriptValue> {
        let (callee, receiver) = match target {
            Some(object) => {
                let table = self.object(object)?;
                let callee = table.get::<LuaValue>(method).map_err(normalise)?;
                (callee, Some(table))
            }
            None => {
                let callee = self.lua.globals().get::<LuaValue>(method).map_err(normalise)?;
                (callee, None)
            }
        };

        let function = match callee {
            LuaValue::Function(function) => function,
            LuaValue::Nil => return Err(ScriptError::MethodNotFound(method.to_string())),
            other => {
                return Err(ScriptError::raised(format!(
                    "'{method}' is a {}, not a function",
                    other.type_name()
                )));
            }
        };

        let result = match receiver {
            Some(table) => function.call::<LuaValue>(table),
            None => function.call::<LuaValue>(()),
        };
        result.map(to_script_value).map_err(normalise)
    }
}
