//! Rhai sessions
//!
//! Actor classes are zero-argument functions returning an object map;
//! lifecycle methods are script functions called with `this` bound to that
//! map. Scripts without a class define lifecycle methods as plain functions,
//! which run with `this` bound to the `__globals` map holding the bindings.
//!
//! ```rhai
//! fn Scale() { #{ factor: 2 } }
//! fn fire() {
//!     let x = this.input.get();
//!     this.output.broadcast(x * this.factor);
//! }
//! ```
//!
//! `eval` is reserved by Rhai, so the engine binding exposes
//! `evaluate(code)`. Functions it defines are callable from the next
//! lifecycle method on.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Position, Scope};

use super::adapter::{ACTOR_HANDLE, DirectProperty, GLOBALS_MAP, SelfReference};
use super::{
    EngineRef, HostValue, ObjectRef, ScriptEngine, ScriptError, ScriptResult, ScriptValue, Value,
};
use crate::runtime::host::{ActorContext, ExecutionTerminated, ParameterRef, PortError, PortRef};
use crate::runtime::registry::LanguageSupport;

/// Registry identifier
pub const LANGUAGE: &str = "rhai";

/// Registry identifier for Rhai scripts that reach ports through `this.actor`
pub const SELF_REFERENCE_LANGUAGE: &str = "rhai-self";

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Registry entry for Rhai
pub fn support() -> LanguageSupport {
    LanguageSupport::new(
        || Ok(Box::new(RhaiSession::new()) as Box<dyn ScriptEngine>),
        DirectProperty::rhai(),
    )
}

/// Registry entry for Rhai with only a back-reference to the actor injected
pub fn self_reference_support() -> LanguageSupport {
    LanguageSupport::new(
        || {
            Ok(Box::new(RhaiSession::with_language(SELF_REFERENCE_LANGUAGE))
                as Box<dyn ScriptEngine>)
        },
        SelfReference,
    )
}

#[derive(Clone)]
struct RhaiPort(PortRef);

#[derive(Clone)]
struct RhaiParameter(ParameterRef);

#[derive(Clone)]
struct RhaiActor(ActorContext);

/// State the engine binding shares with its session
#[derive(Default)]
struct Shared {
    functions: AST,
    globals: Map,
}

#[derive(Clone)]
struct RhaiEngineHandle {
    engine: Weak<Engine>,
    shared: Weak<Mutex<Shared>>,
    language: String,
}

impl RhaiEngineHandle {
    fn evaluate(&self, code: &str) -> RhaiResult<Dynamic> {
        let closed = || -> Box<EvalAltResult> { "interpreter session closed".into() };
        let engine = self.engine.upgrade().ok_or_else(closed)?;
        let shared = self.shared.upgrade().ok_or_else(closed)?;

        let ast = engine.compile(code)?;
        let (functions, globals) = {
            let state = shared.lock();
            (state.functions.clone(), state.globals.clone())
        };
        let mut scope = Scope::new();
        scope.push(GLOBALS_MAP, globals);
        let result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, &functions.merge(&ast))?;

        shared.lock().functions.combine(ast.clone_functions_only());
        Ok(result)
    }
}

fn port_failure(error: PortError) -> Box<EvalAltResult> {
    match error {
        PortError::Terminated(signal) => {
            Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(signal), Position::NONE))
        }
        other => other.to_string().into(),
    }
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();

    engine.on_print(|text| tracing::info!(target: "script_actor::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "script_actor::script", source, %pos, "{}", text)
    });

    engine
        .register_type_with_name::<RhaiPort>("Port")
        .register_fn("name", |port: &mut RhaiPort| port.0.name().to_string())
        .register_fn("has_token", |port: &mut RhaiPort| port.0.has_token())
        .register_fn("has_sink", |port: &mut RhaiPort| port.0.has_sink())
        .register_fn("get", |port: &mut RhaiPort| -> RhaiResult<Dynamic> {
            port.0.get().map(to_dynamic).map_err(port_failure)
        })
        .register_fn(
            "broadcast",
            |port: &mut RhaiPort, value: Dynamic| -> RhaiResult<()> {
                let value = to_value(value).map_err(|message| -> Box<EvalAltResult> { message.into() })?;
                port.0.broadcast(value).map_err(port_failure)
            },
        );

    engine
        .register_type_with_name::<RhaiParameter>("Parameter")
        .register_fn("name", |param: &mut RhaiParameter| param.0.name().to_string())
        .register_fn("value", |param: &mut RhaiParameter| to_dynamic(param.0.value()))
        .register_fn(
            "set",
            |param: &mut RhaiParameter, value: Dynamic| -> RhaiResult<()> {
                let value = to_value(value).map_err(|message| -> Box<EvalAltResult> { message.into() })?;
                param.0.set(value);
                Ok(())
            },
        );

    engine
        .register_type_with_name::<RhaiActor>("Actor")
        .register_fn("name", |actor: &mut RhaiActor| actor.0.name().to_string())
        .register_fn("report_error", |actor: &mut RhaiActor, message: &str| {
            actor.0.report_error(message)
        })
        .register_fn("port", |actor: &mut RhaiActor, name: &str| -> RhaiResult<RhaiPort> {
            actor
                .0
                .port(name)
                .map(RhaiPort)
                .ok_or_else(|| format!("no port named '{name}'").into())
        })
        .register_fn(
            "param",
            |actor: &mut RhaiActor, name: &str| -> RhaiResult<RhaiParameter> {
                actor
                    .0
                    .parameter(name)
                    .map(RhaiParameter)
                    .ok_or_else(|| format!("no parameter named '{name}'").into())
            },
        );

    engine
        .register_type_with_name::<RhaiEngineHandle>("Engine")
        .register_fn("language", |handle: &mut RhaiEngineHandle| handle.language.clone())
        .register_fn(
            "evaluate",
            |handle: &mut RhaiEngineHandle, code: &str| handle.evaluate(code),
        );

    engine
        .register_type_with_name::<ExecutionTerminated>("ExecutionTerminated")
        .register_fn("to_string", |signal: &mut ExecutionTerminated| signal.to_string())
        .register_fn("reason", |signal: &mut ExecutionTerminated| signal.reason.clone());

    engine
}

fn to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Nil => Dynamic::UNIT,
        Value::Boolean(b) => Dynamic::from(b),
        Value::Integer(i) => Dynamic::from(i as rhai::INT),
        Value::Float(f) => Dynamic::from(f as rhai::FLOAT),
        Value::String(s) => Dynamic::from(s),
        Value::List(items) => Dynamic::from_array(items.into_iter().map(to_dynamic).collect()),
        Value::Map(entries) => {
            let map: Map = entries
                .into_iter()
                .map(|(k, v)| (k.into(), to_dynamic(v)))
                .collect();
            Dynamic::from_map(map)
        }
    }
}

fn to_value(value: Dynamic) -> Result<Value, String> {
    if value.is_unit() {
        return Ok(Value::Nil);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Boolean(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::Integer(i as i64));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::Float(f as f64));
    }
    if value.is_string() {
        return value.into_string().map(Value::String).map_err(str::to_string);
    }
    if value.is_array() {
        let items = value.into_array().map_err(str::to_string)?;
        return items.into_iter().map(to_value).collect::<Result<_, _>>().map(Value::List);
    }
    if value.is_map() {
        let type_name = value.type_name().to_string();
        let map = value
            .try_cast::<Map>()
            .ok_or_else(|| format!("cannot read {type_name} as a map"))?;
        return map
            .into_iter()
            .map(|(k, v)| to_value(v).map(|v| (k.to_string(), v)))
            .collect::<Result<_, _>>()
            .map(Value::Map);
    }
    Err(format!("{} cannot leave the script", value.type_name()))
}

fn to_script_value(value: Dynamic) -> ScriptValue {
    if value.is::<RhaiPort>() {
        if let Some(port) = value.try_cast::<RhaiPort>() {
            return ScriptValue::Host(HostValue::Port(port.0));
        }
        return ScriptValue::nil();
    }
    if value.is::<RhaiParameter>() {
        if let Some(param) = value.try_cast::<RhaiParameter>() {
            return ScriptValue::Host(HostValue::Parameter(param.0));
        }
        return ScriptValue::nil();
    }
    if value.is::<RhaiActor>() {
        if let Some(actor) = value.try_cast::<RhaiActor>() {
            return ScriptValue::Host(HostValue::Actor(actor.0));
        }
        return ScriptValue::nil();
    }

    let type_name = value.type_name().to_string();
    match to_value(value) {
        Ok(value) => ScriptValue::Data(value),
        Err(_) => ScriptValue::Opaque(type_name),
    }
}

/// Whether `signature` (as Rhai renders it, e.g. `fire ()`) names `method`
fn names_method(signature: &str, method: &str) -> bool {
    signature
        .trim_start()
        .strip_prefix(method)
        .map(|rest| rest.is_empty() || rest.starts_with([' ', '(']))
        .unwrap_or(false)
}

fn termination_cause(error: &EvalAltResult) -> Option<ExecutionTerminated> {
    match error {
        EvalAltResult::ErrorRuntime(value, _) | EvalAltResult::ErrorTerminated(value, _) => {
            value.clone().try_cast::<ExecutionTerminated>()
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) | EvalAltResult::ErrorInModule(_, inner, _) => {
            termination_cause(inner)
        }
        _ => None,
    }
}

fn normalise(error: Box<EvalAltResult>, method: Option<&str>) -> ScriptError {
    if let Some(signal) = termination_cause(&error) {
        return ScriptError::terminated(signal);
    }
    match *error {
        EvalAltResult::ErrorFunctionNotFound(ref signature, _) => match method {
            Some(method) if names_method(signature, method) => {
                ScriptError::MethodNotFound(method.to_string())
            }
            _ => ScriptError::Undefined(signature.clone()),
        },
        EvalAltResult::ErrorVariableNotFound(ref name, _) => ScriptError::Undefined(name.clone()),
        EvalAltResult::ErrorParsing(..) => ScriptError::Syntax(error.to_string()),
        _ => ScriptError::raised(error.to_string()),
    }
}

fn base_scope() -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push(GLOBALS_MAP, Map::new());
    scope.push_dynamic(ACTOR_HANDLE, Dynamic::UNIT);
    scope
}

/// One Rhai interpreter session
pub struct RhaiSession {
    language: &'static str,
    engine: Arc<Engine>,
    scope: Scope<'static>,
    shared: Arc<Mutex<Shared>>,
}

impl RhaiSession {
    /// Fresh session with host types registered
    pub fn new() -> Self {
        Self::with_language(LANGUAGE)
    }

    /// Fresh session reporting `language` as its registry identifier
    pub fn with_language(language: &'static str) -> Self {
        Self {
            language,
            engine: Arc::new(build_engine()),
            scope: base_scope(),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    fn host_dynamic(&self, value: ScriptValue) -> Dynamic {
        match value {
            ScriptValue::Data(value) => to_dynamic(value),
            ScriptValue::Host(HostValue::Port(port)) => Dynamic::from(RhaiPort(port)),
            ScriptValue::Host(HostValue::Parameter(param)) => Dynamic::from(RhaiParameter(param)),
            ScriptValue::Host(HostValue::Actor(actor)) => Dynamic::from(RhaiActor(actor)),
            ScriptValue::Host(HostValue::Engine(EngineRef { language })) => {
                Dynamic::from(RhaiEngineHandle {
                    engine: Arc::downgrade(&self.engine),
                    shared: Arc::downgrade(&self.shared),
                    language,
                })
            }
            ScriptValue::Opaque(_) => Dynamic::UNIT,
        }
    }

    fn with_globals(&mut self, update: impl FnOnce(&mut Map)) {
        if let Some(slot) = self.scope.get_mut(GLOBALS_MAP) {
            if let Some(mut globals) = slot.write_lock::<Map>() {
                update(&mut globals);
            }
        }
        self.publish_globals();
    }

    /// Copy the globals map to where the engine binding can read it
    fn publish_globals(&self) {
        let globals = self.scope.get_value::<Map>(GLOBALS_MAP).unwrap_or_default();
        self.shared.lock().globals = globals;
    }

    fn functions(&self) -> AST {
        self.shared.lock().functions.clone()
    }
}

impl Default for RhaiSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for RhaiSession {
    fn language(&self) -> &str {
        self.language
    }

    fn load(&mut self, source: &str) -> ScriptResult<()> {
        self.scope = base_scope();
        *self.shared.lock() = Shared::default();

        let ast = self
            .engine
            .compile(source)
            .map_err(|error| ScriptError::Syntax(error.to_string()))?;
        self.shared.lock().functions = ast.clone_functions_only();

        let outcome = self.engine.run_ast_with_scope(&mut self.scope, &ast);
        self.publish_globals();
        outcome.map_err(|error| normalise(error, None))
    }

    fn eval(&mut self, source: &str) -> ScriptResult<ScriptValue> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|error| ScriptError::Syntax(error.to_string()))?;
        let combined = self.functions().merge(&ast);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &combined);
        self.publish_globals();
        let result = result.map_err(|error| normalise(error, None))?;
        self.shared.lock().functions.combine(ast.clone_functions_only());
        Ok(to_script_value(result))
    }

    fn put(&mut self, name: &str, value: ScriptValue) -> ScriptResult<()> {
        let value = self.host_dynamic(value);
        if name != GLOBALS_MAP {
            let mirrored = value.clone();
            self.with_globals(|globals| {
                globals.insert(name.into(), mirrored);
            });
        }
        self.scope.set_or_push(name, value);
        if name == GLOBALS_MAP {
            self.publish_globals();
        }
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.scope
            .get(name)
            .map(|value| !value.is_unit())
            .unwrap_or(false)
    }

    fn remove(&mut self, name: &str) {
        self.with_globals(|globals| {
            globals.remove(name);
        });
        if self.scope.contains(name) {
            self.scope.set_value(name, Dynamic::UNIT);
        }
    }

    fn has_field(&self, object: &ObjectRef, field: &str) -> bool {
        self.scope
            .get(object.name())
            .and_then(|value| value.read_lock::<Map>().map(|map| map.contains_key(field)))
            .unwrap_or(false)
    }

    fn set_field(
        &mut self,
        object: &ObjectRef,
        field: &str,
        value: ScriptValue,
    ) -> ScriptResult<()> {
        let value = self.host_dynamic(value);
        let slot = self
            .scope
            .get_mut(object.name())
            .ok_or_else(|| ScriptError::Undefined(object.name().to_string()))?;
        let mut map = slot.write_lock::<Map>().ok_or_else(|| {
            ScriptError::Unsupported(format!("{} is not an object map", object.name()))
        })?;
        map.insert(field.into(), value);
        Ok(())
    }

    fn invoke(&mut self, target: Option<&ObjectRef>, method: &str) -> ScriptResult<ScriptValue> {
        let this_name = target.map(ObjectRef::name).unwrap_or(GLOBALS_MAP);
        let mut this = self
            .scope
            .get(this_name)
            .cloned()
            .ok_or_else(|| ScriptError::Undefined(this_name.to_string()))?;

        let functions = self.functions();
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut this);
        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.scope,
            &functions,
            method,
            (),
        );

        if let Some(slot) = self.scope.get_mut(this_name) {
            *slot = this;
        }
        self.publish_globals();

        result
            .map(to_script_value)
            .map_err(|error| normalise(error, Some(method)))
    }
}
