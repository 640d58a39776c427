//! Test support: a programmable in-memory script engine.
//!
//! [`ScriptedLanguage`] stands in for an interpreter of any language family.
//! Script texts are registered up front together with the classes and
//! functions they define. Loading a registered text replaces the session's
//! definitions with its own; evaluating one adds to them. Any other text is parsed as one of the assignment statements
//! the language adapters emit (`__actor = new C();`, `x.y = __y_binding`,
//! `Port input = __input_binding;` and so on), which lets every adapter run
//! against the same engine.
//!
//! Shared [`EngineStats`] count sessions, objects, and invocations, and log
//! each adapter statement for assertions.
//!
//! # Example
//!
//! ```
//! use script_actor::interpreter::Value;
//! use script_actor::interpreter::adapter::Metaclass;
//! use script_actor::runtime::{ActorContext, LanguageRegistry, PhaseOutcome, ScriptActor};
//! use script_actor::testing::{ClassDef, ScriptDef, ScriptedLanguage};
//!
//! let groovy = ScriptedLanguage::new("groovy");
//! groovy.script(
//!     "class Ready { boolean prefire() { true } }",
//!     ScriptDef::new().class("Ready", ClassDef::new().returning("prefire", Value::Boolean(true))),
//! );
//!
//! let registry = LanguageRegistry::from_languages([("groovy", groovy.support(Metaclass))]);
//! let mut actor = ScriptActor::new(ActorContext::new("ready"), registry);
//! actor.configure_language("groovy").unwrap();
//! actor.configure_script("class Ready { boolean prefire() { true } }", "Ready").unwrap();
//!
//! assert_eq!(actor.on_prefire().unwrap(), PhaseOutcome::Continue);
//! assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
//! assert_eq!(groovy.stats().invocations("prefire"), 1);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::interpreter::{
    HostValue, LanguageAdapter, ObjectRef, ScriptEngine, ScriptError, ScriptResult, ScriptValue,
    Value,
};
use crate::runtime::host::{ActorContext, ParameterRef, PortRef};
use crate::runtime::registry::LanguageSupport;

/// Body of a scripted method or function
pub type MethodFn = Arc<dyn Fn(&mut MethodCall<'_>) -> ScriptResult<ScriptValue> + Send + Sync>;

/// A scripted class: declared fields and methods
#[derive(Clone, Default)]
pub struct ClassDef {
    fields: Vec<String>,
    methods: HashMap<String, MethodFn>,
}

impl ClassDef {
    /// Class with no fields or methods
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a public field, initially nil
    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    /// Define a method
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut MethodCall<'_>) -> ScriptResult<ScriptValue> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(body));
        self
    }

    /// Define a method that returns a constant
    pub fn returning(self, name: &str, value: Value) -> Self {
        self.method(name, move |_| Ok(ScriptValue::Data(value.clone())))
    }
}

/// What evaluating one registered script text defines
#[derive(Clone, Default)]
pub struct ScriptDef {
    classes: HashMap<String, ClassDef>,
    functions: HashMap<String, MethodFn>,
    syntax_error: Option<String>,
}

impl ScriptDef {
    /// Script that defines nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a class
    pub fn class(mut self, name: &str, class: ClassDef) -> Self {
        self.classes.insert(name.to_string(), class);
        self
    }

    /// Define a free function
    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut MethodCall<'_>) -> ScriptResult<ScriptValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(body));
        self
    }

    /// Define a free function that returns a constant
    pub fn returning(self, name: &str, value: Value) -> Self {
        self.function(name, move |_| Ok(ScriptValue::Data(value.clone())))
    }

    /// Make evaluation fail with a syntax error
    pub fn syntax_error(mut self, message: &str) -> Self {
        self.syntax_error = Some(message.to_string());
        self
    }
}

/// Counters shared by every session of one [`ScriptedLanguage`]
#[derive(Debug, Default)]
pub struct EngineStats {
    sessions_created: AtomicUsize,
    live_sessions: AtomicUsize,
    objects_created: AtomicUsize,
    live_objects: AtomicUsize,
    invocations: Mutex<HashMap<String, usize>>,
    statements: Mutex<Vec<String>>,
    puts: Mutex<Vec<String>>,
}

impl EngineStats {
    /// Sessions ever created
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Sessions not yet dropped
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Objects ever constructed
    pub fn objects_created(&self) -> usize {
        self.objects_created.load(Ordering::SeqCst)
    }

    /// Constructed objects still referenced by some session
    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::SeqCst)
    }

    /// Times `method` was invoked, present or not
    pub fn invocations(&self, method: &str) -> usize {
        self.invocations.lock().get(method).copied().unwrap_or(0)
    }

    /// Adapter statements evaluated, in order
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Global names written through `put`, in order
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().clone()
    }

    /// Forget logged statements and puts
    pub fn clear_logs(&self) {
        self.statements.lock().clear();
        self.puts.lock().clear();
    }
}

/// A programmable language; hands out [`ScriptedEngine`] sessions
#[derive(Clone)]
pub struct ScriptedLanguage {
    name: String,
    scripts: Arc<RwLock<HashMap<String, ScriptDef>>>,
    stats: Arc<EngineStats>,
    invocation: bool,
}

impl ScriptedLanguage {
    /// Language with no registered scripts
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(EngineStats::default()),
            invocation: true,
        }
    }

    /// Sessions report that they cannot invoke named methods
    pub fn without_invocation(mut self) -> Self {
        self.invocation = false;
        self
    }

    /// Register what evaluating `text` defines
    pub fn script(&self, text: &str, definition: ScriptDef) -> &Self {
        self.scripts.write().insert(text.to_string(), definition);
        self
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Start a session
    pub fn engine(&self) -> ScriptedEngine {
        self.stats.sessions_created.fetch_add(1, Ordering::SeqCst);
        self.stats.live_sessions.fetch_add(1, Ordering::SeqCst);
        ScriptedEngine {
            language: self.name.clone(),
            scripts: self.scripts.clone(),
            stats: self.stats.clone(),
            invocation: self.invocation,
            classes: HashMap::new(),
            functions: HashMap::new(),
            globals: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    /// Registry entry pairing this language with `adapter`
    pub fn support<A>(&self, adapter: A) -> LanguageSupport
    where
        A: LanguageAdapter + 'static,
    {
        let language = self.clone();
        LanguageSupport::new(
            move || Ok(Box::new(language.engine()) as Box<dyn ScriptEngine>),
            adapter,
        )
    }
}

struct ScriptObject {
    class: String,
    fields: Mutex<BTreeMap<String, ScriptValue>>,
    stats: Arc<EngineStats>,
}

impl Drop for ScriptObject {
    fn drop(&mut self) {
        self.stats.live_objects.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
enum Slot {
    Value(ScriptValue),
    Object(Arc<ScriptObject>),
}

impl Slot {
    fn to_value(&self) -> ScriptValue {
        match self {
            Slot::Value(value) => value.clone(),
            Slot::Object(object) => ScriptValue::Opaque(object.class.clone()),
        }
    }
}

/// One session of a [`ScriptedLanguage`]
pub struct ScriptedEngine {
    language: String,
    scripts: Arc<RwLock<HashMap<String, ScriptDef>>>,
    stats: Arc<EngineStats>,
    invocation: bool,
    classes: HashMap<String, ClassDef>,
    functions: HashMap<String, MethodFn>,
    globals: HashMap<String, Slot>,
    declared: HashSet<String>,
}

impl ScriptedEngine {
    /// Plain value of a global, if defined
    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals.get(name).map(Slot::to_value)
    }

    fn definition(&self, source: &str) -> ScriptResult<Option<ScriptDef>> {
        match self.scripts.read().get(source) {
            Some(ScriptDef {
                syntax_error: Some(message),
                ..
            }) => Err(ScriptError::Syntax(message.clone())),
            Some(definition) => Ok(Some(definition.clone())),
            None => Ok(None),
        }
    }

    fn execute(&mut self, statement: &str) -> ScriptResult<ScriptValue> {
        let trimmed = statement.trim().trim_end_matches(';').trim();
        let trimmed = trimmed.strip_prefix("let ").unwrap_or(trimmed);
        let Some((target, expression)) = trimmed.split_once('=') else {
            return Err(ScriptError::Syntax(format!("unrecognised statement: {statement}")));
        };

        let value = self.evaluate(expression.trim())?;
        self.assign(target.trim(), value)?;
        Ok(ScriptValue::nil())
    }

    fn evaluate(&mut self, expression: &str) -> ScriptResult<Slot> {
        let class = expression
            .strip_prefix("new ")
            .and_then(|rest| rest.strip_suffix("()"))
            .or_else(|| expression.strip_suffix(".new()"))
            .or_else(|| expression.strip_suffix("()"));
        if let Some(class) = class {
            return self.instantiate(class.trim());
        }

        if is_identifier(expression) {
            return self
                .globals
                .get(expression)
                .cloned()
                .ok_or_else(|| ScriptError::Undefined(expression.to_string()));
        }
        Err(ScriptError::Syntax(format!(
            "unrecognised expression: {expression}"
        )))
    }

    fn instantiate(&mut self, class: &str) -> ScriptResult<Slot> {
        let definition = self
            .classes
            .get(class)
            .ok_or_else(|| ScriptError::Undefined(format!("class {class}")))?;

        let fields = definition
            .fields
            .iter()
            .map(|field| (field.clone(), ScriptValue::nil()))
            .collect();
        self.stats.objects_created.fetch_add(1, Ordering::SeqCst);
        self.stats.live_objects.fetch_add(1, Ordering::SeqCst);
        Ok(Slot::Object(Arc::new(ScriptObject {
            class: class.to_string(),
            fields: Mutex::new(fields),
            stats: self.stats.clone(),
        })))
    }

    fn assign(&mut self, target: &str, value: Slot) -> ScriptResult<()> {
        let path: Vec<&str> = target.split('.').map(str::trim).collect();
        match path.as_slice() {
            [declaration] => {
                let words: Vec<&str> = declaration.split_whitespace().collect();
                match words.as_slice() {
                    [name] => {
                        self.globals.insert(name.to_string(), value);
                        Ok(())
                    }
                    [_type, name] => {
                        if self.declared.contains(*name) && self.globals.contains_key(*name) {
                            return Err(ScriptError::raised(format!(
                                "duplicate definition of variable {name}"
                            )));
                        }
                        self.declared.insert(name.to_string());
                        self.globals.insert(name.to_string(), value);
                        Ok(())
                    }
                    _ => Err(ScriptError::Syntax(format!("bad declaration: {target}"))),
                }
            }
            ["__globals", name] => {
                self.globals.insert(name.to_string(), value);
                Ok(())
            }
            [object, name] | [object, "metaClass", name] => {
                let Some(Slot::Object(object)) = self.globals.get(*object) else {
                    return Err(ScriptError::Undefined((*object).to_string()));
                };
                object.fields.lock().insert(name.to_string(), value.to_value());
                Ok(())
            }
            _ => Err(ScriptError::Syntax(format!("bad assignment target: {target}"))),
        }
    }

    fn object(&self, handle: &ObjectRef) -> ScriptResult<Arc<ScriptObject>> {
        match self.globals.get(handle.name()) {
            Some(Slot::Object(object)) => Ok(object.clone()),
            _ => Err(ScriptError::Undefined(handle.name().to_string())),
        }
    }
}

impl ScriptEngine for ScriptedEngine {
    fn language(&self) -> &str {
        &self.language
    }

    fn supports_invocation(&self) -> bool {
        self.invocation
    }

    fn load(&mut self, source: &str) -> ScriptResult<()> {
        let definition = self.definition(source)?.unwrap_or_default();
        self.globals.clear();
        self.declared.clear();
        self.classes = definition.classes;
        self.functions = definition.functions;
        Ok(())
    }

    fn eval(&mut self, source: &str) -> ScriptResult<ScriptValue> {
        if let Some(definition) = self.definition(source)? {
            self.classes.extend(definition.classes);
            self.functions.extend(definition.functions);
            return Ok(ScriptValue::nil());
        }

        self.stats.statements.lock().push(source.to_string());
        self.execute(source)
    }

    fn put(&mut self, name: &str, value: ScriptValue) -> ScriptResult<()> {
        self.stats.puts.lock().push(name.to_string());
        self.globals.insert(name.to_string(), Slot::Value(value));
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    fn remove(&mut self, name: &str) {
        self.globals.remove(name);
        self.declared.remove(name);
    }

    fn has_field(&self, object: &ObjectRef, field: &str) -> bool {
        self.object(object)
            .map(|object| object.fields.lock().contains_key(field))
            .unwrap_or(false)
    }

    fn set_field(
        &mut self,
        object: &ObjectRef,
        field: &str,
        value: ScriptValue,
    ) -> ScriptResult<()> {
        self.object(object)?
            .fields
            .lock()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn invoke(&mut self, target: Option<&ObjectRef>, method: &str) -> ScriptResult<ScriptValue> {
        *self
            .stats
            .invocations
            .lock()
            .entry(method.to_string())
            .or_insert(0) += 1;

        let (this, body) = match target {
            Some(handle) => {
                let object = self.object(handle)?;
                let body = self
                    .classes
                    .get(&object.class)
                    .and_then(|class| class.methods.get(method))
                    .cloned();
                (Some(object), body)
            }
            None => (None, self.functions.get(method).cloned()),
        };
        let Some(body) = body else {
            return Err(ScriptError::MethodNotFound(method.to_string()));
        };

        let mut call = MethodCall {
            this,
            globals: &mut self.globals,
            method,
        };
        body(&mut call)
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.stats.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("language", &self.language)
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a scripted method body can see: its object's fields and the
/// session globals
pub struct MethodCall<'a> {
    this: Option<Arc<ScriptObject>>,
    globals: &'a mut HashMap<String, Slot>,
    method: &'a str,
}

impl MethodCall<'_> {
    /// Name of the running method
    pub fn method(&self) -> &str {
        self.method
    }

    /// Resolve a name: object field first, then global
    pub fn lookup(&self, name: &str) -> Option<ScriptValue> {
        if let Some(object) = &self.this {
            if let Some(value) = object.fields.lock().get(name) {
                return Some(value.clone());
            }
        }
        self.globals.get(name).map(Slot::to_value)
    }

    /// Resolve a bound port
    pub fn port(&self, name: &str) -> ScriptResult<PortRef> {
        match self.lookup(name) {
            Some(ScriptValue::Host(HostValue::Port(port))) => Ok(port),
            _ => Err(ScriptError::Undefined(name.to_string())),
        }
    }

    /// Resolve a bound parameter
    pub fn parameter(&self, name: &str) -> ScriptResult<ParameterRef> {
        match self.lookup(name) {
            Some(ScriptValue::Host(HostValue::Parameter(parameter))) => Ok(parameter),
            _ => Err(ScriptError::Undefined(name.to_string())),
        }
    }

    /// Resolve the actor surface bound as `actor`
    pub fn actor(&self) -> ScriptResult<ActorContext> {
        match self.lookup("actor") {
            Some(ScriptValue::Host(HostValue::Actor(context))) => Ok(context),
            _ => Err(ScriptError::Undefined("actor".to_string())),
        }
    }

    /// Assign an object field, or a global for free functions
    pub fn set(&mut self, name: &str, value: ScriptValue) {
        match &self.this {
            Some(object) => {
                object.fields.lock().insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), Slot::Value(value));
            }
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_forms() {
        let language = ScriptedLanguage::new("groovy");
        language.script("class A", ScriptDef::new().class("A", ClassDef::new()));
        let mut engine = language.engine();

        engine.load("class A").unwrap();
        engine.eval("__actor = new A();").unwrap();
        engine.put("__x_binding", ScriptValue::from(true)).unwrap();
        engine.eval("__actor.metaClass.x = __x_binding").unwrap();
        engine.eval("Port y = __x_binding;").unwrap();
        assert!(engine.eval("Port y = __x_binding;").is_err());
        assert!(matches!(
            engine.eval("__other = B()"),
            Err(ScriptError::Undefined(_))
        ));

        assert!(engine.has_field(&ObjectRef::new("__actor"), "x"));
        assert_eq!(language.stats().live_objects(), 1);
        engine.remove("__actor");
        assert_eq!(language.stats().live_objects(), 0);
    }

    #[test]
    fn test_missing_method_is_method_not_found() {
        let language = ScriptedLanguage::new("groovy");
        let mut engine = language.engine();
        assert!(matches!(
            engine.invoke(None, "fire"),
            Err(ScriptError::MethodNotFound(name)) if name == "fire"
        ));
        assert_eq!(language.stats().invocations("fire"), 1);
    }

    #[test]
    fn test_load_replaces_definitions() {
        let language = ScriptedLanguage::new("groovy");
        language.script("first", ScriptDef::new().returning("fire", Value::Nil));
        language.script("second", ScriptDef::new().returning("prefire", Value::Boolean(true)));
        language.script("extra", ScriptDef::new().returning("postfire", Value::Nil));
        let mut engine = language.engine();

        engine.load("first").unwrap();
        engine.load("second").unwrap();
        assert!(matches!(
            engine.invoke(None, "fire"),
            Err(ScriptError::MethodNotFound(_))
        ));

        engine.eval("extra").unwrap();
        assert!(engine.invoke(None, "prefire").is_ok());
        assert!(engine.invoke(None, "postfire").is_ok());
    }
}
