//! The lifecycle dispatcher behind every script actor
//!
//! A [`ScriptActor`] owns one interpreter session, evaluates the configured
//! script in it, binds the actor's ports and parameters, and turns each host
//! lifecycle callback into a method invocation with uniform outcome
//! semantics: a method the script does not define is simply
//! [`PhaseOutcome::NotPresent`].

use std::sync::Arc;

use uuid::Uuid;

use super::bindings::{BindPass, BindingSet};
use super::error::{ConfigError, DispatchError, DispatchResult, configuration};
use super::host::{ActorContext, ErrorReporter, ExecutionTerminated, TERMINATION_MARKER, TracingReporter};
use super::presence::{LifecycleMethod, MethodPresence};
use super::registry::LanguageRegistry;
use super::source::ScriptSource;
use crate::interpreter::adapter::temp_name;
use crate::interpreter::{
    BindContext, EngineRef, LanguageAdapter, ObjectRef, ScriptEngine, ScriptError, ScriptResult,
    ScriptValue,
};

/// Result of dispatching one lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The script does not define the method
    NotPresent,
    /// The method ran and returned nothing meaningful
    Executed,
    /// The method returned `true`
    Continue,
    /// The method returned `false`
    Stop,
}

impl PhaseOutcome {
    /// Boolean reading of the outcome, falling back to the host default
    /// when the method is absent or returned no boolean.
    pub fn or_default(self, default: bool) -> bool {
        match self {
            PhaseOutcome::Continue => true,
            PhaseOutcome::Stop => false,
            PhaseOutcome::NotPresent | PhaseOutcome::Executed => default,
        }
    }
}

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No session yet
    Uninitialized,
    /// Session created, script not yet bound
    Configured,
    /// Script evaluated and bindings injected
    Bound,
    /// Between initialize and wrapup
    Running,
    /// A stop has been requested
    Draining,
    /// Session released after wrapup or terminate
    Closed,
}

impl DispatchState {
    /// Whether the script is evaluated and bound in a live session
    pub fn is_bound(self) -> bool {
        matches!(
            self,
            DispatchState::Bound | DispatchState::Running | DispatchState::Draining
        )
    }
}

struct Session {
    language: String,
    engine: Box<dyn ScriptEngine>,
    adapter: Arc<dyn LanguageAdapter>,
    handle: Option<ObjectRef>,
}

/// A workflow actor whose behaviour is a script.
pub struct ScriptActor {
    id: Uuid,
    context: ActorContext,
    registry: LanguageRegistry,
    reporter: Arc<dyn ErrorReporter>,
    source: ScriptSource,
    session: Option<Session>,
    bound: Vec<String>,
    presence: MethodPresence,
    state: DispatchState,
    config_failed: bool,
}

impl ScriptActor {
    /// Create an unconfigured actor over `context`, resolving languages
    /// through `registry`.
    pub fn new(context: ActorContext, registry: LanguageRegistry) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            registry,
            reporter: Arc::new(TracingReporter),
            source: ScriptSource::default(),
            session: None,
            bound: Vec::new(),
            presence: MethodPresence::new(),
            state: DispatchState::Uninitialized,
            config_failed: false,
        }
    }

    /// Route shutdown-phase failures to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Instance id, for log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Host surface
    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    /// Actor name
    pub fn name(&self) -> &str {
        self.context.name()
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Configured source
    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// Whether an interpreter session is live
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Names bound in the last bind pass, in injection order
    pub fn bound_names(&self) -> &[String] {
        &self.bound
    }

    /// Methods known to be absent from the current script
    pub fn absent_methods(&self) -> Vec<LifecycleMethod> {
        self.presence.absent_methods()
    }

    /// Select the interpreter language.
    ///
    /// Re-selecting the current language with a live session does nothing.
    /// If a script is already recorded it is evaluated and bound immediately.
    pub fn configure_language(&mut self, language: &str) -> DispatchResult<()> {
        if self.source.language.as_deref() == Some(language) && self.session.is_some() {
            return Ok(());
        }

        self.release();
        self.source.language = Some(language.to_string());
        self.open_session(language)?;

        if self.source.has_script() {
            self.bind()?;
        }
        Ok(())
    }

    /// Set the script text and declared actor class.
    ///
    /// An identical source on a bound actor does nothing. Without a language
    /// the source is only recorded and bound once a language is configured.
    pub fn configure_script(
        &mut self,
        text: impl Into<String>,
        class_name: impl Into<String>,
    ) -> DispatchResult<()> {
        let candidate = ScriptSource {
            language: self.source.language.clone(),
            text: text.into(),
            class_name: class_name.into(),
        };
        if candidate == self.source && self.state.is_bound() {
            return Ok(());
        }

        self.source = candidate;
        self.presence.reset();
        self.config_failed = false;

        let Some(language) = self.source.language.clone() else {
            tracing::debug!(actor = %self.context.name(), "script recorded, waiting for a language");
            return Ok(());
        };
        if self.session.is_none() {
            self.open_session(&language)?;
        }
        self.bind()
    }

    /// `preinitialize` phase
    pub fn on_preinitialize(&mut self) -> DispatchResult<PhaseOutcome> {
        self.ensure_bound()?;
        self.dispatch(LifecycleMethod::Preinitialize)
    }

    /// `initialize` phase
    pub fn on_initialize(&mut self) -> DispatchResult<PhaseOutcome> {
        self.ensure_bound()?;
        if self.state.is_bound() {
            self.state = DispatchState::Running;
        }
        self.dispatch(LifecycleMethod::Initialize)
    }

    /// `prefire` phase; `Continue`/`Stop` report readiness
    pub fn on_prefire(&mut self) -> DispatchResult<PhaseOutcome> {
        self.ensure_bound()?;
        self.dispatch(LifecycleMethod::Prefire)
    }

    /// `fire` phase
    pub fn on_fire(&mut self) -> DispatchResult<PhaseOutcome> {
        self.ensure_bound()?;
        self.dispatch(LifecycleMethod::Fire)
    }

    /// `postfire` phase; `Stop` asks the host to end the run
    pub fn on_postfire(&mut self) -> DispatchResult<PhaseOutcome> {
        self.ensure_bound()?;
        self.dispatch(LifecycleMethod::Postfire)
    }

    /// `stop` phase. Failures go to the error reporter.
    pub fn on_stop(&mut self) -> PhaseOutcome {
        if self.state.is_bound() {
            self.state = DispatchState::Draining;
        }
        self.dispatch_quietly(LifecycleMethod::Stop)
    }

    /// `stopFire` phase. Failures go to the error reporter.
    pub fn on_stop_fire(&mut self) -> PhaseOutcome {
        self.dispatch_quietly(LifecycleMethod::StopFire)
    }

    /// `terminate` phase, then release the session. Failures go to the
    /// error reporter.
    pub fn on_terminate(&mut self) -> PhaseOutcome {
        let outcome = self.dispatch_quietly(LifecycleMethod::Terminate);
        self.close();
        outcome
    }

    /// `wrapup` phase, then release the session
    pub fn on_wrapup(&mut self) -> DispatchResult<PhaseOutcome> {
        if self.state.is_bound() {
            self.state = DispatchState::Draining;
        }
        let outcome = self.dispatch(LifecycleMethod::Wrapup);
        self.close();
        outcome
    }

    /// A fresh actor with the same language, script, class and parameter
    /// values, for a new run. Ports are not carried over.
    pub fn clone_for_run(&self) -> ScriptActor {
        let mut clone = ScriptActor::new(self.context.fork(), self.registry.clone())
            .with_reporter(self.reporter.clone());
        clone.source = self.source.clone();
        clone
    }

    fn fail(&mut self, source: ConfigError) -> DispatchError {
        self.config_failed = true;
        configuration(self.context.name(), source)
    }

    fn open_session(&mut self, language: &str) -> DispatchResult<()> {
        let support = match self.registry.get(language) {
            Some(support) => support.clone(),
            None => return Err(self.fail(ConfigError::UnknownLanguage(language.to_string()))),
        };

        let engine = match support.create_engine() {
            Ok(engine) => engine,
            Err(source) => {
                return Err(self.fail(ConfigError::Session {
                    language: language.to_string(),
                    source,
                }));
            }
        };
        if !engine.supports_invocation() {
            return Err(self.fail(ConfigError::InvocationUnsupported(language.to_string())));
        }

        tracing::debug!(
            actor = %self.context.name(),
            language,
            adapter = support.adapter.name(),
            "interpreter session created"
        );
        self.session = Some(Session {
            language: language.to_string(),
            engine,
            adapter: support.adapter,
            handle: None,
        });
        self.state = DispatchState::Configured;
        Ok(())
    }

    fn bind(&mut self) -> DispatchResult<()> {
        self.clear_bindings();
        self.presence.reset();

        match self.bind_session() {
            Ok(()) => {
                tracing::debug!(
                    actor = %self.context.name(),
                    script = %self.source.fingerprint(),
                    bindings = ?self.bound,
                    "script bound"
                );
                self.state = DispatchState::Bound;
                Ok(())
            }
            Err(source) => {
                self.state = DispatchState::Configured;
                Err(self.fail(source))
            }
        }
    }

    fn bind_session(&mut self) -> Result<(), ConfigError> {
        let Self {
            context,
            source,
            session,
            bound,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return Err(ConfigError::UnknownLanguage(
                source.language.clone().unwrap_or_default(),
            ));
        };

        session
            .engine
            .load(&source.text)
            .map_err(ConfigError::Evaluation)?;

        if !source.uses_free_functions() {
            let class = source.class_name.trim();
            let handle = session
                .adapter
                .instantiate(session.engine.as_mut(), class)
                .map_err(|source| ConfigError::Instantiation {
                    class: class.to_string(),
                    source,
                })?;
            session.handle = Some(handle);
        }

        let bindings = BindingSet::collect(
            context,
            session.adapter.control_name(),
            EngineRef {
                language: session.language.clone(),
            },
        );
        let bind = BindContext {
            actor: context,
            language: &session.language,
        };
        let mut pass = BindPass::new();
        for binding in bindings.iter() {
            if !pass.claim(&binding.name) || !session.adapter.injects(&binding.name) {
                continue;
            }
            bound.push(binding.name.clone());
            session
                .adapter
                .inject(
                    session.engine.as_mut(),
                    session.handle.as_ref(),
                    &binding.name,
                    &binding.value,
                    &bind,
                )
                .map_err(|source| ConfigError::Injection {
                    name: binding.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn clear_bindings(&mut self) {
        let names = std::mem::take(&mut self.bound);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for name in &names {
            session.engine.remove(name);
            session.engine.remove(&temp_name(name));
        }
        for name in session.adapter.session_globals() {
            session.engine.remove(name);
        }
        if let Some(handle) = session.handle.take() {
            session.engine.remove(handle.name());
        }
    }

    fn release(&mut self) {
        self.clear_bindings();
        if let Some(session) = self.session.take() {
            tracing::debug!(
                actor = %self.context.name(),
                language = %session.language,
                "interpreter session released"
            );
        }
        self.presence.reset();
    }

    fn close(&mut self) {
        self.release();
        self.state = DispatchState::Closed;
    }

    fn ensure_bound(&mut self) -> DispatchResult<()> {
        if self.state.is_bound() || self.config_failed || !self.source.has_script() {
            return Ok(());
        }
        let Some(language) = self.source.language.clone() else {
            return Ok(());
        };

        if self.session.is_none() {
            self.open_session(&language)?;
        }
        self.bind()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(actor = %self.context.name()))]
    fn dispatch(&mut self, method: LifecycleMethod) -> DispatchResult<PhaseOutcome> {
        if self.presence.is_absent(method) {
            tracing::trace!("method known absent");
            return Ok(PhaseOutcome::NotPresent);
        }
        if self.config_failed || !self.state.is_bound() {
            return Ok(PhaseOutcome::NotPresent);
        }

        self.context.take_reported_error();
        let result = match self.session.as_mut() {
            Some(session) => session.engine.invoke(session.handle.as_ref(), method.name()),
            None => return Ok(PhaseOutcome::NotPresent),
        };
        let reported = self.context.take_reported_error();

        self.classify(method, result, reported)
    }

    fn classify(
        &mut self,
        method: LifecycleMethod,
        result: ScriptResult<ScriptValue>,
        reported: Option<String>,
    ) -> DispatchResult<PhaseOutcome> {
        let value = match result {
            Ok(value) => value,
            Err(error) => {
                if let Some(signal) = error.termination() {
                    return Err(DispatchError::Terminated(signal));
                }
                // Some engines only keep the text of a host error.
                if error.mentions_termination() {
                    return Err(DispatchError::Terminated(termination_from_text(
                        &error.to_string(),
                    )));
                }
                if let ScriptError::MethodNotFound(_) = error {
                    tracing::debug!(%method, "method not defined by script");
                    self.presence.mark_absent(method);
                    return Ok(PhaseOutcome::NotPresent);
                }
                if let Some(message) = reported {
                    return Err(DispatchError::ScriptReported { method, message });
                }
                return Err(DispatchError::Script {
                    method,
                    source: error,
                });
            }
        };

        if let Some(message) = reported {
            return Err(DispatchError::ScriptReported { method, message });
        }

        match value.as_bool() {
            Some(true) => Ok(PhaseOutcome::Continue),
            Some(false) => Ok(PhaseOutcome::Stop),
            None if value.is_nil() => Ok(PhaseOutcome::Executed),
            None => {
                tracing::warn!(
                    %method,
                    returned = value.type_name(),
                    "lifecycle method returned a non-boolean value, ignoring it"
                );
                Ok(PhaseOutcome::Executed)
            }
        }
    }

    fn dispatch_quietly(&mut self, method: LifecycleMethod) -> PhaseOutcome {
        match self.dispatch(method) {
            Ok(outcome) => outcome,
            Err(DispatchError::Terminated(signal)) => {
                tracing::info!(
                    actor = %self.context.name(),
                    %method,
                    reason = %signal.reason,
                    "termination signal during shutdown phase"
                );
                PhaseOutcome::Executed
            }
            Err(error) => {
                self.reporter.report(self.context.name(), &error);
                PhaseOutcome::Executed
            }
        }
    }
}

fn termination_from_text(message: &str) -> ExecutionTerminated {
    let marker = format!("{TERMINATION_MARKER}: ");
    match message.split_once(&marker) {
        Some((_, reason)) => ExecutionTerminated::new(reason),
        None => ExecutionTerminated::new(message),
    }
}

impl std::fmt::Debug for ScriptActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptActor")
            .field("id", &self.id)
            .field("name", &self.context.name())
            .field("language", &self.source.language)
            .field("class_name", &self.source.class_name)
            .field("state", &self.state)
            .finish()
    }
}
