//! Termination signal tests
//!
//! The host's termination signal must come back out of the dispatcher as
//! itself, whether the engine preserved the original error or only its text,
//! and must never be reported as an actor failure.

use std::sync::Arc;

use script_actor::interpreter::adapter::Metaclass;
use script_actor::interpreter::{ScriptError, ScriptValue, Value};
use script_actor::runtime::{
    ActorContext, CollectingReporter, DispatchError, Director, ExecutionTerminated,
    LanguageRegistry, MemoryPort, PhaseOutcome, ScriptActor,
};
use script_actor::testing::{ScriptDef, ScriptedLanguage};

const READER: &str = "def fire() { input.get() }";

fn reader(
    language: &ScriptedLanguage,
    reporter: Arc<CollectingReporter>,
) -> (ScriptActor, Arc<MemoryPort>) {
    let context = ActorContext::new("reader");
    let input = MemoryPort::input("input");
    context.add_port(input.clone());
    let registry = LanguageRegistry::from_languages([("groovy", language.support(Metaclass))]);
    let mut actor = ScriptActor::new(context, registry).with_reporter(reporter);
    actor.configure_language("groovy").unwrap();
    actor.configure_script(READER, "").unwrap();
    (actor, input)
}

fn reading_language() -> ScriptedLanguage {
    let language = ScriptedLanguage::new("groovy");
    language.script(
        READER,
        ScriptDef::new()
            .function("fire", |call| {
                let token = call.port("input")?.get()?;
                Ok(ScriptValue::Data(token))
            })
            .function("stop", |call| {
                call.port("input")?.get()?;
                Ok(ScriptValue::nil())
            }),
    );
    language
}

#[test]
fn preserved_signal_is_relayed() {
    let language = reading_language();
    let reporter = CollectingReporter::new();
    let (mut actor, input) = reader(&language, reporter.clone());

    input.push(Value::Integer(1));
    assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::Executed);

    input.terminate("workflow cancelled");
    match actor.on_fire() {
        Err(DispatchError::Terminated(signal)) => {
            assert_eq!(signal, ExecutionTerminated::new("workflow cancelled"));
        }
        other => panic!("expected termination, got {:?}", other),
    }
    assert!(reporter.reports().is_empty());
}

#[test]
fn flattened_signal_is_recognised_by_name() {
    let language = ScriptedLanguage::new("groovy");
    let text = "def fire() { throw new RuntimeException(lastError) }";
    language.script(
        text,
        ScriptDef::new().function("fire", |_| {
            Err(ScriptError::raised(
                "java.lang.RuntimeException: ExecutionTerminated: host shutdown",
            ))
        }),
    );
    let registry = LanguageRegistry::from_languages([("groovy", language.support(Metaclass))]);
    let mut actor = ScriptActor::new(ActorContext::new("wrapped"), registry);
    actor.configure_language("groovy").unwrap();
    actor.configure_script(text, "").unwrap();

    let error = actor.on_fire().unwrap_err();
    assert!(error.is_termination());
    assert!(matches!(
        error,
        DispatchError::Terminated(ref signal) if signal.reason == "host shutdown"
    ));
}

#[test]
fn signal_takes_priority_over_reported_error() {
    let language = ScriptedLanguage::new("groovy");
    let text = "def fire() { actor.reportError('x'); input.get() }";
    language.script(
        text,
        ScriptDef::new().function("fire", |call| {
            call.actor()?.report_error("x");
            call.port("input")?.get()?;
            Ok(ScriptValue::nil())
        }),
    );
    let context = ActorContext::new("both");
    let input = MemoryPort::input("input");
    input.terminate("stop now");
    context.add_port(input);
    let registry = LanguageRegistry::from_languages([("groovy", language.support(Metaclass))]);
    let mut actor = ScriptActor::new(context, registry);
    actor.configure_language("groovy").unwrap();
    actor.configure_script(text, "").unwrap();

    assert!(actor.on_fire().unwrap_err().is_termination());
}

#[test]
fn signal_in_stop_is_logged_not_reported() {
    let language = reading_language();
    let reporter = CollectingReporter::new();
    let (mut actor, input) = reader(&language, reporter.clone());

    input.terminate("shutdown");
    assert_eq!(actor.on_stop(), PhaseOutcome::Executed);
    assert!(reporter.reports().is_empty());
}

#[test]
fn director_terminates_actor_on_signal() {
    let language = reading_language();
    let reporter = CollectingReporter::new();
    let (mut actor, input) = reader(&language, reporter.clone());
    input.terminate("cancelled");

    let error = Director::new(5).run(&mut actor, &[]).unwrap_err();
    assert!(error.is_termination());
    assert!(!actor.has_session());
    assert!(reporter.reports().is_empty());
}
