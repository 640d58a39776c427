//! End-to-end actors on the embedded Rhai engine

#![cfg(feature = "rhai")]

use std::sync::Arc;

use script_actor::interpreter::Value;
use script_actor::runtime::{
    ActorContext, DispatchError, DispatchState, Director, LanguageRegistry, LifecycleMethod,
    MemoryPort, PhaseOutcome, ScriptActor,
};

struct Rig {
    actor: ScriptActor,
    input: Arc<MemoryPort>,
    output: Arc<MemoryPort>,
}

fn rig(script: &str, class_name: &str) -> Rig {
    rig_in("rhai", script, class_name)
}

fn rig_in(language: &str, script: &str, class_name: &str) -> Rig {
    let context = ActorContext::new("rhai-actor");
    let input = MemoryPort::input("input");
    let output = MemoryPort::output("output");
    context.add_port(input.clone());
    context.add_port(output.clone());
    context.set_parameter("factor", Value::Integer(2));

    let mut actor = ScriptActor::new(context, LanguageRegistry::builtin());
    actor.configure_language(language).unwrap();
    actor.configure_script(script, class_name).unwrap();
    Rig {
        actor,
        input,
        output,
    }
}

#[test]
fn free_functions_double_input() {
    let script = r#"
        fn fire() {
            let x = this.input.get();
            this.output.broadcast(x * this.factor.value());
        }
    "#;
    let mut rig = rig(script, "");

    rig.input.push(Value::Integer(5));
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);
    assert_eq!(rig.output.broadcasts(), vec![Value::Integer(10)]);
}

#[test]
fn class_object_keeps_state_between_fires() {
    let script = r#"
        fn Accumulator() { #{ total: 0 } }
        fn fire() {
            this.total += this.input.get();
            this.output.broadcast(this.total);
        }
        fn postfire() { this.total < 10 }
    "#;
    let mut rig = rig(script, "Accumulator");

    for value in [3, 4, 5] {
        rig.input.push(Value::Integer(value));
    }
    rig.actor.on_fire().unwrap();
    assert_eq!(rig.actor.on_postfire().unwrap(), PhaseOutcome::Continue);
    rig.actor.on_fire().unwrap();
    rig.actor.on_fire().unwrap();
    assert_eq!(rig.actor.on_postfire().unwrap(), PhaseOutcome::Stop);

    assert_eq!(
        rig.output.broadcasts(),
        vec![Value::Integer(3), Value::Integer(7), Value::Integer(12)]
    );
}

#[test]
fn switching_class_rebinds_to_new_object() {
    let script = r#"
        fn Actor() { #{ kind: "actor" } }
        fn Main() { #{ kind: "main" } }
        fn fire() { this.output.broadcast(this.kind); }
    "#;
    let mut rig = rig(script, "Actor");
    rig.actor.on_fire().unwrap();

    rig.actor.configure_script(script, "Main").unwrap();
    rig.actor.on_fire().unwrap();

    assert_eq!(
        rig.output.broadcasts(),
        vec![Value::from("actor"), Value::from("main")]
    );
}

#[test]
fn reported_error_becomes_dispatch_failure() {
    let script = r#"
        fn fire() {
            if !this.input.has_token() {
                this.actor.report_error("bad input");
                return false;
            }
            true
        }
    "#;
    let mut rig = rig(script, "");

    match rig.actor.on_fire() {
        Err(DispatchError::ScriptReported { method, message }) => {
            assert_eq!(method, LifecycleMethod::Fire);
            assert_eq!(message, "bad input");
        }
        other => panic!("expected reported error, got {:?}", other),
    }

    rig.input.push(Value::Integer(1));
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Continue);
}

#[test]
fn thrown_error_names_the_method() {
    let mut rig = rig(r#"fn initialize() { throw "boom"; }"#, "");

    let error = rig.actor.on_initialize().unwrap_err();
    assert_eq!(error.method(), Some(LifecycleMethod::Initialize));
    assert!(error.to_string().contains("boom"));
    assert!(!error.is_termination());
}

#[test]
fn engine_binding_reports_language() {
    let script = r#"fn fire() { this.output.broadcast(this.engine.language()); }"#;
    let mut rig = rig(script, "");

    rig.actor.on_fire().unwrap();
    assert_eq!(rig.output.broadcasts(), vec![Value::from("rhai")]);
}

#[test]
fn terminated_port_surfaces_signal() {
    let mut rig = rig("fn fire() { this.input.get() }", "");
    rig.input.terminate("cancelled");

    let error = rig.actor.on_fire().unwrap_err();
    assert!(matches!(
        error,
        DispatchError::Terminated(ref signal) if signal.reason == "cancelled"
    ));
}

#[test]
fn absent_methods_are_cached() {
    let mut rig = rig("fn fire() {}", "");

    assert_eq!(rig.actor.on_prefire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(rig.actor.on_prefire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(rig.actor.absent_methods(), vec![LifecycleMethod::Prefire]);
}

#[test]
fn director_fires_while_input_is_ready() {
    let script = r#"
        fn prefire() { this.input.has_token() }
        fn fire() { this.output.broadcast(this.input.get() * 2); }
    "#;
    let mut rig = rig(script, "");
    rig.input.push(Value::Integer(1));
    rig.input.push(Value::Integer(2));

    let report = Director::new(5)
        .run(&mut rig.actor, &[rig.output.clone()])
        .unwrap();
    assert_eq!(report.iterations, 2);
    assert!(report.not_ready);
    assert_eq!(
        report.outputs["output"],
        vec![Value::Integer(2), Value::Integer(4)]
    );
    assert!(!rig.actor.has_session());
}

#[test]
fn broken_reconfiguration_stops_old_script() {
    let mut rig = rig("fn fire() { 1 }", "");
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);

    assert!(rig.actor.configure_script("fn fire( {", "").is_err());
    assert_eq!(rig.actor.state(), DispatchState::Configured);
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
}

#[test]
fn new_script_replaces_old_functions() {
    let mut rig = rig("fn fire() { 1 }", "");
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);

    rig.actor.configure_script("fn prefire() { true }", "").unwrap();
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(rig.actor.on_prefire().unwrap(), PhaseOutcome::Continue);
}

#[test]
fn new_class_script_replaces_old_methods() {
    let mut rig = rig("fn Actor() { #{} } fn fire() { 7 }", "Actor");
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);

    rig.actor
        .configure_script("fn Main() { #{} } fn prefire() { true }", "Main")
        .unwrap();
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(rig.actor.on_prefire().unwrap(), PhaseOutcome::Continue);
}

#[test]
fn functions_defined_through_engine_binding_stay_callable() {
    let script = r#"
        fn initialize() { this.engine.evaluate("fn helper(x) { x + 1 }"); }
        fn fire() { this.output.broadcast(helper(41)); }
    "#;
    let mut rig = rig(script, "");

    assert_eq!(rig.actor.on_initialize().unwrap(), PhaseOutcome::Executed);
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);
    assert_eq!(rig.output.broadcasts(), vec![Value::Integer(42)]);
}

#[test]
fn repeated_reconfiguration_keeps_working() {
    let script = r#"
        fn Actor() { #{ kind: 1 } }
        fn Main() { #{ kind: 2 } }
        fn fire() { this.output.broadcast(this.kind); }
    "#;
    let mut rig = rig(script, "Actor");

    for round in 0..20 {
        let class = if round % 2 == 0 { "Main" } else { "Actor" };
        rig.actor.configure_script(script, class).unwrap();
        rig.actor.on_fire().unwrap();
    }

    let broadcasts = rig.output.broadcasts();
    assert_eq!(broadcasts.len(), 20);
    assert_eq!(broadcasts[0], Value::Integer(2));
    assert_eq!(broadcasts[19], Value::Integer(1));
}

#[test]
fn self_reference_reaches_ports_through_actor() {
    let script = r#"
        fn Doubler() { #{} }
        fn fire() {
            let x = this.actor.port("input").get();
            this.actor.port("output").broadcast(x * 2);
        }
    "#;
    let mut rig = rig_in("rhai-self", script, "Doubler");
    assert_eq!(rig.actor.bound_names(), ["self".to_string()]);

    rig.input.push(Value::Integer(5));
    assert_eq!(rig.actor.on_fire().unwrap(), PhaseOutcome::Executed);
    assert_eq!(rig.output.broadcasts(), vec![Value::Integer(10)]);
}

#[test]
fn self_reference_falls_back_to_main() {
    let script = r#"
        fn Main() { #{ scale: 3 } }
        fn fire() {
            let factor = this.actor.param("factor").value();
            this.actor.port("output").broadcast(this.scale * factor);
        }
    "#;
    let mut rig = rig_in("rhai-self", script, "Missing");

    rig.actor.on_fire().unwrap();
    assert_eq!(rig.output.broadcasts(), vec![Value::Integer(6)]);
}
