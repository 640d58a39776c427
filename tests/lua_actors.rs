//! End-to-end actors on the embedded Lua engine

#![cfg(feature = "lua")]

use std::sync::Arc;

use script_actor::interpreter::Value;
use script_actor::runtime::{
    ActorContext, DispatchError, LanguageRegistry, LifecycleMethod, MemoryPort, PhaseOutcome,
    ScriptActor,
};

const DOUBLER: &str = r#"
Doubler = {}
Doubler.__index = Doubler

function Doubler.new()
    return setmetatable({ fired = 0 }, Doubler)
end

function Doubler:fire()
    self.fired = self.fired + 1
    self.output:broadcast(self.input:get() * self.factor:value())
end

function Doubler:postfire()
    return self.fired < 2
end
"#;

fn rig(script: &str, class_name: &str) -> (ScriptActor, Arc<MemoryPort>, Arc<MemoryPort>) {
    let context = ActorContext::new("lua-actor");
    let input = MemoryPort::input("input");
    let output = MemoryPort::output("output");
    context.add_port(input.clone());
    context.add_port(output.clone());
    context.set_parameter("factor", Value::Integer(2));

    let mut actor = ScriptActor::new(context, LanguageRegistry::builtin());
    actor.configure_language("lua").unwrap();
    actor.configure_script(script, class_name).unwrap();
    (actor, input, output)
}

#[test]
fn table_class_receives_bindings() {
    let (mut actor, input, output) = rig(DOUBLER, "Doubler");

    input.push(Value::Integer(5));
    input.push(Value::Integer(6));
    actor.on_fire().unwrap();
    assert_eq!(actor.on_postfire().unwrap(), PhaseOutcome::Continue);
    actor.on_fire().unwrap();
    assert_eq!(actor.on_postfire().unwrap(), PhaseOutcome::Stop);

    assert_eq!(
        output.broadcasts(),
        vec![Value::Integer(10), Value::Integer(12)]
    );
}

#[test]
fn global_functions_see_global_bindings() {
    let script = r#"
        function fire()
            output:broadcast(engine:language() .. ":" .. actor:name())
        end
    "#;
    let (mut actor, _input, output) = rig(script, "");

    assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::Executed);
    assert_eq!(output.broadcasts(), vec![Value::from("lua:lua-actor")]);
    assert_eq!(actor.on_initialize().unwrap(), PhaseOutcome::NotPresent);
}

#[test]
fn lua_error_names_the_method() {
    let (mut actor, _input, _output) = rig("function prefire() error('boom') end", "");

    let error = actor.on_prefire().unwrap_err();
    assert_eq!(error.method(), Some(LifecycleMethod::Prefire));
    assert!(error.to_string().contains("boom"));
}

#[test]
fn terminated_port_surfaces_signal() {
    let (mut actor, input, _output) = rig("function fire() return input:get() end", "");
    input.terminate("cancelled");

    assert!(matches!(
        actor.on_fire().unwrap_err(),
        DispatchError::Terminated(signal) if signal.reason == "cancelled"
    ));
}

#[test]
fn replaced_script_drops_old_functions() {
    let (mut actor, _input, _output) = rig("function fire() return 1 end", "");
    assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::Executed);

    actor
        .configure_script("function prefire() return true end", "")
        .unwrap();
    assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(actor.on_prefire().unwrap(), PhaseOutcome::Continue);
}

#[test]
fn replaced_class_drops_old_table() {
    let (mut actor, input, output) = rig(DOUBLER, "Doubler");
    input.push(Value::Integer(4));
    actor.on_fire().unwrap();

    let tripler = r#"
Tripler = {}
Tripler.__index = Tripler
function Tripler.new() return setmetatable({}, Tripler) end
function Tripler:prefire() return Doubler == nil end
"#;
    actor.configure_script(tripler, "Tripler").unwrap();
    assert_eq!(actor.on_prefire().unwrap(), PhaseOutcome::Continue);
    assert_eq!(actor.on_fire().unwrap(), PhaseOutcome::NotPresent);
    assert_eq!(output.broadcasts(), vec![Value::Integer(8)]);
}
