//! Config files through assembly and a director run

use std::collections::BTreeMap;

use script_actor::interpreter::{ScriptValue, Value};
use script_actor::runtime::storage::{load_config, load_script, write_config};
use script_actor::runtime::{
    ActorConfig, ConfigError, DispatchError, Director, LanguageRegistry, ScriptLocation,
};
use script_actor::testing::{ScriptDef, ScriptedLanguage};
use tempfile::TempDir;

fn integer(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        _ => 0,
    }
}

fn scale_config(language: &str, script: ScriptLocation) -> ActorConfig {
    let mut config = ActorConfig::new("scale", language, script);
    config.inputs = vec!["input".into()];
    config.outputs = vec!["output".into()];
    config.parameters = BTreeMap::from([("factor".to_string(), Value::Integer(2))]);
    config.iterations = 3;
    config
}

#[test]
fn config_round_trips_through_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("actors").join("scale.json");
    let config = scale_config("rhai", ScriptLocation::Path("scale.rhai".into()));

    write_config(&path, &config).unwrap();
    assert_eq!(load_config(&path).unwrap(), config);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn iterations_default_to_one() {
    let json = r#"{"name": "a", "language": "rhai", "script": {"inline": "fn fire() {}"}}"#;
    let config: ActorConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.iterations, 1);
    assert!(config.class_name.is_empty());
}

#[test]
fn unknown_language_fails_assembly() {
    let config = scale_config("cobol", ScriptLocation::Inline(String::new()));
    let error = config
        .assemble("", LanguageRegistry::from_languages(Vec::<(String, _)>::new()))
        .unwrap_err();
    assert!(matches!(
        error,
        DispatchError::Configuration {
            source: ConfigError::UnknownLanguage(ref language),
            ..
        } if language == "cobol"
    ));
}

#[test]
fn scripted_language_runs_from_config() {
    let language = ScriptedLanguage::new("groovy");
    let text = "def fire() { output.broadcast(input.get() * factor.value) }";
    language.script(
        text,
        ScriptDef::new().function("fire", |call| {
            let value = call.port("input")?.get()?;
            let factor = call.parameter("factor")?.value();
            let product = integer(&value) * integer(&factor);
            call.port("output")?.broadcast(Value::Integer(product))?;
            Ok(ScriptValue::nil())
        }),
    );
    let config = scale_config("groovy", ScriptLocation::Inline(text.into()));
    let registry = LanguageRegistry::from_languages([(
        "groovy",
        language.support(script_actor::interpreter::adapter::Metaclass),
    )]);

    let mut assembly = config.assemble(text, registry).unwrap();
    assembly.inputs["input"].push(Value::Integer(7));

    let report = Director::new(1)
        .run(&mut assembly.actor, &assembly.outputs)
        .unwrap();
    assert_eq!(report.outputs["output"], vec![Value::Integer(14)]);
}

#[cfg(feature = "rhai")]
#[test]
fn rhai_script_file_runs_from_config() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("scale.rhai"),
        "fn fire() { this.output.broadcast(this.input.get() * this.factor.value()); }",
    )
    .unwrap();
    let path = temp.path().join("scale.json");
    write_config(
        &path,
        &scale_config("rhai", ScriptLocation::Path("scale.rhai".into())),
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    let script = load_script(&config, &path).unwrap();
    let mut assembly = config.assemble(&script, LanguageRegistry::builtin()).unwrap();
    for value in [1, 2, 3] {
        assembly.inputs["input"].push(Value::Integer(value));
    }

    let report = Director::new(config.iterations)
        .run(&mut assembly.actor, &assembly.outputs)
        .unwrap();
    assert_eq!(report.iterations, 3);
    assert!(!report.stopped_by_actor);
    assert_eq!(
        report.outputs["output"],
        vec![Value::Integer(2), Value::Integer(4), Value::Integer(6)]
    );
}
