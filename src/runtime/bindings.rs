//! The named host values a script actor exposes to its script

use std::collections::HashSet;

use crate::interpreter::{EngineRef, HostValue};

use super::host::ActorContext;

/// Name under which the dispatcher surface is bound by default
pub const CONTROL_BINDING: &str = "actor";

/// Name under which the interpreter session is bound
pub const ENGINE_BINDING: &str = "engine";

/// Parameters that configure the actor itself and are never bound
pub const CONTROL_ATTRIBUTES: [&str; 2] = ["language", "actor-class-name"];

/// One named host value
#[derive(Debug, Clone)]
pub struct Binding {
    /// Name visible to the script
    pub name: String,
    /// Value behind it
    pub value: HostValue,
}

/// Ordered bindings for one bind pass: ports, parameters, the control
/// entry, then the engine.
#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    entries: Vec<Binding>,
}

impl BindingSet {
    /// Collect the bindings for `context`.
    ///
    /// Parameters are skipped when private (leading `_`), named `class`, a
    /// control attribute, or not a valid identifier.
    pub fn collect(context: &ActorContext, control_name: &str, engine: EngineRef) -> Self {
        let mut entries = Vec::new();

        for port in context.ports() {
            entries.push(Binding {
                name: port.name().to_string(),
                value: HostValue::Port(port),
            });
        }

        for parameter in context.parameters() {
            let name = parameter.name();
            if !is_bindable_parameter(name) {
                tracing::trace!(parameter = name, "parameter not bound");
                continue;
            }
            entries.push(Binding {
                name: name.to_string(),
                value: HostValue::Parameter(parameter),
            });
        }

        entries.push(Binding {
            name: control_name.to_string(),
            value: HostValue::Actor(context.clone()),
        });
        entries.push(Binding {
            name: ENGINE_BINDING.to_string(),
            value: HostValue::Engine(engine),
        });

        Self { entries }
    }

    /// Bindings in injection order
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter()
    }

    /// Binding names in injection order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|b| b.name.as_str()).collect()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_bindable_parameter(name: &str) -> bool {
    !name.starts_with('_')
        && name != "class"
        && !CONTROL_ATTRIBUTES.contains(&name)
        && is_identifier(name)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Names injected so far in one bind pass.
///
/// A second injection of the same name is skipped with a warning instead of
/// reaching the interpreter.
#[derive(Debug, Default)]
pub struct BindPass {
    seen: HashSet<String>,
}

impl BindPass {
    /// Empty pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`; `false` if it was already injected in this pass
    pub fn claim(&mut self, name: &str) -> bool {
        if self.seen.insert(name.to_string()) {
            true
        } else {
            tracing::warn!(binding = name, "duplicate binding ignored");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Value;
    use crate::runtime::host::MemoryPort;

    #[test]
    fn test_collect_orders_and_filters() {
        let context = ActorContext::new("scale");
        context.add_port(MemoryPort::input("input"));
        context.add_port(MemoryPort::output("output"));
        context.set_parameter("factor", Value::Integer(2));
        context.set_parameter("_hidden", Value::Nil);
        context.set_parameter("class", Value::from("Actor"));
        context.set_parameter("language", Value::from("rhai"));
        context.set_parameter("actor-class-name", Value::from("Actor"));
        context.set_parameter("two words", Value::Nil);

        let set = BindingSet::collect(
            &context,
            CONTROL_BINDING,
            EngineRef {
                language: "rhai".into(),
            },
        );
        assert_eq!(
            set.names(),
            vec!["input", "output", "factor", "actor", "engine"]
        );
    }

    #[test]
    fn test_bind_pass_rejects_second_claim() {
        let mut pass = BindPass::new();
        assert!(pass.claim("input"));
        assert!(pass.claim("engine"));
        assert!(!pass.claim("input"));
        assert!(!pass.claim("engine"));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("x1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
