//! Lifecycle methods and the per-binding "known absent" cache

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of lifecycle methods a script actor may define
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleMethod {
    /// Before types and schedules are resolved
    Preinitialize,
    /// Start of a run
    Initialize,
    /// Readiness check before each firing
    Prefire,
    /// One firing
    Fire,
    /// After each firing; decides whether to continue
    Postfire,
    /// Request to stop at the next opportunity
    Stop,
    /// Request to stop the current firing
    StopFire,
    /// Abrupt shutdown
    Terminate,
    /// End of a run
    Wrapup,
}

impl LifecycleMethod {
    /// Every method, in cache-slot order
    pub const ALL: [LifecycleMethod; 9] = [
        LifecycleMethod::Preinitialize,
        LifecycleMethod::Initialize,
        LifecycleMethod::Prefire,
        LifecycleMethod::Fire,
        LifecycleMethod::Postfire,
        LifecycleMethod::Stop,
        LifecycleMethod::StopFire,
        LifecycleMethod::Terminate,
        LifecycleMethod::Wrapup,
    ];

    /// Name scripts use to define the method
    pub fn name(self) -> &'static str {
        match self {
            LifecycleMethod::Preinitialize => "preinitialize",
            LifecycleMethod::Initialize => "initialize",
            LifecycleMethod::Prefire => "prefire",
            LifecycleMethod::Fire => "fire",
            LifecycleMethod::Postfire => "postfire",
            LifecycleMethod::Stop => "stop",
            LifecycleMethod::StopFire => "stopFire",
            LifecycleMethod::Terminate => "terminate",
            LifecycleMethod::Wrapup => "wrapup",
        }
    }

    /// Parse a script-facing method name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LifecycleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remembers which lifecycle methods the current script does not define.
///
/// A flag is only ever set after an invocation failed with method-not-found,
/// so an unknown method is always tried once per binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodPresence {
    absent: [bool; 9],
}

impl MethodPresence {
    /// Cache with every method presumed present
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the method is known to be absent
    pub fn is_absent(&self, method: LifecycleMethod) -> bool {
        self.absent[method.slot()]
    }

    /// Record that the method does not exist
    pub fn mark_absent(&mut self, method: LifecycleMethod) {
        self.absent[method.slot()] = true;
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.absent = [false; 9];
    }

    /// Methods currently flagged absent
    pub fn absent_methods(&self) -> Vec<LifecycleMethod> {
        LifecycleMethod::ALL
            .into_iter()
            .filter(|method| self.is_absent(*method))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_names_round_trip() {
        for method in LifecycleMethod::ALL {
            assert_eq!(LifecycleMethod::from_name(method.name()), Some(method));
        }
        assert_eq!(LifecycleMethod::StopFire.to_string(), "stopFire");
        assert_eq!(LifecycleMethod::from_name("stop_fire"), None);
    }

    #[test]
    fn test_serde_uses_script_names() {
        let json = serde_json::to_string(&LifecycleMethod::StopFire).unwrap();
        assert_eq!(json, "\"stopFire\"");
    }

    #[test]
    fn test_reset_clears_flags() {
        let mut presence = MethodPresence::new();
        presence.mark_absent(LifecycleMethod::Fire);
        presence.mark_absent(LifecycleMethod::Wrapup);
        assert_eq!(
            presence.absent_methods(),
            vec![LifecycleMethod::Fire, LifecycleMethod::Wrapup]
        );

        presence.reset();
        assert!(presence.absent_methods().is_empty());
    }

    proptest! {
        #[test]
        fn prop_only_marked_methods_are_absent(marks in proptest::collection::vec(0usize..9, 0..20)) {
            let mut presence = MethodPresence::new();
            for index in &marks {
                presence.mark_absent(LifecycleMethod::ALL[*index]);
            }
            for (index, method) in LifecycleMethod::ALL.into_iter().enumerate() {
                prop_assert_eq!(presence.is_absent(method), marks.contains(&index));
            }
        }
    }
}
