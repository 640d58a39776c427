//! The configured script: language, text, and declared class

use serde::{Deserialize, Serialize};

/// Everything that determines what a dispatcher evaluates.
///
/// Compared by value; any change re-derives the session bindings and the
/// presence cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    /// Language identifier, resolved through the registry
    pub language: Option<String>,
    /// Script text
    pub text: String,
    /// Declared actor class; empty means free functions
    #[serde(default)]
    pub class_name: String,
}

impl ScriptSource {
    /// Source with text and class but no language yet
    pub fn new(text: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            language: None,
            text: text.into(),
            class_name: class_name.into(),
        }
    }

    /// Whether any script has been recorded
    pub fn has_script(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Lifecycle methods are top-level functions rather than members
    pub fn uses_free_functions(&self) -> bool {
        self.class_name.trim().is_empty()
    }

    /// Short content hash for log correlation
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.language.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0]);
        hasher.update(self.class_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.text.as_bytes());
        let hex = hasher.finalize().to_hex();
        hex[..12].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_every_field() {
        let base = ScriptSource {
            language: Some("rhai".into()),
            text: "fn fire() {}".into(),
            class_name: String::new(),
        };
        let mut other_class = base.clone();
        other_class.class_name = "Actor".into();
        let mut other_language = base.clone();
        other_language.language = Some("lua".into());

        assert_eq!(base.fingerprint(), base.clone().fingerprint());
        assert_eq!(base.fingerprint().len(), 12);
        assert_ne!(base.fingerprint(), other_class.fingerprint());
        assert_ne!(base.fingerprint(), other_language.fingerprint());
    }

    #[test]
    fn test_blank_class_means_free_functions() {
        assert!(ScriptSource::new("x", "  ").uses_free_functions());
        assert!(!ScriptSource::new("x", "Main").uses_free_functions());
        assert!(!ScriptSource::new("\n", "").has_script());
    }
}
