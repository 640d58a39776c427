//! Language registry and interpreter factories
//!
//! Provides a global catalog for registering interpreter factories. Each
//! script actor receives an immutable snapshot of the catalog, so lookups never
//! contend with late registrations.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::interpreter::{LanguageAdapter, ScriptEngine, ScriptResult};

/// Factory that starts a fresh interpreter session
pub type EngineFactory = Arc<dyn Fn() -> ScriptResult<Box<dyn ScriptEngine>> + Send + Sync>;

/// Everything needed to run scripts in one language
#[derive(Clone)]
pub struct LanguageSupport {
    /// Session factory
    pub factory: EngineFactory,
    /// Instantiation and injection strategy
    pub adapter: Arc<dyn LanguageAdapter>,
}

impl LanguageSupport {
    /// Pair a factory closure with an adapter.
    pub fn new<F, A>(factory: F, adapter: A) -> Self
    where
        F: Fn() -> ScriptResult<Box<dyn ScriptEngine>> + Send + Sync + 'static,
        A: LanguageAdapter + 'static,
    {
        Self {
            factory: Arc::new(factory),
            adapter: Arc::new(adapter),
        }
    }

    /// Start a session.
    pub fn create_engine(&self) -> ScriptResult<Box<dyn ScriptEngine>> {
        (self.factory)()
    }
}

impl fmt::Debug for LanguageSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageSupport")
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// Catalog of language registrations. Append-only.
pub struct LanguageCatalog {
    languages: RwLock<HashMap<String, LanguageSupport>>,
}

static CATALOG: Lazy<LanguageCatalog> = Lazy::new(LanguageCatalog::with_builtins);

impl LanguageCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self {
            languages: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog holding the languages compiled into this build.
    pub fn with_builtins() -> Self {
        let catalog = Self::new();

        #[cfg(feature = "rhai")]
        catalog.register(
            crate::interpreter::rhai_engine::LANGUAGE,
            crate::interpreter::rhai_engine::support(),
        );
        #[cfg(feature = "rhai")]
        catalog.register(
            crate::interpreter::rhai_engine::SELF_REFERENCE_LANGUAGE,
            crate::interpreter::rhai_engine::self_reference_support(),
        );

        #[cfg(feature = "lua")]
        catalog.register(
            crate::interpreter::lua_engine::LANGUAGE,
            crate::interpreter::lua_engine::support(),
        );

        catalog
    }

    /// Access the global catalog singleton.
    pub fn global() -> &'static Self {
        &CATALOG
    }

    /// Register a language.
    ///
    /// Returns `false`, leaving the existing entry in place, if the identifier
    /// is already taken.
    pub fn register(&self, language: &str, support: LanguageSupport) -> bool {
        let mut languages = self.languages.write();
        if languages.contains_key(language) {
            tracing::warn!(language, "language already registered, keeping existing entry");
            return false;
        }
        tracing::debug!(language, adapter = support.adapter.name(), "registered language");
        languages.insert(language.to_string(), support);
        true
    }

    /// Produce an immutable snapshot for script actors.
    pub fn snapshot(&self) -> LanguageRegistry {
        let languages = self.languages.read();
        LanguageRegistry {
            languages: Arc::new(languages.clone()),
        }
    }
}

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of the language catalog.
#[derive(Clone, Default)]
pub struct LanguageRegistry {
    languages: Arc<HashMap<String, LanguageSupport>>,
}

impl LanguageRegistry {
    /// Snapshot of the global catalog.
    pub fn builtin() -> Self {
        LanguageCatalog::global().snapshot()
    }

    /// Registry holding exactly the given languages.
    pub fn from_languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = (S, LanguageSupport)>,
        S: Into<String>,
    {
        Self {
            languages: Arc::new(
                languages
                    .into_iter()
                    .map(|(id, support)| (id.into(), support))
                    .collect(),
            ),
        }
    }

    /// Look up a language.
    pub fn get(&self, language: &str) -> Option<&LanguageSupport> {
        self.languages.get(language)
    }

    /// Check whether the snapshot contains the language.
    pub fn has_language(&self, language: &str) -> bool {
        self.languages.contains_key(language)
    }

    /// Registered identifiers, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.languages.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::adapter::Metaclass;
    use crate::testing::ScriptedLanguage;

    #[test]
    fn test_register_is_append_only() {
        let catalog = LanguageCatalog::new();
        let first = ScriptedLanguage::new("groovy");
        let second = ScriptedLanguage::new("groovy");

        assert!(catalog.register("groovy", first.support(Metaclass)));
        assert!(!catalog.register("groovy", second.support(Metaclass)));

        let registry = catalog.snapshot();
        let engine = registry.get("groovy").unwrap().create_engine().unwrap();
        assert_eq!(engine.language(), "groovy");
        assert_eq!(first.stats().sessions_created(), 1);
        assert_eq!(second.stats().sessions_created(), 0);
    }

    #[test]
    fn test_snapshot_ignores_later_registrations() {
        let catalog = LanguageCatalog::new();
        let snapshot = catalog.snapshot();
        catalog.register("groovy", ScriptedLanguage::new("groovy").support(Metaclass));

        assert!(!snapshot.has_language("groovy"));
        assert!(catalog.snapshot().has_language("groovy"));
    }

    #[cfg(feature = "rhai")]
    #[test]
    fn test_builtin_includes_rhai() {
        let languages = LanguageRegistry::builtin().languages();
        assert!(languages.contains(&"rhai".to_string()));
        assert!(languages.contains(&"rhai-self".to_string()));
    }
}
