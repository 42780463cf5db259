//! Configuration surface (§6), loaded the way
//! `echo-app-core::config::ConfigService` loads typed config through a
//! `ConfigStore` port.

use crate::persistence::PersistenceBackend;
use crate::tracker::HistoryConfig;
use conflux_conduit::Conduit;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence backend selection (§6 `persist`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// No persistence.
    #[default]
    None,
    /// The backend's own default (whole-document file, named after `name`).
    Default,
    /// An explicitly named backend, resolved by the caller wiring up
    /// `conflux-store`.
    Explicit(String),
}

/// Conduit selection (§6 `sync`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// No peer synchronisation.
    #[default]
    None,
    /// An explicitly named conduit, resolved by the caller.
    Explicit(String),
}

/// Typed configuration for a synchronized document (§6). Recognised
/// options: `name`, `persist`, `sync`, `history`, `conflict_callback`
/// (wired up by the embedding application, not parsed here since it's a
/// callback, not data). `dot_access` is parsed for file-format
/// compatibility with documents written by other implementations and then
/// ignored — Rust has no dynamic attribute dispatch, and §9 already directs
/// an explicit mutation API over transparent interception, which removes
/// the need for it.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Persistence filename/doc-id base and sync doc-id.
    pub name: String,
    /// Persistence backend selection.
    #[serde(default)]
    pub persist: PersistMode,
    /// Conduit selection.
    #[serde(default)]
    pub sync: SyncMode,
    /// Bounded undo/redo history depth.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Parsed for compatibility; always ignored. See struct docs.
    #[serde(default)]
    pub dot_access: bool,
}

impl SyncConfig {
    /// Warn once if `dot_access` was set to anything other than its default
    /// (§6 [ADDED]).
    pub fn warn_on_unsupported_options(&self) {
        if self.dot_access {
            tracing::warn!(
                name = %self.name,
                "dot_access is set but not supported by this implementation; ignoring"
            );
        }
    }

    /// Resolve [`persist`](Self::persist) against the backends the caller
    /// registered by name (§6 `persist`): `None` never persists,
    /// `Default` looks up [`name`](Self::name) itself, `Explicit` looks up
    /// the named backend. Returns `None` if the selected name was never
    /// registered.
    #[must_use]
    pub fn resolve_persistence(
        &self,
        backends: &HashMap<String, PersistenceBackend>,
    ) -> Option<PersistenceBackend> {
        let key = match &self.persist {
            PersistMode::None => return None,
            PersistMode::Default => self.name.as_str(),
            PersistMode::Explicit(name) => name.as_str(),
        };
        let backend = backends.get(key).cloned();
        if backend.is_none() {
            tracing::warn!(name = %self.name, backend = key, "persist backend not registered; running without persistence");
        }
        backend
    }

    /// Resolve [`sync`](Self::sync) against the conduits the caller
    /// registered by name (§6 `sync`).
    #[must_use]
    pub fn resolve_conduit(&self, conduits: &HashMap<String, Arc<dyn Conduit>>) -> Option<Arc<dyn Conduit>> {
        let SyncMode::Explicit(name) = &self.sync else {
            return None;
        };
        let conduit = conduits.get(name.as_str()).cloned();
        if conduit.is_none() {
            tracing::warn!(name = %self.name, conduit = name, "sync conduit not registered; running without peer sync");
        }
        conduit
    }
}

impl<'de> Deserialize<'de> for HistoryConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case")]
        enum Raw {
            Off,
            Unbounded,
            Capacity(usize),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Off => HistoryConfig::Off,
            Raw::Unbounded => HistoryConfig::Unbounded,
            Raw::Capacity(n) => HistoryConfig::Capacity(n),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{PersistenceError, WholeDocumentPersistence};
    use conflux_conduit::InMemoryConduit;
    use conflux_value::Value;

    #[test]
    fn deserializes_minimal_config() {
        let yaml = "name: doc1\n";
        let cfg: SyncConfig = serde_yaml::from_str(yaml).expect("minimal config parses");
        assert_eq!(cfg.name, "doc1");
        assert!(matches!(cfg.persist, PersistMode::None));
        assert!(matches!(cfg.history, HistoryConfig::Off));
    }

    #[test]
    fn deserializes_history_capacity() {
        let yaml = "name: doc1\nhistory:\n  capacity: 16\n";
        let cfg: SyncConfig = serde_yaml::from_str(yaml).expect("config with history parses");
        assert_eq!(cfg.history, HistoryConfig::Capacity(16));
    }

    struct NullPersistence;
    impl WholeDocumentPersistence for NullPersistence {
        fn load(&self) -> Result<Option<Value>, PersistenceError> {
            Ok(None)
        }
        fn dump(&self, _value: &Value) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    #[test]
    fn persist_none_never_resolves() {
        let cfg: SyncConfig = serde_yaml::from_str("name: doc1\n").unwrap();
        let mut backends = HashMap::new();
        backends.insert("doc1".to_owned(), PersistenceBackend::Whole(Arc::new(NullPersistence)));
        assert!(cfg.resolve_persistence(&backends).is_none());
    }

    #[test]
    fn persist_default_resolves_against_own_name() {
        let cfg: SyncConfig = serde_yaml::from_str("name: doc1\npersist: default\n").unwrap();
        let mut backends = HashMap::new();
        backends.insert("doc1".to_owned(), PersistenceBackend::Whole(Arc::new(NullPersistence)));
        assert!(cfg.resolve_persistence(&backends).is_some());
    }

    #[test]
    fn persist_explicit_resolves_against_named_backend() {
        let cfg: SyncConfig = serde_yaml::from_str("name: doc1\npersist:\n  explicit: shared\n").unwrap();
        let mut backends = HashMap::new();
        backends.insert("shared".to_owned(), PersistenceBackend::Whole(Arc::new(NullPersistence)));
        assert!(cfg.resolve_persistence(&backends).is_some());

        let empty = HashMap::new();
        assert!(cfg.resolve_persistence(&empty).is_none(), "unregistered name resolves to nothing");
    }

    #[test]
    fn sync_explicit_resolves_against_named_conduit() {
        let cfg: SyncConfig = serde_yaml::from_str("name: doc1\nsync:\n  explicit: mesh\n").unwrap();
        let conduit: Arc<dyn Conduit> = Arc::new(InMemoryConduit::new("n1", "doc1"));
        let mut conduits = HashMap::new();
        conduits.insert("mesh".to_owned(), conduit);
        assert!(cfg.resolve_conduit(&conduits).is_some());

        let cfg_none: SyncConfig = serde_yaml::from_str("name: doc1\n").unwrap();
        assert!(cfg_none.resolve_conduit(&conduits).is_none());
    }
}
