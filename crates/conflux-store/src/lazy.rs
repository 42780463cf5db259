//! Lazy per-key backend (§4.7), grounded in `tinysync`'s `JsonDBM`
//! (`examples/original_source/persistence.py`): only keys touched since the
//! last [`dump`](conflux_sync::LazyPersistence::dump) are rewritten. `JsonDBM`
//! backs onto `dbm`; this stands in with an in-memory map, the shape an
//! embedded KV store (sled, a DBM binding, ...) would be wrapped with.

use conflux_sync::{ChangeKind, LazyPersistence, PersistenceError};
use conflux_value::{Path, Value};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Per-key lazy persistence over an in-memory map, counting individual key
/// writes so callers can verify only touched keys are rewritten (§8 S6).
pub struct InMemoryLazyStore {
    entries: Mutex<HashMap<String, Value>>,
    changed: Mutex<BTreeSet<String>>,
    deleted: Mutex<BTreeSet<String>>,
    write_count: AtomicU64,
}

impl InMemoryLazyStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            changed: Mutex::new(BTreeSet::new()),
            deleted: Mutex::new(BTreeSet::new()),
            write_count: AtomicU64::new(0),
        }
    }

    /// Directly inspect a stored key, bypassing the lazy-load/change-advisory
    /// machinery. For tests and diagnostics.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }
}

impl Default for InMemoryLazyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyPersistence for InMemoryLazyStore {
    fn load(&self) -> Result<Vec<(String, Value)>, PersistenceError> {
        // `Value` has no dedicated lazy-load-marker variant, so the marker
        // collapses to `Value::Null` here; callers needing to tell a
        // genuine stored null from "not yet loaded" should call
        // `load_specific` for the keys they care about.
        Ok(self.entries.lock().keys().map(|k| (k.clone(), Value::Null)).collect())
    }

    fn load_specific(&self, key: &str) -> Result<Value, PersistenceError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| PersistenceError::Backend(format!("no stored value for key {key:?}")))
    }

    fn change_advisory(&self, path: &Path, kind: ChangeKind) {
        let Some(conflux_value::PathSegment::Key(key)) = path.first() else { return };
        match kind {
            ChangeKind::Upserted => {
                self.deleted.lock().remove(key);
                self.changed.lock().insert(key.clone());
            }
            ChangeKind::Removed => {
                self.changed.lock().remove(key);
                self.deleted.lock().insert(key.clone());
            }
        }
    }

    fn dump(&self, value: &Value) -> Result<(), PersistenceError> {
        let Value::Map(map) = value else {
            return Err(PersistenceError::Backend("lazy persistence requires a map document".into()));
        };
        let changed: Vec<String> = self.changed.lock().drain().collect();
        for key in changed {
            if let Some(v) = map.get(&key) {
                self.entries.lock().insert(key, v.clone());
                self.write_count.fetch_add(1, Ordering::SeqCst);
            }
        }
        let deleted: Vec<String> = self.deleted.lock().drain().collect();
        for key in deleted {
            self.entries.lock().remove(&key);
        }
        debug!(writes = self.write_count.load(Ordering::SeqCst), "lazy dump complete");
        Ok(())
    }

    fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_value::PathSegment;

    fn doc(pairs: &[(&str, i64)]) -> Value {
        let mut m = indexmap::IndexMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_owned(), Value::Int(*v));
        }
        Value::Map(m)
    }

    #[test]
    fn initial_dump_writes_every_key_present_in_advisories() {
        let store = InMemoryLazyStore::new();
        let value = doc(&[("a", 1), ("b", 2)]);
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Upserted);
        store.change_advisory(&[PathSegment::Key("b".into())], ChangeKind::Upserted);
        store.dump(&value).unwrap();

        assert_eq!(store.write_count(), 2);
        assert_eq!(store.peek("a"), Some(Value::Int(1)));
        assert_eq!(store.peek("b"), Some(Value::Int(2)));
    }

    #[test]
    fn only_advised_keys_rewrite_on_subsequent_dump() {
        let store = InMemoryLazyStore::new();
        let mut value = doc(&[("a", 1), ("b", 2)]);
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Upserted);
        store.change_advisory(&[PathSegment::Key("b".into())], ChangeKind::Upserted);
        store.dump(&value).unwrap();
        assert_eq!(store.write_count(), 2);

        if let Value::Map(m) = &mut value {
            m.insert("a".to_owned(), Value::Int(99));
        }
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Upserted);
        store.dump(&value).unwrap();

        assert_eq!(store.write_count(), 3, "only 'a' should have been rewritten");
        assert_eq!(store.peek("a"), Some(Value::Int(99)));
        assert_eq!(store.peek("b"), Some(Value::Int(2)));
    }

    #[test]
    fn advised_deletion_removes_the_key_on_next_dump() {
        let store = InMemoryLazyStore::new();
        let value = doc(&[("a", 1), ("b", 2)]);
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Upserted);
        store.change_advisory(&[PathSegment::Key("b".into())], ChangeKind::Upserted);
        store.dump(&value).unwrap();
        assert_eq!(store.write_count(), 2);

        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Removed);
        store.dump(&value).unwrap();

        assert_eq!(store.write_count(), 2, "a removal is not counted as a write");
        assert_eq!(store.peek("a"), None);
        assert_eq!(store.peek("b"), Some(Value::Int(2)));
    }

    #[test]
    fn upsert_after_delete_advisory_wins() {
        let store = InMemoryLazyStore::new();
        let value = doc(&[("a", 1)]);
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Removed);
        store.change_advisory(&[PathSegment::Key("a".into())], ChangeKind::Upserted);
        store.dump(&value).unwrap();

        assert_eq!(store.peek("a"), Some(Value::Int(1)));
    }
}
