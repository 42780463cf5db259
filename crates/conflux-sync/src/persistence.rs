//! `Persistence` contract (§4.7): whole-document and lazy per-key shapes.
//! Concrete backends live in `conflux-store`; this crate only defines the
//! traits the sync engine and `Tracker` depend on, plus the
//! [`PersistenceBackend`] the engine forwards committed changes through.

use crate::tracker::ChangeEvent;
use conflux_value::{Delta, EditOp, Path, PathSegment, Target, Value};
use std::sync::Arc;
use thiserror::Error;

/// Failure surfaced by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the underlying storage medium failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored blob did not parse, or a value failed to serialize.
    #[error("serde error: {0}")]
    Serde(String),
    /// Catch-all for backend-specific failures not covered above.
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Whole-document persistence: load the entire value, or dump it back
/// (§4.7).
pub trait WholeDocumentPersistence: Send + Sync {
    /// Load the persisted value, or `None` if nothing has been saved yet.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    fn load(&self) -> Result<Option<Value>, PersistenceError>;

    /// Persist `value` in full.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    fn dump(&self, value: &Value) -> Result<(), PersistenceError>;
}

/// Sentinel standing in for a not-yet-loaded persisted subtree
/// (`lazy-load marker`, GLOSSARY). [`Tracker`](crate::Tracker)
/// implementations swap this in place for the real value on first read,
/// without firing a change notification (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyLoadMarker;

/// Whether a [`change_advisory`]'d top-level key was written or removed,
/// mirroring `JsonDBM`'s `changed_keys`/`deleted_keys` split
/// (`examples/original_source/persistence.py`).
///
/// [`change_advisory`]: LazyPersistence::change_advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The key was added, or its value replaced.
    Upserted,
    /// The key was removed entirely.
    Removed,
}

/// Lazy per-key persistence, for an embedded KV store or a remote document
/// store (§4.7). Only keys registered via [`change_advisory`] since the
/// last [`dump`] are rewritten.
///
/// [`change_advisory`]: LazyPersistence::change_advisory
/// [`dump`]: LazyPersistence::dump
pub trait LazyPersistence: Send + Sync {
    /// Load every top-level key, with not-yet-materialised values replaced
    /// by [`LazyLoadMarker`].
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    fn load(&self) -> Result<Vec<(String, Value)>, PersistenceError>;

    /// Load one top-level key's value in full.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    fn load_specific(&self, key: &str) -> Result<Value, PersistenceError>;

    /// Record that `path`'s top-level key changed, so the next [`dump`]
    /// rewrites (or removes) it per `kind`.
    ///
    /// [`dump`]: LazyPersistence::dump
    fn change_advisory(&self, path: &Path, kind: ChangeKind);

    /// Write every key recorded by [`change_advisory`] since the last
    /// `dump`, reading current values from `value`.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    fn dump(&self, value: &Value) -> Result<(), PersistenceError>;

    /// Number of individual key writes performed so far, for S6-style
    /// observability of lazy-write behaviour.
    fn write_count(&self) -> u64;
}

/// Unifies the two persistence shapes so a [`crate::SyncEngine`] can hold
/// either behind one field and forward every committed change to it
/// (§4.7; `dump` "writes only keys registered via `change_advisory`, which
/// the `SyncEngine` forwards to the persistence layer on each `on_change`").
#[derive(Clone)]
pub enum PersistenceBackend {
    /// Re-dump the whole document on every change.
    Whole(Arc<dyn WholeDocumentPersistence>),
    /// Advise only the top-level keys a change actually touched, then dump.
    Lazy(Arc<dyn LazyPersistence>),
}

impl PersistenceBackend {
    /// Forward one committed [`ChangeEvent`] to the backend.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] on a storage-level failure.
    pub(crate) fn on_change(&self, event: &ChangeEvent) -> Result<(), PersistenceError> {
        match self {
            Self::Whole(backend) => backend.dump(&event.root),
            Self::Lazy(backend) => {
                for (key_path, kind) in top_level_changes(&event.path, &event.delta) {
                    backend.change_advisory(&key_path, kind);
                }
                backend.dump(&event.root)
            }
        }
    }
}

/// The top-level keys a delta touched, each tagged with whether it was
/// written or removed. A direct `Tracker::set`/`delete` call carries its
/// own path already; `Tracker::replace` fires with an empty path and a
/// delta that can span many keys, so the delta itself is the source of
/// truth here.
fn top_level_changes(event_path: &Path, delta: &Delta) -> Vec<(Path, ChangeKind)> {
    let mut out = Vec::new();
    for op in delta {
        match op {
            EditOp::Add(add) if add.container.is_empty() => {
                if let Target::Key(key) = &add.target {
                    out.push((vec![PathSegment::Key(key.clone())], ChangeKind::Upserted));
                }
            }
            EditOp::Remove(remove) if remove.container.is_empty() => {
                if let Target::Key(key) = &remove.target {
                    out.push((vec![PathSegment::Key(key.clone())], ChangeKind::Removed));
                }
            }
            EditOp::Change { path, .. } if path.len() == 1 => {
                out.push((path.clone(), ChangeKind::Upserted));
            }
            _ => {}
        }
    }
    if out.is_empty() && !event_path.is_empty() {
        out.push((vec![event_path[0].clone()], ChangeKind::Upserted));
    }
    out
}

/// Arbitrates an optimistic-concurrency conflict surfaced by a
/// [`LazyPersistence`] backend with revisioned storage (§4.7). Returning
/// `true` keeps the local value (persisted as a new revision); `false`
/// accepts remote (the local value is replaced and fed back through the
/// engine as if it were a remote update).
pub trait ConflictCallback: Send + Sync {
    /// Decide a conflict at `path` between `local` and `remote` values.
    fn resolve(&self, path: &Path, local: &Value, remote: &Value) -> bool;
}
