//! `Tracker` contract (§4.6, §9 design note 1) and an in-process
//! implementation (§4.6a).
//!
//! The source wraps live values so arbitrary mutations fire callbacks
//! (`tracker.py`/`wrappers.py` intercept `__setitem__` and friends). Rust has
//! no operator-overload interception to speak of, so this is re-expressed
//! as an explicit mutation vocabulary (`set`, `delete`, `update`) with
//! `on_change` firing once per call, per §9's first design note.

use crate::document::SyncDocument;
use conflux_value::{diff, patch_in_place, Delta, Path, PathSegment, PatchFailure, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One observed mutation: the root value after the change, the path to the
/// mutated node, and the delta describing the structural change (§4.6).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Root value after the change was applied.
    pub root: Value,
    /// Path to the node the mutation targeted.
    pub path: Path,
    /// The structural delta this change corresponds to.
    pub delta: Delta,
}

/// Receives [`ChangeEvent`]s from a [`Tracker`]. `SyncEngine` is the
/// intended implementor; the tracker holds it only as a non-owning
/// [`Weak`] reference (§9 design note 3) to avoid a reference cycle between
/// the document and the engine that owns it.
pub trait ChangeObserver: Send + Sync {
    /// Called once per logical mutation, after it has been applied.
    fn on_change(&self, event: &ChangeEvent);
}

/// How many deltas [`History`] retains (§6 `history` configuration option).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryConfig {
    /// Do not record history; `undo`/`redo` are unavailable.
    #[default]
    Off,
    /// Keep every delta for the life of the tracker.
    Unbounded,
    /// Keep at most `N` deltas, dropping the oldest.
    Capacity(usize),
}

/// Bounded ring buffer of applied deltas supporting `undo`/`redo`
/// (recovered from `tracker.py`'s `ChangePathItem`/`wrappers.py`, which the
/// distilled spec only names as "a history subscriber").
#[derive(Debug, Default)]
pub struct History {
    config: HistoryConfig,
    applied: VecDeque<Delta>,
    undone: VecDeque<Delta>,
}

impl History {
    /// A history buffer configured per [`HistoryConfig`].
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self { config, applied: VecDeque::new(), undone: VecDeque::new() }
    }

    fn record(&mut self, delta: Delta) {
        if matches!(self.config, HistoryConfig::Off) {
            return;
        }
        self.undone.clear();
        self.applied.push_back(delta);
        if let HistoryConfig::Capacity(cap) = self.config {
            while self.applied.len() > cap {
                self.applied.pop_front();
            }
        }
    }

    /// Pop the most recently applied delta for `undo`, if any.
    pub fn pop_undo(&mut self) -> Option<Delta> {
        let delta = self.applied.pop_back()?;
        self.undone.push_back(delta.clone());
        Some(delta)
    }

    /// Pop the most recently undone delta for `redo`, if any.
    pub fn pop_redo(&mut self) -> Option<Delta> {
        let delta = self.undone.pop_back()?;
        self.applied.push_back(delta.clone());
        Some(delta)
    }

    /// Number of deltas currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// True if no deltas are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Explicit mutation vocabulary over a live [`Value`], firing
/// [`ChangeObserver::on_change`] once per call (§4.6, §9 design note 1).
pub trait Tracker: Send + Sync {
    /// A snapshot of the current content.
    fn content(&self) -> Value;

    /// Set `path` to `value`, creating or replacing it.
    ///
    /// # Errors
    /// Returns [`PatchFailure`] if an intermediate path segment does not
    /// resolve to a container.
    fn set(&self, path: &[PathSegment], value: Value) -> Result<(), PatchFailure>;

    /// Remove the value at `path`.
    ///
    /// # Errors
    /// Returns [`PatchFailure`] if `path` does not resolve to an existing
    /// value.
    fn delete(&self, path: &[PathSegment]) -> Result<(), PatchFailure>;

    /// Replace the entire content, firing one change event for the whole
    /// delta. Used by the sync engine to apply a merged remote delta while
    /// [`Tracker::sync_on`] is suppressed (§5 re-entrancy guard).
    fn replace(&self, value: Value);

    /// Whether local mutations should currently trigger outbound sync
    /// propagation (§5, §6 `sync_on`). The engine clears this while
    /// applying an inbound delta so the resulting synthetic change does not
    /// re-enter itself.
    fn sync_on(&self) -> bool;

    /// Set the [`Tracker::sync_on`] flag.
    fn set_sync_on(&self, on: bool);

    /// Whether changes should be persisted (§6 `save_changes`), suppressed
    /// during an atomic scope until it commits.
    fn save_changes(&self) -> bool;

    /// Set the [`Tracker::save_changes`] flag.
    fn set_save_changes(&self, on: bool);

    /// Install the observer notified on every committed change. Held
    /// non-owning (§9 design note 3) to avoid a document/engine reference
    /// cycle.
    fn set_observer(&self, observer: Weak<dyn ChangeObserver>);
}

/// Reference [`Tracker`]: mutates a shared [`SyncDocument`] under its
/// reentrant document lock, with the flags and bounded [`History`]
/// described in §4.6/§4.6a layered on top.
pub struct InProcessTracker {
    document: Arc<SyncDocument>,
    observer: Mutex<Option<Weak<dyn ChangeObserver>>>,
    sync_on: AtomicBool,
    save_changes: AtomicBool,
    in_atomic: AtomicBool,
    history: Mutex<History>,
}

impl InProcessTracker {
    /// A tracker over `document`'s content, history configured per
    /// `history_config`.
    #[must_use]
    pub fn new(document: Arc<SyncDocument>, history_config: HistoryConfig) -> Arc<Self> {
        Arc::new(Self {
            document,
            observer: Mutex::new(None),
            sync_on: AtomicBool::new(true),
            save_changes: AtomicBool::new(true),
            in_atomic: AtomicBool::new(false),
            history: Mutex::new(History::new(history_config)),
        })
    }

    fn notify(&self, path: Path, delta: Delta, root: Value) {
        if delta.is_empty() || self.in_atomic.load(Ordering::SeqCst) {
            return;
        }
        self.notify_unconditionally(path, delta, root);
    }

    fn notify_unconditionally(&self, path: Path, delta: Delta, root: Value) {
        if delta.is_empty() {
            return;
        }
        self.history.lock().record(delta.clone());
        let event = ChangeEvent { root, path, delta };
        if let Some(observer) = self.observer.lock().as_ref().and_then(Weak::upgrade) {
            observer.on_change(&event);
        }
    }

    /// Begin an atomic scope (§4.5.4): local mutations made through the
    /// returned guard do not fire `on_change` individually; on
    /// [`AtomicScope::commit`], a single synthetic change covering the
    /// whole delta fires. Dropping the guard without committing restores
    /// the pre-scope value and fires nothing.
    #[must_use]
    pub fn atomic(self: &Arc<Self>) -> AtomicScope {
        let snapshot = self.document.content();
        let was_save_changes = self.save_changes.swap(false, Ordering::SeqCst);
        self.in_atomic.store(true, Ordering::SeqCst);
        AtomicScope {
            tracker: self.clone(),
            snapshot,
            was_save_changes,
            committed: false,
        }
    }

    /// Undo the most recent recorded delta, if history is enabled and
    /// non-empty. Tracking is disabled for the duration so the undo itself
    /// is not recorded (§4.6).
    ///
    /// # Errors
    /// Returns [`PatchFailure`] if the stored delta no longer reverts
    /// cleanly against the current content.
    pub fn undo(&self) -> Result<bool, PatchFailure> {
        let Some(delta) = self.history.lock().pop_undo() else {
            return Ok(false);
        };
        self.document.with_state(|s| {
            s.content = conflux_value::revert(&delta, &s.content)?;
            Ok::<_, PatchFailure>(())
        })?;
        Ok(true)
    }

    /// Redo the most recently undone delta, if any.
    ///
    /// # Errors
    /// Returns [`PatchFailure`] if the stored delta no longer applies
    /// cleanly against the current content.
    pub fn redo(&self) -> Result<bool, PatchFailure> {
        let Some(delta) = self.history.lock().pop_redo() else {
            return Ok(false);
        };
        self.document.with_state(|s| patch_in_place(&delta, &mut s.content))?;
        Ok(true)
    }
}

impl Tracker for InProcessTracker {
    fn content(&self) -> Value {
        self.document.content()
    }

    fn set(&self, path: &[PathSegment], value: Value) -> Result<(), PatchFailure> {
        let (delta, root) = self.document.with_state(|s| {
            let before = s.content.clone();
            set_at(&mut s.content, path, value)?;
            Ok::<_, PatchFailure>((diff(&before, &s.content), s.content.clone()))
        })?;
        self.notify(path.to_vec(), delta, root);
        Ok(())
    }

    fn delete(&self, path: &[PathSegment]) -> Result<(), PatchFailure> {
        let (delta, root) = self.document.with_state(|s| {
            let before = s.content.clone();
            delete_at(&mut s.content, path)?;
            Ok::<_, PatchFailure>((diff(&before, &s.content), s.content.clone()))
        })?;
        self.notify(path.to_vec(), delta, root);
        Ok(())
    }

    fn replace(&self, value: Value) {
        let (delta, root) = self.document.with_state(|s| {
            let before = s.content.clone();
            s.content = value;
            (diff(&before, &s.content), s.content.clone())
        });
        self.notify(Vec::new(), delta, root);
    }

    fn sync_on(&self) -> bool {
        self.sync_on.load(Ordering::SeqCst)
    }

    fn set_sync_on(&self, on: bool) {
        self.sync_on.store(on, Ordering::SeqCst);
    }

    fn save_changes(&self) -> bool {
        self.save_changes.load(Ordering::SeqCst)
    }

    fn set_save_changes(&self, on: bool) {
        self.save_changes.store(on, Ordering::SeqCst);
    }

    fn set_observer(&self, observer: Weak<dyn ChangeObserver>) {
        *self.observer.lock() = Some(observer);
    }
}

fn set_at(root: &mut Value, path: &[PathSegment], value: Value) -> Result<(), PatchFailure> {
    if let Some((last, prefix)) = path.split_last() {
        let parent = navigate_mut(root, prefix)?;
        match (parent, last) {
            (Value::Map(m), PathSegment::Key(k)) => {
                m.insert(k.clone(), value);
            }
            (Value::Seq(s), PathSegment::Index(i)) if *i <= s.len() => {
                if *i == s.len() {
                    s.push(value);
                } else {
                    s[*i] = value;
                }
            }
            (other, _) => {
                return Err(PatchFailure::TypeMismatch {
                    path: prefix.to_vec(),
                    expected: "map or seq",
                    found: other.type_name(),
                })
            }
        }
        Ok(())
    } else {
        *root = value;
        Ok(())
    }
}

fn delete_at(root: &mut Value, path: &[PathSegment]) -> Result<(), PatchFailure> {
    let Some((last, prefix)) = path.split_last() else {
        return Err(PatchFailure::MissingPath(Vec::new()));
    };
    let parent = navigate_mut(root, prefix)?;
    match (parent, last) {
        (Value::Map(m), PathSegment::Key(k)) => {
            m.shift_remove(k).ok_or_else(|| PatchFailure::MissingPath(path.to_vec()))?;
        }
        (Value::Seq(s), PathSegment::Index(i)) if *i < s.len() => {
            s.remove(*i);
        }
        (other, _) => {
            return Err(PatchFailure::TypeMismatch {
                path: prefix.to_vec(),
                expected: "map or seq",
                found: other.type_name(),
            })
        }
    }
    Ok(())
}

fn navigate_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, PatchFailure> {
    let mut cur = root;
    let mut walked: Path = Vec::new();
    for seg in path {
        walked.push(seg.clone());
        cur = match (cur, seg) {
            (Value::Map(m), PathSegment::Key(k)) => {
                m.get_mut(k).ok_or_else(|| PatchFailure::MissingPath(walked.clone()))?
            }
            (Value::Seq(s), PathSegment::Index(i)) => {
                s.get_mut(*i).ok_or_else(|| PatchFailure::MissingPath(walked.clone()))?
            }
            (other, _) => {
                return Err(PatchFailure::TypeMismatch {
                    path: walked,
                    expected: "map or seq",
                    found: other.type_name(),
                })
            }
        };
    }
    Ok(cur)
}

/// RAII atomic scope returned by [`InProcessTracker::atomic`] (§4.5.4).
/// Must be explicitly [`commit`](AtomicScope::commit)ted; dropping it
/// uncommitted rolls back to the pre-scope value and fires no change.
pub struct AtomicScope {
    tracker: Arc<InProcessTracker>,
    snapshot: Value,
    was_save_changes: bool,
    committed: bool,
}

impl AtomicScope {
    /// Commit the scope: fire a single synthetic change covering the net
    /// delta since the scope began, and restore the `save_changes` flag.
    pub fn commit(mut self) {
        self.committed = true;
        self.tracker.in_atomic.store(false, Ordering::SeqCst);
        self.tracker.save_changes.store(self.was_save_changes, Ordering::SeqCst);
        let after = self.tracker.document.content();
        let delta = diff(&self.snapshot, &after);
        self.tracker.notify_unconditionally(Vec::new(), delta, after);
    }
}

impl Drop for AtomicScope {
    fn drop(&mut self) {
        self.tracker.in_atomic.store(false, Ordering::SeqCst);
        if self.committed {
            return;
        }
        self.tracker.document.with_state(|s| s.content = self.snapshot.clone());
        self.tracker.save_changes.store(self.was_save_changes, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_value::Value;
    use std::sync::atomic::AtomicUsize;

    struct CountingObserver(AtomicUsize);

    impl ChangeObserver for CountingObserver {
        fn on_change(&self, _event: &ChangeEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fresh_tracker(history: HistoryConfig) -> Arc<InProcessTracker> {
        let doc = Arc::new(SyncDocument::new("n1", "doc", Value::map()));
        InProcessTracker::new(doc, history)
    }

    #[test]
    fn set_and_delete_fire_one_change_each() {
        let tracker = fresh_tracker(HistoryConfig::Unbounded);
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        tracker.set_observer(Arc::downgrade(&(observer.clone() as Arc<dyn ChangeObserver>)));

        tracker.set(&[PathSegment::Key("a".into())], Value::Int(1)).unwrap();
        tracker.delete(&[PathSegment::Key("a".into())]).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn atomic_commit_fires_single_change() {
        let tracker = fresh_tracker(HistoryConfig::Unbounded);
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        tracker.set_observer(Arc::downgrade(&(observer.clone() as Arc<dyn ChangeObserver>)));

        let scope = tracker.atomic();
        tracker.set(&[PathSegment::Key("a".into())], Value::Int(1)).unwrap();
        tracker.set(&[PathSegment::Key("b".into())], Value::Int(2)).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
        scope.commit();
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn atomic_drop_without_commit_rolls_back() {
        let tracker = fresh_tracker(HistoryConfig::Off);
        {
            let _scope = tracker.atomic();
            tracker.set(&[PathSegment::Key("a".into())], Value::Int(1)).unwrap();
        }
        assert_eq!(tracker.content(), Value::map());
    }

    #[test]
    fn undo_redo_roundtrip() {
        let tracker = fresh_tracker(HistoryConfig::Capacity(8));
        tracker.set(&[PathSegment::Key("a".into())], Value::Int(1)).unwrap();
        let after_set = tracker.content();
        assert!(tracker.undo().unwrap());
        assert_eq!(tracker.content(), Value::map());
        assert!(tracker.redo().unwrap());
        assert_eq!(tracker.content(), after_set);
    }
}
