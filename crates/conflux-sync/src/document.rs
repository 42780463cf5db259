//! `SyncDocument` (§3) and the reentrant document lock (§5).
//!
//! `std::sync::ReentrantLock` is not in stable std, so the lock is modeled
//! as a `parking_lot::ReentrantMutex<RefCell<DocumentState>>` —
//! `parking_lot` is the conventional crate for exactly this
//! non-std-reentrant-mutex need. Every entry point that touches `content`,
//! an `EdgeState`, or `peers` acquires it; `Tracker` and `SyncEngine` share
//! the same lock (§4.6 "a reentrant lock the SyncEngine shares").

use crate::edge::EdgeState;
use conflux_value::{Checksum, Value};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Everything the document lock guards: the live value, the seed used to
/// initialise new `EdgeState`s, and per-peer sync state.
pub struct DocumentState {
    /// The live value, mutated by application code via a `Tracker`.
    pub content: Value,
    /// Seed value (and its checksum) used to initialise new `EdgeState`s.
    pub initial: Value,
    /// Per-peer sync state, created lazily on first send/receive.
    pub peers: BTreeMap<String, EdgeState>,
}

impl DocumentState {
    fn new(initial: Value) -> Self {
        Self { content: initial.clone(), initial, peers: BTreeMap::new() }
    }
}

/// One replica's view of a shared document (§3).
pub struct SyncDocument {
    /// Stable unique identifier for this replica, generated once at
    /// startup by the caller.
    pub self_id: String,
    /// Shared logical name of the document.
    pub doc_id: String,
    lock: ReentrantMutex<RefCell<DocumentState>>,
}

impl SyncDocument {
    /// A document seeded with `initial` content.
    #[must_use]
    pub fn new(self_id: impl Into<String>, doc_id: impl Into<String>, initial: Value) -> Self {
        Self {
            self_id: self_id.into(),
            doc_id: doc_id.into(),
            lock: ReentrantMutex::new(RefCell::new(DocumentState::new(initial))),
        }
    }

    /// Run `f` with exclusive (but reentrant, so nested calls on the same
    /// thread do not deadlock) access to the document state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut DocumentState) -> R) -> R {
        let guard = self.lock.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// A snapshot of the current content.
    #[must_use]
    pub fn content(&self) -> Value {
        self.with_state(|s| s.content.clone())
    }

    /// The checksum of the current content.
    pub fn checksum(&self) -> Result<Checksum, conflux_value::ChecksumError> {
        self.with_state(|s| Checksum::of(&s.content))
    }

    /// Borrow (or lazily create) the `EdgeState` for `peer_id`, running `f`
    /// against it under the document lock.
    pub fn with_edge<R>(&self, peer_id: &str, f: impl FnOnce(&mut EdgeState) -> R) -> R {
        self.with_state(|s| {
            let initial = s.initial.clone();
            let edge = s.peers.entry(peer_id.to_owned()).or_insert_with(|| EdgeState::new(initial));
            f(edge)
        })
    }

    /// Remove the `EdgeState` for a departed peer.
    pub fn remove_edge(&self, peer_id: &str) {
        self.with_state(|s| {
            s.peers.remove(peer_id);
        });
    }

    /// Every peer id with a live `EdgeState`.
    #[must_use]
    pub fn known_peers(&self) -> Vec<String> {
        self.with_state(|s| s.peers.keys().cloned().collect())
    }
}
