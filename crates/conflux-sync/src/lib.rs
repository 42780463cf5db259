// SPDX-License-Identifier: Apache-2.0
//! Differential-sync protocol state machine (§4, §5): `EdgeState`'s drift
//! tracking, `SyncEngine`'s reconciliation loop, and the `Tracker` /
//! `Persistence` contracts application code implements against.
//!
//! `conflux-value` supplies the structural `Value`/`Delta` model this crate
//! reconciles; `conflux-conduit` supplies peer discovery and transport.
//! Neither knows about the other; this crate is where they meet.

mod config;
mod document;
mod edge;
mod engine;
mod error;
mod merge;
mod message;
mod persistence;
mod tracker;

pub use config::{PersistMode, SyncConfig, SyncMode};
pub use document::{DocumentState, SyncDocument};
pub use edge::{EdgeError, EditEntry, EdgeState};
pub use engine::{ChangeCallback, SyncEngine};
pub use error::SyncError;
pub use merge::{merge, Direction};
pub use message::Message;
pub use persistence::{
    ChangeKind, ConflictCallback, LazyLoadMarker, LazyPersistence, PersistenceBackend, PersistenceError,
    WholeDocumentPersistence,
};
pub use tracker::{AtomicScope, ChangeEvent, ChangeObserver, History, HistoryConfig, InProcessTracker, Tracker};
