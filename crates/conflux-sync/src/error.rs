//! Error type surfaced by [`crate::SyncEngine`] (§7).

use conflux_value::Path;
use thiserror::Error;

/// Failures the sync engine can report to a caller. `ProtocolInvariant`
/// violations from §7 are not represented here: they are `debug_assert!`
/// panics in [`crate::EdgeState`], since they indicate a programming bug
/// rather than a recoverable condition.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A delta failed to apply. Inside the merge algorithm this is caught
    /// by the commute test; outside it, it is fatal for the current
    /// exchange and the affected `EdgeState` is reset (§7).
    #[error("patch failed: {0}")]
    Patch(#[from] conflux_value::PatchFailure),

    /// An `EdgeState` failed to append a local edit or reconstruct its
    /// tracked value.
    #[error(transparent)]
    Edge(#[from] crate::edge::EdgeError),

    /// No checksum is shared between the local and remote edit chains for
    /// this peer. Indicates a prolonged partition plus independent
    /// advance; recovered by resetting the edge to a fresh baseline.
    #[error("no common anchor with peer {peer}")]
    AnchorMissing {
        /// The peer whose edit chain no longer shares an anchor.
        peer: String,
    },

    /// The underlying [`conflux_conduit::Conduit`] failed to deliver or
    /// route a message.
    #[error("transport error: {0}")]
    Transport(#[from] conflux_conduit::ConduitError),

    /// A persistence backend reported an optimistic-concurrency conflict
    /// that the registered `conflict_callback` declined to resolve.
    #[error("unresolved persistence conflict at {}", conflux_value::display_path(path))]
    PersistenceConflict {
        /// Path to the conflicting subtree.
        path: Path,
    },

    /// A `Message` failed to encode for the wire (§6). In practice this
    /// only happens if a non-finite float reached the document.
    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),
}
