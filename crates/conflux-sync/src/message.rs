//! Wire message shape (§6).

use crate::edge::EditEntry;
use conflux_value::Checksum;
use serde::{Deserialize, Serialize};

// `EditEntry`'s Serialize/Deserialize impls live in `edge.rs`, next to the
// struct they wire-encode as a 2-tuple `(checksum_hex, delta_ops)` (§6).

/// `{ "upwards": bool, "edits": [[checksum_hex, delta_ops], ...] }` (§6).
/// The first entry's delta is always empty (the anchor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// True if this message is travelling from a lower-id node to a
    /// higher-id one.
    pub upwards: bool,
    /// The sender's edit chain for this edge, in order.
    pub edits: Vec<EditEntry>,
}

impl Message {
    /// Build a message from a direction and an edge's current edit chain.
    #[must_use]
    pub fn new(upwards: bool, edits: Vec<EditEntry>) -> Self {
        Self { upwards, edits }
    }

    /// The checksum of the message's anchor entry (its first, empty-delta
    /// entry).
    #[must_use]
    pub fn anchor_checksum(&self) -> Option<&Checksum> {
        self.edits.first().map(|e| &e.checksum)
    }
}
