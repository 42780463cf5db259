//! Per-peer synchronisation state (§3 "EdgeState", §4.4).

use conflux_value::{patch, patch_in_place, Checksum, ChecksumError, Delta, PatchFailure, Value};
use thiserror::Error;

/// Failure appending a local edit to an [`EdgeState`]: either the
/// reconstructed value failed to patch, or the new content failed to
/// checksum (§7).
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Propagated from [`EdgeState::reconstructed`].
    #[error(transparent)]
    Patch(#[from] PatchFailure),
    /// Propagated from [`Checksum::of`].
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// `(checksum, delta)`: `delta` is the edit that, applied to the value
/// whose fingerprint equals the *previous* entry's checksum, yields a value
/// whose fingerprint equals this entry's `checksum` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct EditEntry {
    /// Fingerprint of the value reached after applying `delta`.
    pub checksum: Checksum,
    /// The edit itself. Empty for the head (anchor) entry.
    pub delta: Delta,
}

// Wire-encoded as a 2-tuple `(checksum_hex, delta_ops)` rather than a
// struct, per §6's `"edits": [[checksum_hex, delta_ops], ...]`.
impl serde::Serialize for EditEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeTuple;
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.checksum)?;
        tup.serialize_element(&self.delta)?;
        tup.end()
    }
}

impl<'de> serde::Deserialize<'de> for EditEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (checksum, delta) = <(Checksum, Delta)>::deserialize(deserializer)?;
        Ok(Self { checksum, delta })
    }
}

/// Per-peer sync state: a baseline both sides are known to agree on, plus
/// the non-empty chain of edits advancing from it (§3, §4.4).
///
/// Invariants (checked with `debug_assert!` — a violation is
/// `ProtocolInvariant`, a programming bug, per §7):
/// - `edits[0].delta` is empty and `edits[0].checksum == checksum(baseline)`.
/// - For `i >= 1`, applying `edits[i].delta` to the value reached by
///   `edits[0..i]` produces a value whose checksum is `edits[i].checksum`.
#[derive(Debug, Clone)]
pub struct EdgeState {
    /// Last value both sides are known to agree on.
    pub baseline: Value,
    /// Head is `(checksum(baseline), [])`; later entries chain forward.
    /// The tail represents local edits sent but not yet confirmed.
    pub edits: Vec<EditEntry>,
}

impl EdgeState {
    /// A fresh edge anchored at `baseline`.
    #[must_use]
    pub fn new(baseline: Value) -> Self {
        let checksum = Checksum::of(&baseline).unwrap_or_else(|_| {
            // Canonicalisation of an in-memory Value cannot fail for the
            // shapes this crate constructs; treat a failure here as the
            // ProtocolInvariant break it would actually be.
            unreachable!("canonical serialization of an EdgeState baseline failed")
        });
        Self {
            baseline,
            edits: vec![EditEntry { checksum, delta: Delta::new() }],
        }
    }

    /// Concatenate `edits[1..]`'s deltas in order (`collapse`, §4.4).
    #[must_use]
    pub fn collapse_tail(&self) -> Delta {
        self.edits.iter().skip(1).flat_map(|e| e.delta.clone()).collect()
    }

    /// `patch(collapse(edits), baseline)`: the value this edge currently
    /// believes is the content, reconstructed from baseline plus tail.
    pub fn reconstructed(&self) -> Result<Value, PatchFailure> {
        patch(&self.collapse_tail(), &self.baseline)
    }

    /// `append_local` (§4.4): diff `content` against the value this edge
    /// currently reconstructs and, if non-empty, append a new tail entry.
    ///
    /// # Errors
    /// Returns [`EdgeError`] if reconstruction fails to patch, or `content`
    /// fails to checksum.
    pub fn append_local(&mut self, content: &Value) -> Result<bool, EdgeError> {
        let previous_value = self.reconstructed()?;
        let delta = conflux_value::diff(&previous_value, content);
        if delta.is_empty() {
            return Ok(false);
        }
        let checksum = Checksum::of(content)?;
        self.edits.push(EditEntry { checksum, delta });
        Ok(true)
    }

    /// `advance_baseline_to` (§4.4): collapse `edits[0..=index]` into
    /// `baseline`, then keep `edits[index..]` with the confirmed entry
    /// reduced to an empty-delta anchor.
    pub fn advance_baseline_to(&mut self, index: usize) -> Result<(), PatchFailure> {
        debug_assert!(index < self.edits.len(), "anchor index out of range");
        for entry in &self.edits[1..=index] {
            patch_in_place(&entry.delta, &mut self.baseline)?;
        }
        let anchor_checksum = self.edits[index].checksum.clone();
        let mut remaining = self.edits.split_off(index + 1);
        self.edits = vec![EditEntry { checksum: anchor_checksum, delta: Delta::new() }];
        self.edits.append(&mut remaining);
        debug_assert_eq!(
            Checksum::of(&self.baseline).ok(),
            self.edits.first().map(|e| e.checksum.clone()),
            "baseline checksum diverged from anchor after advance_baseline_to"
        );
        Ok(())
    }

    /// True once the tail holds more than the anchor entry, i.e. there are
    /// local edits not yet confirmed by the peer.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.edits.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_value::Value;

    fn map(pairs: &[(&str, i64)]) -> Value {
        let mut m = indexmap::IndexMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_owned(), Value::Int(*v));
        }
        Value::Map(m)
    }

    #[test]
    fn new_edge_has_single_anchor_entry() {
        let baseline = map(&[("a", 1)]);
        let edge = EdgeState::new(baseline.clone());
        assert_eq!(edge.edits.len(), 1);
        assert!(edge.edits[0].delta.is_empty());
        assert_eq!(edge.edits[0].checksum, Checksum::of(&baseline).unwrap());
    }

    #[test]
    fn append_local_tracks_drift_from_baseline() {
        let mut edge = EdgeState::new(map(&[("a", 1)]));
        let changed = edge.append_local(&map(&[("a", 2)])).unwrap();
        assert!(changed);
        assert_eq!(edge.edits.len(), 2);
        assert!(edge.has_pending());

        let unchanged = edge.append_local(&map(&[("a", 2)])).unwrap();
        assert!(!unchanged);
        assert_eq!(edge.edits.len(), 2);
    }

    #[test]
    fn advance_baseline_to_collapses_confirmed_entries() {
        let mut edge = EdgeState::new(map(&[("a", 1)]));
        edge.append_local(&map(&[("a", 2)])).unwrap();
        edge.append_local(&map(&[("a", 3)])).unwrap();
        assert_eq!(edge.edits.len(), 3);

        edge.advance_baseline_to(1).unwrap();
        assert_eq!(edge.baseline, map(&[("a", 2)]));
        assert_eq!(edge.edits.len(), 2);
        assert!(edge.edits[0].delta.is_empty());
        assert_eq!(edge.edits[0].checksum, Checksum::of(&map(&[("a", 2)])).unwrap());
    }

    #[test]
    fn advance_baseline_to_is_monotonic_under_repeat() {
        let mut edge = EdgeState::new(map(&[("a", 1)]));
        edge.append_local(&map(&[("a", 2)])).unwrap();
        edge.advance_baseline_to(1).unwrap();
        let snapshot = edge.baseline.clone();
        // Re-delivering the same advance (idempotent inbound delivery, §8 invariant 5).
        edge.advance_baseline_to(0).unwrap();
        assert_eq!(edge.baseline, snapshot);
    }
}
