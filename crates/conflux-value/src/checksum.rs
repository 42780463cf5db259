//! Content-addressed fingerprints of [`Value`] trees.

use crate::canonical::to_canonical_bytes;
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Failure computing a [`Checksum`]. In practice this cannot happen for
/// values built through the public [`Value`] API; see
/// [`to_canonical_bytes`].
#[derive(Debug, Error)]
#[error("failed to canonicalize value: {0}")]
pub struct ChecksumError(#[from] ciborium::ser::Error<std::io::Error>);

/// A fixed-length content fingerprint of a [`Value`], derived from its
/// canonical serialization (§4.2). Two structurally equal values always
/// produce the same checksum; two different values produce different
/// checksums with overwhelming probability.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Compute the checksum of `value`.
    ///
    /// # Errors
    /// See [`ChecksumError`].
    pub fn of(value: &Value) -> Result<Self, ChecksumError> {
        let bytes = to_canonical_bytes(value)?;
        Ok(Self(*blake3::hash(&bytes).as_bytes()))
    }

    /// Render as a lowercase hex string.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex_encode(&self.0)
    }

    /// Parse from a lowercase hex string of the expected length.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let byte = std::str::from_utf8(chunk).ok()?;
            out[i] = u8::from_str_radix(byte, 16).ok()?;
        }
        Some(Self(out))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Checksum::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid checksum hex"))
    }
}
