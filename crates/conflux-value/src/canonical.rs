//! Canonical, order-independent serialization of [`Value`] for checksums.
//!
//! Mirrors the canonicalisation `echo-graph::RenderGraph::to_canonical_bytes`
//! performs for its hash: sort what has no inherent order, serialize the
//! rest as-is, and feed the bytes to a fixed hash function.

use crate::value::{ScalarValue, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// A canonical shadow of [`Value`]: maps become sorted `BTreeMap`s so two
/// structurally equal values always serialize identically regardless of
/// insertion order.
#[derive(Serialize)]
enum Canon {
    Null,
    Bool(bool),
    Int(i64),
    /// Stable textual form: canonical serialization must not depend on the
    /// platform's float formatting quirks, so floats are carried as their
    /// bit pattern rather than `f64`'s `Serialize` impl.
    Float(u64),
    String(String),
    Seq(Vec<Canon>),
    Map(BTreeMap<String, Canon>),
    Set(Vec<ScalarValue>),
}

fn canonicalize(v: &Value) -> Canon {
    match v {
        Value::Null => Canon::Null,
        Value::Bool(b) => Canon::Bool(*b),
        Value::Int(i) => Canon::Int(*i),
        Value::Float(f) => Canon::Float(f.to_bits()),
        Value::String(s) => Canon::String(s.clone()),
        Value::Seq(items) => Canon::Seq(items.iter().map(canonicalize).collect()),
        Value::Map(m) => {
            Canon::Map(m.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect())
        }
        Value::Set(s) => Canon::Set(s.iter().cloned().collect()),
    }
}

/// Serialize `v` to its canonical CBOR bytes.
///
/// # Errors
/// Returns an error only if the in-memory structure cannot be represented
/// in CBOR, which cannot happen for well-formed [`Value`] trees built
/// through the public API.
pub fn to_canonical_bytes(v: &Value) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
    let canon = canonicalize(v);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&canon, &mut bytes)?;
    Ok(bytes)
}
