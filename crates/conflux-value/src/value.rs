//! The structural value type synchronized by the engine.

use crate::path::PathSegment;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A hashable scalar, usable as a [`Value::Set`] element.
///
/// Floats are excluded: IEEE 754 values are not a total order and make poor
/// set keys (NaN, -0.0 vs 0.0). Use [`Value::Seq`] for collections of floats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A UTF-8 string.
    String(String),
}

impl From<ScalarValue> for Value {
    fn from(s: ScalarValue) -> Self {
        match s {
            ScalarValue::Null => Value::Null,
            ScalarValue::Bool(b) => Value::Bool(b),
            ScalarValue::Int(i) => Value::Int(i),
            ScalarValue::String(s) => Value::String(s),
        }
    }
}

/// A structural value: mapping, ordered sequence, set of scalars, or a
/// scalar primitive. Mirrors the data model in §3 of the specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence of values.
    Seq(Vec<Value>),
    /// A mapping with string keys; iteration order is insertion order.
    Map(IndexMap<String, Value>),
    /// A set of hashable scalars.
    Set(BTreeSet<ScalarValue>),
}

impl Value {
    /// Construct an empty map.
    #[must_use]
    pub fn map() -> Self {
        Value::Map(IndexMap::new())
    }

    /// Construct an empty sequence.
    #[must_use]
    pub fn seq() -> Self {
        Value::Seq(Vec::new())
    }

    /// Construct an empty set.
    #[must_use]
    pub fn set() -> Self {
        Value::Set(BTreeSet::new())
    }

    /// Short, stable type name used in mismatch error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "seq",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
        }
    }

    /// Navigate to the value at `path`, returning `None` if any segment is
    /// absent or addresses the wrong container kind.
    #[must_use]
    pub fn get(&self, path: &[PathSegment]) -> Option<&Value> {
        let mut cur = self;
        for seg in path {
            cur = match (cur, seg) {
                (Value::Map(m), PathSegment::Key(k)) => m.get(k)?,
                (Value::Seq(s), PathSegment::Index(i)) => s.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Mutable navigation; see [`Value::get`].
    pub fn get_mut(&mut self, path: &[PathSegment]) -> Option<&mut Value> {
        let mut cur = self;
        for seg in path {
            cur = match (cur, seg) {
                (Value::Map(m), PathSegment::Key(k)) => m.get_mut(k)?,
                (Value::Seq(s), PathSegment::Index(i)) => s.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}
