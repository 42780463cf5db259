//! Structural diffs: `diff`, `patch`, `revert` over [`Value`] trees.

use crate::path::{display_path, Path, PathSegment};
use crate::value::{ScalarValue, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of slot an [`Add`]/[`Remove`] op addresses within its
/// `container` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A map key (container must be [`Value::Map`]).
    Key(String),
    /// A sequence index; for `Add` this is an insertion point, for `Remove`
    /// the index of the element to drop (container must be [`Value::Seq`]).
    Index(usize),
    /// A set element, identified by value rather than position (container
    /// must be [`Value::Set`]).
    Elem,
}

/// An insertion: `value` is added to `container` at `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Add {
    /// Path to the container (map, seq, or set) receiving the value.
    pub container: Path,
    /// Where within the container.
    pub target: Target,
    /// The value being added.
    pub value: Value,
}

/// A removal: `value` is the value being removed from `container` at
/// `target`, carried so that [`revert`] can restore it without consulting
/// the pre-image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remove {
    /// Path to the container (map, seq, or set) losing the value.
    pub container: Path,
    /// Where within the container.
    pub target: Target,
    /// The value being removed.
    pub value: Value,
}

/// A single structural edit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditOp {
    /// Add a value to a map, sequence, or set.
    Add(Add),
    /// Remove a value from a map, sequence, or set.
    Remove(Remove),
    /// Replace the value at `path` wholesale.
    Change {
        /// Path to the replaced node.
        path: Path,
        /// Its previous value.
        old: Value,
        /// Its new value.
        new: Value,
    },
}

/// An ordered sequence of structural edits transforming one value into
/// another.
pub type Delta = Vec<EditOp>;

/// Failure applying or reverting a [`Delta`]: the delta does not match the
/// shape of the value it's being applied to. Callers should treat this as
/// "merge not possible this way" (§4.1).
#[derive(Debug, Error, PartialEq)]
pub enum PatchFailure {
    /// No value exists at the given path.
    #[error("path not found: {}", display_path(.0))]
    MissingPath(Path),
    /// A container exists at the path, but is the wrong kind for the op's
    /// [`Target`] (e.g. an `Index` target against a [`Value::Map`]).
    #[error("type mismatch at {}: expected {expected}, found {found}", display_path(path))]
    TypeMismatch {
        /// Path to the container.
        path: Path,
        /// What was expected.
        expected: &'static str,
        /// What was actually there.
        found: &'static str,
    },
    /// `Add` targeted a map key or set element that is already present.
    #[error("already present at {}", display_path(.0))]
    AlreadyPresent(Path),
    /// `Remove` targeted a map key, sequence index, or set element that
    /// was not found.
    #[error("not present at {}", display_path(.0))]
    NotPresent(Path),
}

fn navigate_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, PatchFailure> {
    let mut cur = root;
    let mut walked: Path = Vec::new();
    for seg in path {
        walked.push(seg.clone());
        cur = match (cur, seg) {
            (Value::Map(m), PathSegment::Key(k)) => {
                m.get_mut(k).ok_or(PatchFailure::MissingPath(walked.clone()))?
            }
            (Value::Seq(s), PathSegment::Index(i)) => {
                s.get_mut(*i).ok_or(PatchFailure::MissingPath(walked.clone()))?
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

fn full_path(container: &[PathSegment], target: &Target) -> Path {
    let mut p = container.to_vec();
    match target {
        Target::Key(k) => p.push(PathSegment::Key(k.clone())),
        Target::Index(i) => p.push(PathSegment::Index(*i)),
        Target::Elem => {}
    }
    p
}

fn to_scalar(path: &[PathSegment], value: &Value) -> Result<ScalarValue, PatchFailure> {
    match value {
        Value::Null => Ok(ScalarValue::Null),
        Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
        Value::Int(i) => Ok(ScalarValue::Int(*i)),
        Value::String(s) => Ok(ScalarValue::String(s.clone())),
        other => Err(PatchFailure::TypeMismatch {
            path: path.to_vec(),
            expected: "hashable scalar",
            found: other.type_name(),
        }),
    }
}

fn apply_add(op: &Add, root: &mut Value) -> Result<(), PatchFailure> {
    let container = navigate_mut(root, &op.container)?;
    match (container, &op.target) {
        (Value::Map(m), Target::Key(k)) => {
            if m.contains_key(k) {
                return Err(PatchFailure::AlreadyPresent(full_path(&op.container, &op.target)));
            }
            m.insert(k.clone(), op.value.clone());
            Ok(())
        }
        (Value::Seq(s), Target::Index(i)) => {
            if *i > s.len() {
                return Err(PatchFailure::MissingPath(full_path(&op.container, &op.target)));
            }
            s.insert(*i, op.value.clone());
            Ok(())
        }
        (Value::Set(set), Target::Elem) => {
            let sv = to_scalar(&op.container, &op.value)?;
            if !set.insert(sv) {
                return Err(PatchFailure::AlreadyPresent(op.container.clone()));
            }
            Ok(())
        }
        (other, target) => Err(PatchFailure::TypeMismatch {
            path: op.container.clone(),
            expected: target_container_name(target),
            found: other.type_name(),
        }),
    }
}

fn apply_remove(op: &Remove, root: &mut Value) -> Result<(), PatchFailure> {
    let container = navigate_mut(root, &op.container)?;
    match (container, &op.target) {
        (Value::Map(m), Target::Key(k)) => {
            if m.shift_remove(k).is_none() {
                return Err(PatchFailure::NotPresent(full_path(&op.container, &op.target)));
            }
            Ok(())
        }
        (Value::Seq(s), Target::Index(i)) => {
            if *i >= s.len() {
                return Err(PatchFailure::NotPresent(full_path(&op.container, &op.target)));
            }
            s.remove(*i);
            Ok(())
        }
        (Value::Set(set), Target::Elem) => {
            let sv = to_scalar(&op.container, &op.value)?;
            if !set.remove(&sv) {
                return Err(PatchFailure::NotPresent(op.container.clone()));
            }
            Ok(())
        }
        (other, target) => Err(PatchFailure::TypeMismatch {
            path: op.container.clone(),
            expected: target_container_name(target),
            found: other.type_name(),
        }),
    }
}

fn target_container_name(target: &Target) -> &'static str {
    match target {
        Target::Key(_) => "map",
        Target::Index(_) => "seq",
        Target::Elem => "set",
    }
}

fn apply_op(op: &EditOp, root: &mut Value) -> Result<(), PatchFailure> {
    match op {
        EditOp::Add(add) => apply_add(add, root),
        EditOp::Remove(rm) => apply_remove(rm, root),
        EditOp::Change { path, new, .. } => {
            let slot = navigate_mut(root, path)?;
            *slot = new.clone();
            Ok(())
        }
    }
}

fn invert(op: &EditOp) -> EditOp {
    match op {
        EditOp::Add(add) => EditOp::Remove(Remove {
            container: add.container.clone(),
            target: add.target.clone(),
            value: add.value.clone(),
        }),
        EditOp::Remove(rm) => EditOp::Add(Add {
            container: rm.container.clone(),
            target: rm.target.clone(),
            value: rm.value.clone(),
        }),
        EditOp::Change { path, old, new } => EditOp::Change {
            path: path.clone(),
            old: new.clone(),
            new: old.clone(),
        },
    }
}

/// Apply `delta` to `v` in place.
pub fn patch_in_place(delta: &Delta, v: &mut Value) -> Result<(), PatchFailure> {
    for op in delta {
        apply_op(op, v)?;
    }
    Ok(())
}

/// Apply `delta` to a copy of `v`, returning the result.
pub fn patch(delta: &Delta, v: &Value) -> Result<Value, PatchFailure> {
    let mut out = v.clone();
    patch_in_place(delta, &mut out)?;
    Ok(out)
}

/// Undo `delta`, which must have been produced against `v` (i.e. `v` is the
/// *post*-delta value), returning the pre-delta value.
pub fn revert(delta: &Delta, v: &Value) -> Result<Value, PatchFailure> {
    let mut out = v.clone();
    for op in delta.iter().rev() {
        apply_op(&invert(op), &mut out)?;
    }
    Ok(out)
}

fn diff_map(
    path: &[PathSegment],
    a: &indexmap::IndexMap<String, Value>,
    b: &indexmap::IndexMap<String, Value>,
    ops: &mut Delta,
) {
    for (k, bv) in b {
        let mut child_path = path.to_vec();
        child_path.push(PathSegment::Key(k.clone()));
        match a.get(k) {
            Some(av) => diff_into(&child_path, av, bv, ops),
            None => ops.push(EditOp::Add(Add {
                container: path.to_vec(),
                target: Target::Key(k.clone()),
                value: bv.clone(),
            })),
        }
    }
    for (k, av) in a {
        if !b.contains_key(k) {
            ops.push(EditOp::Remove(Remove {
                container: path.to_vec(),
                target: Target::Key(k.clone()),
                value: av.clone(),
            }));
        }
    }
}

fn diff_seq(path: &[PathSegment], a: &[Value], b: &[Value], ops: &mut Delta) {
    let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    for i in (prefix..a.len()).rev() {
        ops.push(EditOp::Remove(Remove {
            container: path.to_vec(),
            target: Target::Index(i),
            value: a[i].clone(),
        }));
    }
    for (i, v) in b.iter().enumerate().skip(prefix) {
        ops.push(EditOp::Add(Add {
            container: path.to_vec(),
            target: Target::Index(i),
            value: v.clone(),
        }));
    }
}

fn diff_set(
    path: &[PathSegment],
    a: &std::collections::BTreeSet<ScalarValue>,
    b: &std::collections::BTreeSet<ScalarValue>,
    ops: &mut Delta,
) {
    for elem in b.difference(a) {
        ops.push(EditOp::Add(Add {
            container: path.to_vec(),
            target: Target::Elem,
            value: elem.clone().into(),
        }));
    }
    for elem in a.difference(b) {
        ops.push(EditOp::Remove(Remove {
            container: path.to_vec(),
            target: Target::Elem,
            value: elem.clone().into(),
        }));
    }
}

fn diff_into(path: &[PathSegment], a: &Value, b: &Value, ops: &mut Delta) {
    if a == b {
        return;
    }
    match (a, b) {
        (Value::Map(ma), Value::Map(mb)) => diff_map(path, ma, mb, ops),
        (Value::Seq(sa), Value::Seq(sb)) => diff_seq(path, sa, sb, ops),
        (Value::Set(xa), Value::Set(xb)) => diff_set(path, xa, xb, ops),
        _ => ops.push(EditOp::Change {
            path: path.to_vec(),
            old: a.clone(),
            new: b.clone(),
        }),
    }
}

/// Compute a delta transforming `a` into `b`, such that
/// `patch(diff(a, b), a) == Ok(b.clone())`.
#[must_use]
pub fn diff(a: &Value, b: &Value) -> Delta {
    let mut ops = Vec::new();
    diff_into(&[], a, b, &mut ops);
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn map(pairs: &[(&str, Value)]) -> Value {
        let mut m = indexmap::IndexMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_owned(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn empty_diff_for_equal_values() {
        let a = map(&[("x", Value::Int(1))]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn add_and_remove_keys_roundtrip() {
        let a = map(&[("x", Value::Int(1))]);
        let b = map(&[("y", Value::Int(2))]);
        let d = diff(&a, &b);
        assert_eq!(patch(&d, &a).unwrap(), b);
        assert_eq!(revert(&d, &b).unwrap(), a);
    }

    #[test]
    fn nested_map_change_is_targeted() {
        let a = map(&[("x", map(&[("y", Value::Int(1))]))]);
        let b = map(&[("x", map(&[("y", Value::Int(2))]))]);
        let d = diff(&a, &b);
        assert_eq!(d.len(), 1);
        assert!(matches!(d[0], EditOp::Change { .. }));
        assert_eq!(patch(&d, &a).unwrap(), b);
    }

    #[test]
    fn seq_append_and_truncate_roundtrip() {
        let a = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let d = diff(&a, &b);
        assert_eq!(patch(&d, &a).unwrap(), b);
        assert_eq!(revert(&d, &b).unwrap(), a);

        let c = Value::Seq(vec![Value::Int(1)]);
        let d2 = diff(&b, &c);
        assert_eq!(patch(&d2, &b).unwrap(), c);
        assert_eq!(revert(&d2, &c).unwrap(), b);
    }

    #[test]
    fn set_add_remove_roundtrip() {
        let a = Value::Set(std::collections::BTreeSet::from([ScalarValue::Int(1)]));
        let b = Value::Set(std::collections::BTreeSet::from([ScalarValue::Int(2)]));
        let d = diff(&a, &b);
        assert_eq!(patch(&d, &a).unwrap(), b);
        assert_eq!(revert(&d, &b).unwrap(), a);
    }

    #[test]
    fn patch_fails_on_missing_path() {
        let a = map(&[]);
        let bogus = EditOp::Remove(Remove {
            container: vec![],
            target: Target::Key("missing".into()),
            value: Value::Int(1),
        });
        let err = patch(&vec![bogus], &a).unwrap_err();
        assert!(matches!(err, PatchFailure::NotPresent(_)));
    }
}
