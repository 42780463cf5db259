//! Structural paths into a [`crate::Value`] tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`Path`]: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// A map key.
    Key(String),
    /// A sequence index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A sequence of keys/indices from the document root to some node.
pub type Path = Vec<PathSegment>;

/// Render a [`Path`] for error messages and logs.
pub fn display_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "$".to_owned();
    }
    let mut out = String::from("$");
    for seg in path {
        out.push_str(&seg.to_string());
    }
    out
}
