// SPDX-License-Identifier: Apache-2.0
//! Structural [`Value`] trees, the [`diff`]/[`patch`]/[`revert`] delta
//! codec, and content-addressed [`Checksum`]s.
//!
//! This crate has no notion of peers or protocol state — it is pure data
//! plus the transforms over it. `conflux-sync` builds the per-peer edge
//! state and merge algorithm on top.

mod canonical;
mod checksum;
mod delta;
mod path;
mod value;

pub use checksum::{Checksum, ChecksumError};
pub use delta::{diff, patch, patch_in_place, revert, Add, Delta, EditOp, PatchFailure, Remove, Target};
pub use path::{display_path, Path, PathSegment};
pub use value::{ScalarValue, Value};
