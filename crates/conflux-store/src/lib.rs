// SPDX-License-Identifier: Apache-2.0
//! Persistence backends implementing `conflux_sync`'s
//! [`WholeDocumentPersistence`](conflux_sync::WholeDocumentPersistence) and
//! [`LazyPersistence`](conflux_sync::LazyPersistence) contracts (§4.7),
//! grounded in `tinysync`'s `persistence.py`.

mod file;
mod lazy;

pub use file::{FileFormat, FilePersistence};
pub use lazy::InMemoryLazyStore;
