//! Process-wide registry backing [`crate::InMemoryConduit`] (Design Notes
//! §9, "global mutable state for in-memory routing"): a singleton keyed by
//! `doc_id`, guarded by its own mutex, cleared entry-by-entry on
//! `shutdown`.

use crate::ConduitHandler;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Default)]
pub(crate) struct DocumentRegistry {
    pub(crate) members: BTreeMap<String, Arc<dyn ConduitHandler>>,
}

type Registries = Mutex<BTreeMap<String, Arc<Mutex<DocumentRegistry>>>>;

static REGISTRIES: OnceLock<Registries> = OnceLock::new();

pub(crate) fn registry_for(doc_id: &str) -> Arc<Mutex<DocumentRegistry>> {
    let registries = REGISTRIES.get_or_init(|| Mutex::new(BTreeMap::new()));
    let mut guard = registries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    guard
        .entry(doc_id.to_owned())
        .or_insert_with(|| Arc::new(Mutex::new(DocumentRegistry::default())))
        .clone()
}
