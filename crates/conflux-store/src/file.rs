//! Whole-document file backend (§4.7), grounded in `tinysync`'s
//! `AbstractFile`/`SafeYamlFile`
//! (`examples/original_source/persistence.py`): load/dump the entire value
//! as one file, re-read on every [`WholeDocumentPersistence::load`].

use conflux_sync::{PersistenceError, WholeDocumentPersistence};
use conflux_value::Value;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// On-disk encoding for a [`FilePersistence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `serde_yaml`, matching `tinysync`'s `SafeYamlFile`.
    Yaml,
    /// `serde_json`.
    Json,
}

impl FileFormat {
    fn extension(self) -> &'static str {
        match self {
            FileFormat::Yaml => "yaml",
            FileFormat::Json => "json",
        }
    }
}

/// Persists the entire document to a single file named `{name}.{ext}`,
/// re-reading it in full on every [`load`](WholeDocumentPersistence::load)
/// (§6 `persist: default`, `persist: explicit`).
pub struct FilePersistence {
    path: PathBuf,
    format: FileFormat,
}

impl FilePersistence {
    /// A file-backed store for `name` under `dir`, encoded per `format`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, name: &str, format: FileFormat) -> Self {
        let path = dir.into().join(format!("{name}.{}", format.extension()));
        Self { path, format }
    }
}

impl WholeDocumentPersistence for FilePersistence {
    fn load(&self) -> Result<Option<Value>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        let value = match self.format {
            FileFormat::Yaml => {
                serde_yaml::from_slice(&bytes).map_err(|e| PersistenceError::Serde(e.to_string()))?
            }
            FileFormat::Json => {
                serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Serde(e.to_string()))?
            }
        };
        Ok(Some(value))
    }

    fn dump(&self, value: &Value) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = match self.format {
            FileFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| PersistenceError::Serde(e.to_string()))?.into_bytes()
            }
            FileFormat::Json => {
                serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Serde(e.to_string()))?
            }
        };
        fs::write(&self.path, bytes)?;
        debug!(path = %self.path.display(), "dumped whole document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn scratch_dir() -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("conflux-store-test-{}-{n}", std::process::id()));
        fs::create_dir_all(&dir).expect("scratch dir creates");
        dir
    }

    #[test]
    fn missing_file_loads_as_none() {
        let store = FilePersistence::new(scratch_dir(), "doc", FileFormat::Yaml);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn yaml_roundtrip() {
        let dir = scratch_dir();
        let store = FilePersistence::new(dir, "doc", FileFormat::Yaml);
        let mut m = indexmap::IndexMap::new();
        m.insert("a".to_owned(), Value::Int(1));
        let value = Value::Map(m);

        store.dump(&value).unwrap();
        assert_eq!(store.load().unwrap(), Some(value));
    }

    #[test]
    fn json_roundtrip() {
        let dir = scratch_dir();
        let store = FilePersistence::new(dir, "doc", FileFormat::Json);
        let value = Value::Seq(vec![Value::Bool(true), Value::Null]);

        store.dump(&value).unwrap();
        assert_eq!(store.load().unwrap(), Some(value));
    }
}
