//! Persistence collaborators for stores.
//!
//! A store created with [`StoreOptions::persistence`](super::StoreOptions::persistence)
//! merges whatever `load` returns into its initial state and calls `save`
//! after every mutation. State is stored as JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::error::Result;
use crate::value::{Value, ValueMap};

/// Load/save pair keyed by a storage key.
pub trait Persistence: Send + Sync {
    /// Previously saved state, or `None` if nothing usable is stored.
    fn load(&self, storage_key: &str) -> Option<ValueMap>;

    fn save(&self, storage_key: &str, state: &ValueMap) -> Result<()>;
}

fn encode(state: &ValueMap) -> Result<String> {
    Ok(serde_json::to_string(state)?)
}

fn decode(raw: &str) -> Option<ValueMap> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Map(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(%err, "discarding unreadable persisted state");
            None
        }
    }
}

/// In-process persistence, the moral equivalent of browser local storage.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: DashMap<String, String>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw JSON stored under `storage_key`.
    pub fn raw(&self, storage_key: &str) -> Option<String> {
        self.entries.get(storage_key).map(|e| e.value().clone())
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, storage_key: &str) -> Option<ValueMap> {
        self.entries.get(storage_key).and_then(|raw| decode(raw.value()))
    }

    fn save(&self, storage_key: &str, state: &ValueMap) -> Result<()> {
        self.entries.insert(storage_key.to_string(), encode(state)?);
        Ok(())
    }
}

/// One JSON file per storage key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, storage_key: &str) -> PathBuf {
        let file: String = storage_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self, storage_key: &str) -> Option<ValueMap> {
        match fs::read_to_string(self.path_for(storage_key)) {
            Ok(raw) => decode(&raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                tracing::debug!(%err, storage_key, "failed to read persisted state");
                None
            }
        }
    }

    fn save(&self, storage_key: &str, state: &ValueMap) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(storage_key), encode(state)?)?;
        Ok(())
    }
}
