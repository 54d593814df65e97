//! Process environment backed configuration store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ConfigStore, ConfigValue, StoreError, validate_name};

/// Configuration store over the process environment.
///
/// Reads see a snapshot of the environment taken at construction, layered
/// under values written through [`set`](ConfigStore::set). Writes land in the
/// overlay only; the real process environment is never mutated. Use
/// [`overlay`](EnvStore::overlay) to export what was written.
pub struct EnvStore {
    snapshot: HashMap<String, String>,
    overlay: RwLock<HashMap<String, ConfigValue>>,
}

impl EnvStore {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit variables (useful in tests).
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            snapshot: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            overlay: RwLock::new(HashMap::new()),
        }
    }

    /// Values written since construction, sorted by name.
    pub fn overlay(&self) -> Result<Vec<(String, ConfigValue)>, StoreError> {
        let overlay = self.overlay.read().map_err(|e| StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        })?;
        let mut entries: Vec<(String, ConfigValue)> = overlay
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

impl std::fmt::Debug for EnvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let overlay = self.overlay.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("EnvStore")
            .field("snapshot_count", &self.snapshot.len())
            .field("overlay_count", &overlay)
            .finish()
    }
}

#[async_trait]
impl ConfigStore for EnvStore {
    async fn get(&self, name: &str) -> Result<Option<ConfigValue>, StoreError> {
        let overlay = self.overlay.read().map_err(|e| StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        })?;
        if let Some(value) = overlay.get(name) {
            return Ok(Some(value.clone()));
        }
        Ok(self.snapshot.get(name).map(ConfigValue::new))
    }

    async fn set(&self, name: &str, value: &ConfigValue) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut overlay = self.overlay.write().map_err(|e| StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        })?;
        overlay.insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let overlay = self.overlay.read().map_err(|e| StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        })?;
        let mut names: Vec<String> = self
            .snapshot
            .keys()
            .chain(overlay.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
