//! In-memory configuration store implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ConfigStore, ConfigValue, StoreError, validate_name};

/// In-memory configuration store for testing and embedding.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryStore {
    data: RwLock<HashMap<String, ConfigValue>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<String, ConfigValue>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.data.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("MemoryStore")
            .field("names_count", &count)
            .finish()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::BackendError {
        message: format!("lock poisoned: {}", e),
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<ConfigValue>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &ConfigValue) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
