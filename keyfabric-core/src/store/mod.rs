//! Configuration store abstraction.
//!
//! This module provides:
//! - [`ConfigValue`] - A wrapper for configuration values that prevents accidental logging
//! - [`ConfigStore`] - Trait for configuration slot backends
//! - [`MemoryStore`] - In-memory implementation for testing and embedding
//! - [`EnvStore`] - Process environment snapshot with an in-process overlay
//! - [`DotenvStore`] - `KEY=VALUE` file backend
//!
//! The refresh orchestrator only ever calls [`ConfigStore::has`] and
//! [`ConfigStore::set`], and only calls `set` when `has` returned `false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyfabric_core::store::{ConfigStore, ConfigValue, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.set("VITE_GROQ_API_KEY", &ConfigValue::new("gsk-...")).await.unwrap();
//! assert!(store.has("VITE_GROQ_API_KEY").await.unwrap());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

mod dotenv;
mod env;
mod memory;

pub use dotenv::DotenvStore;
pub use env::EnvStore;
pub use memory::MemoryStore;

/// A configuration value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](ConfigValue::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
/// The buffer is zeroed when the value is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ConfigValue(String);

impl ConfigValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First `n` characters followed by `...`, for log lines.
    pub fn preview(&self, n: usize) -> String {
        let head: String = self.0.chars().take(n).collect();
        format!("{}...", head)
    }
}

impl std::fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigValue([REDACTED])")
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ConfigValue {}

/// Error type for configuration store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The name is not a valid configuration variable name.
    #[error("invalid config name: {name:?}")]
    InvalidName { name: String },
}

/// Abstraction over configuration slot backends.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Retrieve a value by name.
    ///
    /// Returns `Ok(None)` if the slot is unset.
    async fn get(&self, name: &str) -> Result<Option<ConfigValue>, StoreError>;

    /// Store a value in the named slot.
    ///
    /// Overwrites any existing value; callers that must not clobber check
    /// [`has`](ConfigStore::has) first.
    async fn set(&self, name: &str, value: &ConfigValue) -> Result<(), StoreError>;

    /// List all set names, sorted.
    async fn list_names(&self) -> Result<Vec<String>, StoreError>;

    /// Check whether the slot is set. Empty values count as unset.
    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .get(name)
            .await?
            .map(|v| !v.expose().is_empty())
            .unwrap_or(false))
    }
}

/// Reject names that cannot be written as `NAME=value` lines.
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('=') || name.contains('\0') || name.contains('\n') {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
