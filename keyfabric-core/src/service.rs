//! Service descriptors and the service registry.
//!
//! This module provides:
//! - [`TokenShape`] - Prefix, charset and length of a synthetic token
//! - [`ServiceDescriptor`] - Token shape plus the configuration variable it fills
//! - [`ServiceRegistry`] - Lookup table from service name to descriptor
//!
//! Dispatch is data-driven: adding a service is a [`ServiceRegistry::register`]
//! call (or a `[[services]]` entry in the CLI config), never a new code branch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Prefix applied to synthesized configuration variable names.
pub const CONFIG_NAME_PREFIX: &str = "VITE_";

/// Suffix applied to synthesized configuration variable names.
pub const CONFIG_NAME_SUFFIX: &str = "_API_KEY";

/// Body length of the generic template used for unknown services.
pub const GENERIC_BODY_LENGTH: usize = 12;

/// Upper bound on a token body length.
pub const MAX_BODY_LENGTH: usize = 256;

/// Alphabet a token body is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    /// `0-9a-f`
    Hex,
    /// `0-9a-z`
    Base36,
    /// `a-z`
    Lowercase,
    /// Decimal digits with a non-zero leading digit, drawn as one number.
    Numeric,
}

impl Charset {
    /// Characters a draw maps onto. `Numeric` is rendered separately.
    pub fn alphabet(&self) -> &'static [u8] {
        match self {
            Self::Hex => b"0123456789abcdef",
            Self::Base36 => b"0123456789abcdefghijklmnopqrstuvwxyz",
            Self::Lowercase => b"abcdefghijklmnopqrstuvwxyz",
            Self::Numeric => b"0123456789",
        }
    }
}

/// Shape of a synthetic token: `prefix` followed by `length` drawn characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenShape {
    #[serde(default)]
    pub prefix: String,
    pub charset: Charset,
    pub length: usize,
}

impl TokenShape {
    pub fn new(prefix: impl Into<String>, charset: Charset, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            charset,
            length,
        }
    }

    /// Generic template: `{service}_` plus 12 lowercase letters.
    pub fn generic(service: &str) -> Self {
        Self::new(format!("{}_", service), Charset::Lowercase, GENERIC_BODY_LENGTH)
    }
}

/// How a service's synthetic token looks and where it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name as callers refer to it (e.g. "infolinks").
    pub name: String,

    /// Token template. `None` selects the generic `{name}_` template.
    #[serde(default)]
    pub shape: Option<TokenShape>,

    /// Configuration variable the token is written to.
    pub config_name: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, shape: TokenShape, config_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Some(shape),
            config_name: config_name.into(),
        }
    }

    /// Descriptor that uses the generic template but a fixed config name.
    pub fn generic(name: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: None,
            config_name: config_name.into(),
        }
    }

    /// The effective token shape.
    pub fn token_shape(&self) -> TokenShape {
        self.shape
            .clone()
            .unwrap_or_else(|| TokenShape::generic(&self.name))
    }
}

/// Error registering a service descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("config name for {service} must not be empty")]
    EmptyConfigName { service: String },

    #[error("token length for {service} must be between 1 and {max}, got {length}")]
    InvalidLength {
        service: String,
        length: usize,
        max: usize,
    },

    #[error("numeric token for {service} cannot exceed 18 digits, got {length}")]
    NumericTooLong { service: String, length: usize },

    #[error("config name {config_name} for {service} is already used by {existing}")]
    DuplicateConfigName {
        service: String,
        config_name: String,
        existing: String,
    },
}

/// Registry of service descriptors.
///
/// # Example
///
/// ```
/// use keyfabric_core::service::ServiceRegistry;
///
/// let registry = ServiceRegistry::with_defaults();
/// assert_eq!(registry.config_name("infolinks"), "VITE_INFOLINKS_API_KEY");
/// assert_eq!(registry.config_name("my-api"), "VITE_MY_API_API_KEY");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Create a registry with the built-in services.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            ServiceDescriptor::new(
                "infolinks",
                TokenShape::new("il_", Charset::Hex, 16),
                "VITE_INFOLINKS_API_KEY",
            ),
            ServiceDescriptor::new(
                "viglink",
                TokenShape::new("vg_", Charset::Hex, 24),
                "VITE_VIGLINK_API_KEY",
            ),
            ServiceDescriptor::new(
                "adsense",
                TokenShape::new("ca-pub-", Charset::Numeric, 10),
                "VITE_ADSENSE_CLIENT_ID",
            ),
            ServiceDescriptor::generic("amazon", "VITE_AMAZON_ASSOCIATE_TAG"),
            ServiceDescriptor::new(
                "bscscan",
                TokenShape::new("X-", Charset::Hex, 32),
                "VITE_BSCSCAN_API_KEY",
            ),
            ServiceDescriptor::new(
                "trustwallet",
                TokenShape::new("tw_", Charset::Hex, 32),
                "VITE_TRUSTWALLET_API_KEY",
            ),
            ServiceDescriptor::new(
                "groq",
                TokenShape::new("gsk-", Charset::Hex, 32),
                "VITE_GROQ_API_KEY",
            ),
            ServiceDescriptor::new(
                "private_key",
                TokenShape::new("0x", Charset::Hex, 64),
                "VITE_BSC_PRIVATE_KEY",
            ),
        ];

        for descriptor in defaults {
            registry.services.insert(descriptor.name.clone(), descriptor);
        }

        registry
    }

    /// Register a descriptor, replacing any existing one with the same name.
    ///
    /// A config name may belong to only one service.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<(), RegistryError> {
        validate(&descriptor)?;
        if let Some(existing) = self.services.values().find(|d| {
            d.config_name == descriptor.config_name && d.name != descriptor.name
        }) {
            return Err(RegistryError::DuplicateConfigName {
                service: descriptor.name.clone(),
                config_name: descriptor.config_name.clone(),
                existing: existing.name.clone(),
            });
        }
        self.services.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Get a descriptor by service name.
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Check if a service is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Token shape for a service, falling back to the generic template.
    pub fn shape_for(&self, name: &str) -> TokenShape {
        self.get(name)
            .map(|d| d.token_shape())
            .unwrap_or_else(|| TokenShape::generic(name))
    }

    /// Configuration variable name for a service.
    ///
    /// Unknown services map to `VITE_{NAME}_API_KEY`, with the name upper-cased
    /// and any character outside `[A-Z0-9_]` replaced by `_`.
    pub fn config_name(&self, name: &str) -> String {
        match self.get(name) {
            Some(descriptor) => descriptor.config_name.clone(),
            None => synthesize_config_name(name),
        }
    }

    /// Reverse lookup: which registered service fills this config name.
    pub fn service_for_config_name(&self, config_name: &str) -> Option<&str> {
        self.services
            .values()
            .find(|d| d.config_name == config_name)
            .map(|d| d.name.as_str())
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn synthesize_config_name(service: &str) -> String {
    let upper: String = service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}{}", CONFIG_NAME_PREFIX, upper, CONFIG_NAME_SUFFIX)
}

fn validate(descriptor: &ServiceDescriptor) -> Result<(), RegistryError> {
    if descriptor.name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if descriptor.config_name.is_empty() {
        return Err(RegistryError::EmptyConfigName {
            service: descriptor.name.clone(),
        });
    }

    let shape = descriptor.token_shape();
    if shape.length == 0 || shape.length > MAX_BODY_LENGTH {
        return Err(RegistryError::InvalidLength {
            service: descriptor.name.clone(),
            length: shape.length,
            max: MAX_BODY_LENGTH,
        });
    }
    // Numeric bodies are drawn as a single f64-scaled integer.
    if shape.charset == Charset::Numeric && shape.length > 18 {
        return Err(RegistryError::NumericTooLong {
            service: descriptor.name.clone(),
            length: shape.length,
        });
    }

    Ok(())
}
