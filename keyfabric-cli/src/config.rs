//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use keyfabric_core::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use keyfabric_core::{Backoff, RetryPolicy, ServiceDescriptor, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "keyfabric.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyfabricConfig {
    /// Project tag mixed into every seed. Defaults to "keyfabric".
    #[serde(default)]
    pub namespace: Option<String>,

    /// Host tag override. Falls back to `HOST`/`HOSTNAME`.
    #[serde(default)]
    pub host_tag: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    /// Extra or overriding service descriptors.
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    None,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap for exponential backoff.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    #[serde(default = "default_strategy")]
    pub strategy: BackoffStrategy,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}

fn default_strategy() -> BackoffStrategy {
    BackoffStrategy::Linear
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
            strategy: default_strategy(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        let backoff = match self.strategy {
            BackoffStrategy::None => Backoff::None,
            BackoffStrategy::Linear => Backoff::Linear { base },
            BackoffStrategy::Exponential => Backoff::Exponential {
                base,
                max: self
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(60)),
            },
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Collector URL. Errors go to the log when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sink_timeout_ms() -> u64 {
    5_000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_sink_timeout_ms(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl KeyfabricConfig {
    /// Default registry plus the services declared in the file.
    pub fn registry(&self) -> Result<ServiceRegistry> {
        let mut registry = ServiceRegistry::with_defaults();
        for descriptor in &self.services {
            registry.register(descriptor.clone()).with_context(|| {
                format!(
                    "Invalid service entry {:?} in {:?}",
                    descriptor.name, self.config_path
                )
            })?;
        }
        Ok(registry)
    }
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the platform config directory is
/// tried and a missing file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<KeyfabricConfig> {
    let config_path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file {:?} does not exist", path);
            }
            path.to_path_buf()
        }
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        KeyfabricConfig::default()
    };

    config.config_path = config_path;
    Ok(config)
}

fn parse_config(contents: &str) -> Result<KeyfabricConfig> {
    Ok(toml::from_str(contents)?)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "keyfabric")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfabric_core::Charset;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.namespace.is_none());
        assert!(config.sink.endpoint.is_none());
        assert_eq!(config.retry.to_policy(), RetryPolicy::default());
        assert_eq!(config.sink.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_full_file() {
        let config = parse_config(
            r#"
namespace = "storefront"
host_tag = "ci-runner"

[retry]
max_attempts = 5
base_delay_ms = 200
strategy = "exponential"
max_delay_ms = 1000

[sink]
endpoint = "https://collector.internal/errors"
timeout_ms = 750

[[services]]
name = "shareasale"
config_name = "VITE_SHAREASALE_TOKEN"
shape = { prefix = "sas_", charset = "base36", length = 20 }
"#,
        )
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("storefront"));
        assert_eq!(config.host_tag.as_deref(), Some("ci-runner"));
        assert_eq!(
            config.retry.to_policy(),
            RetryPolicy::new(
                5,
                Backoff::Exponential {
                    base: Duration::from_millis(200),
                    max: Duration::from_millis(1000),
                }
            )
        );
        assert_eq!(config.sink.timeout(), Duration::from_millis(750));

        let registry = config.registry().unwrap();
        let shape = registry.shape_for("shareasale");
        assert_eq!(shape.prefix, "sas_");
        assert_eq!(shape.charset, Charset::Base36);
        assert_eq!(registry.config_name("shareasale"), "VITE_SHAREASALE_TOKEN");
        assert!(registry.contains("infolinks"));
    }

    #[test]
    fn test_invalid_service_entry_is_rejected() {
        let config = parse_config(
            r#"
[[services]]
name = "broken"
config_name = ""
"#,
        )
        .unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_service_reusing_builtin_config_name_is_rejected() {
        let config = parse_config(
            r#"
[[services]]
name = "groq2"
config_name = "VITE_GROQ_API_KEY"
"#,
        )
        .unwrap();
        let err = config.registry().unwrap_err();
        assert!(format!("{:#}", err).contains("already used by groq"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(parse_config("retries = 4").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyfabric.toml");
        std::fs::write(&path, "namespace = \"from-file\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.namespace.as_deref(), Some("from-file"));
        assert_eq!(config.config_path, path);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
