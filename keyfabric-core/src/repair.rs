//! Environment repair: fill in missing configuration slots.
//!
//! Given the configuration names a deployment requires, find the ones that
//! are unset, map each back to the service whose token shape it takes, and
//! fill exactly those names.

use crate::orchestrator::{RefreshOrchestrator, RefreshReport};
use crate::retry::CancelToken;
use crate::service::{CONFIG_NAME_PREFIX, CONFIG_NAME_SUFFIX, ServiceRegistry};
use crate::sink::ErrorSink;
use crate::store::{ConfigStore, StoreError};

/// Services refreshed by a full run when the caller names none.
pub const DEFAULT_SERVICES: &[&str] = &[
    "infolinks",
    "viglink",
    "adsense",
    "amazon",
    "bscscan",
    "trustwallet",
    "groq",
    "private_key",
];

/// Configuration names a deployment needs before it can start.
pub const DEFAULT_REQUIRED_NAMES: &[&str] = &[
    "VITE_BSC_PRIVATE_KEY",
    "VITE_INFOLINKS_API_KEY",
    "VITE_VIGLINK_API_KEY",
];

/// Required names whose slots are unset, in input order.
pub async fn missing_config_names<S, N>(
    store: &S,
    required: &[N],
) -> Result<Vec<String>, StoreError>
where
    S: ConfigStore + ?Sized,
    N: AsRef<str>,
{
    let mut missing = Vec::new();
    for name in required {
        let name = name.as_ref();
        if !store.has(name).await? && !missing.iter().any(|m: &String| m == name) {
            missing.push(name.to_string());
        }
    }
    Ok(missing)
}

/// Service that fills `config_name`.
///
/// Registered services are found by reverse lookup. Otherwise the name is
/// lowercased and stripped of the `VITE_` prefix and `_API_KEY` suffix.
pub fn service_for_config_name(registry: &ServiceRegistry, config_name: &str) -> String {
    if let Some(service) = registry.service_for_config_name(config_name) {
        return service.to_string();
    }

    let lower = config_name.to_lowercase();
    let prefix = CONFIG_NAME_PREFIX.to_lowercase();
    let suffix = CONFIG_NAME_SUFFIX.to_lowercase();
    let trimmed = lower.strip_prefix(prefix.as_str()).unwrap_or(&lower);
    let trimmed = trimmed.strip_suffix(suffix.as_str()).unwrap_or(trimmed);
    trimmed.to_string()
}

/// Fill every missing required name.
///
/// Each token is applied to the required name itself, so a name outside the
/// `VITE_*_API_KEY` pattern is still set. Returns an empty report when
/// nothing is missing.
pub async fn repair_env<S, K, N>(
    orchestrator: &RefreshOrchestrator<S, K>,
    required: &[N],
    cancel: &CancelToken,
) -> Result<RefreshReport, StoreError>
where
    S: ConfigStore,
    K: ErrorSink,
    N: AsRef<str>,
{
    let missing = missing_config_names(orchestrator.store(), required).await?;
    if missing.is_empty() {
        tracing::info!("All {} required config names are set", required.len());
    } else {
        tracing::warn!("Missing config names: {:?}", missing);
    }

    let registry = orchestrator.synthesizer().registry();
    let targets: Vec<(String, String)> = missing
        .into_iter()
        .map(|name| (service_for_config_name(registry, &name), name))
        .collect();

    Ok(orchestrator.refresh_targets(&targets, cancel).await)
}
