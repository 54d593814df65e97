//! Refresh orchestration.
//!
//! [`RefreshOrchestrator`] is the composition root callers invoke. For each
//! requested service it synthesizes a placeholder token and applies it to the
//! configuration store, retrying failures under a [`RetryPolicy`].
//!
//! # Guarantees
//!
//! - Services are processed sequentially, in request order.
//! - A configuration slot that is already set is never overwritten.
//! - One service failing never stops the others.
//! - [`refresh`](RefreshOrchestrator::refresh) never fails; the report has
//!   exactly one entry per distinct requested name.
//! - Concurrent calls on one orchestrator are serialized (single flight).
//!
//! # Per-service state machine
//!
//! ```text
//! Pending -> Attempting -> Success
//!                \-> RetryWait -> Attempting -> ... -> Exhausted
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use keyfabric_core::{
//!     CredentialSynthesizer, MemoryStore, RefreshOrchestrator, SeedFabric,
//!     ServiceRegistry, TracingSink,
//! };
//!
//! let registry = ServiceRegistry::with_defaults();
//! let synth = CredentialSynthesizer::new(SeedFabric::from_env(), registry);
//! let orchestrator = RefreshOrchestrator::new(synth, MemoryStore::new(), TracingSink);
//!
//! let report = orchestrator.refresh(&["infolinks", "viglink"]).await;
//! for (service, result) in &report.results {
//!     println!("{}: {:?}", service, result.status());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AttemptError;
use crate::retry::{Attempted, CancelToken, RetryError, RetryPolicy};
use crate::sink::{ErrorEvent, ErrorSink};
use crate::store::{ConfigStore, ConfigValue};
use crate::synth::CredentialSynthesizer;

/// Default upper bound on a single error-sink report.
const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Message recorded for services interrupted by cancellation.
pub const CANCELLED_MESSAGE: &str = "refresh cancelled";

/// Position of one service in the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Pending,
    Attempting { attempt: u32 },
    RetryWait { attempt: u32 },
    Success,
    Exhausted,
    Cancelled,
}

impl RefreshState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Exhausted | Self::Cancelled)
    }
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Attempting { attempt } => write!(f, "attempting({})", attempt),
            Self::RetryWait { attempt } => write!(f, "retry_wait({})", attempt),
            Self::Success => write!(f, "success"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

fn transition(service: &str, from: RefreshState, to: RefreshState) {
    tracing::debug!(service, %from, %to, "refresh state");
}

/// Coarse status of a [`CredentialResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Success,
    Error,
}

/// What happened to one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CredentialOutcome {
    /// A token was synthesized. `applied` is `false` when the slot was
    /// already set and left untouched.
    Success { value: ConfigValue, applied: bool },

    /// Retries were exhausted or the refresh was cancelled.
    Error { error: String },
}

/// Result of refreshing one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialResult {
    pub service: String,
    pub config_name: String,
    #[serde(flatten)]
    pub outcome: CredentialOutcome,
    /// Attempts made; 0 when cancelled before the first attempt.
    pub attempts: u32,
    pub state: RefreshState,
    pub generated_at: DateTime<Utc>,
}

impl CredentialResult {
    pub fn status(&self) -> CredentialStatus {
        match self.outcome {
            CredentialOutcome::Success { .. } => CredentialStatus::Success,
            CredentialOutcome::Error { .. } => CredentialStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == CredentialStatus::Success
    }

    /// Synthesized value on success.
    pub fn value(&self) -> Option<&ConfigValue> {
        match &self.outcome {
            CredentialOutcome::Success { value, .. } => Some(value),
            CredentialOutcome::Error { .. } => None,
        }
    }

    /// Error detail on failure.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CredentialOutcome::Success { .. } => None,
            CredentialOutcome::Error { error } => Some(error),
        }
    }
}

/// Aggregate result of one refresh call.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub results: BTreeMap<String, CredentialResult>,
}

impl RefreshReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            results: BTreeMap::new(),
        }
    }

    pub fn get(&self, service: &str) -> Option<&CredentialResult> {
        self.results.get(service)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// Sequential, retrying, no-clobber refresh of placeholder credentials.
pub struct RefreshOrchestrator<S, K> {
    synth: CredentialSynthesizer,
    store: S,
    sink: K,
    policy: RetryPolicy,
    sink_timeout: Duration,
    flight: Mutex<()>,
}

impl<S: ConfigStore, K: ErrorSink> RefreshOrchestrator<S, K> {
    /// Create an orchestrator with the default policy (3 attempts, 1s linear backoff).
    pub fn new(synth: CredentialSynthesizer, store: S, sink: K) -> Self {
        Self {
            synth,
            store,
            sink,
            policy: RetryPolicy::default(),
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            flight: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound how long a single error report may take.
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn synthesizer(&self) -> &CredentialSynthesizer {
        &self.synth
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Refresh the given services.
    pub async fn refresh<N: AsRef<str>>(&self, services: &[N]) -> RefreshReport {
        self.refresh_with_cancel(services, &CancelToken::new()).await
    }

    /// Refresh the given services, stopping early if `cancel` fires.
    ///
    /// Services not finished when cancellation is observed are reported as
    /// errors with [`CANCELLED_MESSAGE`].
    pub async fn refresh_with_cancel<N: AsRef<str>>(
        &self,
        services: &[N],
        cancel: &CancelToken,
    ) -> RefreshReport {
        let targets: Vec<(String, String)> = services
            .iter()
            .map(|s| (s.as_ref().to_string(), self.synth.config_name(s.as_ref())))
            .collect();
        self.refresh_targets(&targets, cancel).await
    }

    /// Refresh explicit `(service, config name)` pairs.
    ///
    /// Each token is synthesized from the service name and applied to the
    /// paired config name, whatever the registry maps the service to. The
    /// report is keyed by service; a repeated service keeps its first pair.
    pub async fn refresh_targets(
        &self,
        targets: &[(String, String)],
        cancel: &CancelToken,
    ) -> RefreshReport {
        let _flight = self.flight.lock().await;
        let mut report = RefreshReport::new();

        tracing::info!(
            run_id = %report.run_id,
            "Refreshing {} service(s)",
            targets.len()
        );

        for (service, config_name) in targets {
            if report.results.contains_key(service) {
                continue;
            }
            let result = self.refresh_one(service, config_name, cancel).await;
            report.results.insert(service.clone(), result);
        }

        tracing::info!(
            run_id = %report.run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Refresh completed"
        );

        report
    }

    async fn refresh_one(
        &self,
        service: &str,
        config_name: &str,
        cancel: &CancelToken,
    ) -> CredentialResult {
        let max_attempts = self.policy.max_attempts.max(1);

        let outcome = self
            .policy
            .run(cancel, |attempt| async move {
                let from = if attempt == 1 {
                    RefreshState::Pending
                } else {
                    RefreshState::RetryWait { attempt: attempt - 1 }
                };
                transition(service, from, RefreshState::Attempting { attempt });

                match self.attempt(service, config_name).await {
                    Ok(applied) => Ok(applied),
                    Err(e) => {
                        tracing::warn!(
                            "Refresh failed for {} (attempt {}/{}): {}",
                            service,
                            attempt,
                            max_attempts,
                            e
                        );
                        let event = ErrorEvent::new("refresh", &e)
                            .with_service(service)
                            .with_attempt(attempt);
                        self.report(&event).await;
                        if attempt < max_attempts {
                            transition(
                                service,
                                RefreshState::Attempting { attempt },
                                RefreshState::RetryWait { attempt },
                            );
                        }
                        Err(e)
                    }
                }
            })
            .await;

        let (outcome, attempts, state) = match outcome {
            Ok(Attempted {
                value: (value, applied),
                attempts,
            }) => (
                CredentialOutcome::Success { value, applied },
                attempts,
                RefreshState::Success,
            ),
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!(
                    "Giving up on {} after {} attempts: {}",
                    service,
                    attempts,
                    last
                );
                let event = ErrorEvent::new("refresh_exhausted", &last)
                    .with_service(service)
                    .with_attempt(attempts);
                self.report(&event).await;
                (
                    CredentialOutcome::Error {
                        error: last.to_string(),
                    },
                    attempts,
                    RefreshState::Exhausted,
                )
            }
            Err(RetryError::Cancelled { attempts, .. }) => {
                tracing::info!("Refresh of {} cancelled after {} attempts", service, attempts);
                (
                    CredentialOutcome::Error {
                        error: CANCELLED_MESSAGE.to_string(),
                    },
                    attempts,
                    RefreshState::Cancelled,
                )
            }
        };

        let from = match (state, attempts) {
            (_, 0) => RefreshState::Pending,
            (RefreshState::Cancelled, n) => RefreshState::RetryWait { attempt: n },
            (_, n) => RefreshState::Attempting { attempt: n },
        };
        transition(service, from, state);

        CredentialResult {
            service: service.to_string(),
            config_name: config_name.to_string(),
            outcome,
            attempts,
            state,
            generated_at: Utc::now(),
        }
    }

    /// One attempt: synthesize, then set the slot only if it is unset.
    async fn attempt(
        &self,
        service: &str,
        config_name: &str,
    ) -> Result<(ConfigValue, bool), AttemptError> {
        let value = ConfigValue::new(self.synth.create(service)?);

        if self.store.has(config_name).await? {
            tracing::debug!("{} already set, leaving it untouched", config_name);
            return Ok((value, false));
        }

        self.store.set(config_name, &value).await?;
        tracing::info!(
            "Applied placeholder {} = {}",
            config_name,
            value.preview(10)
        );
        Ok((value, true))
    }

    /// Best-effort delivery to the error sink; failures are only logged.
    async fn report(&self, event: &ErrorEvent) {
        match tokio::time::timeout(self.sink_timeout, self.sink.report(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to report error event: {}", e),
            Err(_) => tracing::warn!(
                "Error sink did not respond within {:?}, dropping event",
                self.sink_timeout
            ),
        }
    }
}

impl<S, K> fmt::Debug for RefreshOrchestrator<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("policy", &self.policy)
            .field("sink_timeout", &self.sink_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use crate::seed::SeedFabric;
    use crate::service::ServiceRegistry;
    use crate::sink::{MemorySink, NullSink, SinkError};
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;

    fn synth() -> CredentialSynthesizer {
        CredentialSynthesizer::new(
            SeedFabric::new(Some("unit".to_string())),
            ServiceRegistry::with_defaults(),
        )
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Backoff::None)
    }

    struct BrokenSink;

    #[async_trait]
    impl ErrorSink for BrokenSink {
        async fn report(&self, _event: &ErrorEvent) -> Result<(), SinkError> {
            Err(SinkError::Transport {
                message: "collector down".to_string(),
            })
        }
    }

    struct HangingSink;

    #[async_trait]
    impl ErrorSink for HangingSink {
        async fn report(&self, _event: &ErrorEvent) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Store that rejects every write to one name.
    struct RejectingStore {
        inner: MemoryStore,
        rejected: &'static str,
    }

    impl RejectingStore {
        fn new(rejected: &'static str) -> Self {
            Self {
                inner: MemoryStore::new(),
                rejected,
            }
        }
    }

    #[async_trait]
    impl ConfigStore for RejectingStore {
        async fn get(&self, name: &str) -> Result<Option<ConfigValue>, StoreError> {
            self.inner.get(name).await
        }

        async fn set(&self, name: &str, value: &ConfigValue) -> Result<(), StoreError> {
            if name == self.rejected {
                return Err(StoreError::BackendError {
                    message: format!("{} is locked", name),
                });
            }
            self.inner.set(name, value).await
        }

        async fn list_names(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_names().await
        }
    }

    #[tokio::test]
    async fn test_refresh_empty_input() {
        let orchestrator = RefreshOrchestrator::new(synth(), MemoryStore::new(), NullSink);
        let empty: [&str; 0] = [];
        let report = orchestrator.refresh(&empty).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_applies_and_reports_success() {
        let orchestrator = RefreshOrchestrator::new(synth(), MemoryStore::new(), NullSink);
        let report = orchestrator.refresh(&["groq"]).await;

        let result = report.get("groq").unwrap();
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.state, RefreshState::Success);
        assert_eq!(result.config_name, "VITE_GROQ_API_KEY");
        assert_eq!(
            result.outcome,
            CredentialOutcome::Success {
                value: orchestrator.store().get("VITE_GROQ_API_KEY").await.unwrap().unwrap(),
                applied: true,
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_write_exhausts() {
        let sink = std::sync::Arc::new(MemorySink::new());
        let store = RejectingStore::new("VITE_GROQ_API_KEY");
        let orchestrator =
            RefreshOrchestrator::new(synth(), store, sink.clone()).with_policy(fast_policy());

        let report = orchestrator.refresh(&["groq"]).await;
        let result = report.get("groq").unwrap();
        assert_eq!(result.status(), CredentialStatus::Error);
        assert_eq!(result.state, RefreshState::Exhausted);
        assert_eq!(result.attempts, 3);
        assert!(result.error().unwrap().contains("VITE_GROQ_API_KEY is locked"));
        // Three attempt failures plus the terminal event.
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.events()[3].method, "refresh_exhausted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_service_name_succeeds_first_try() {
        let sink = std::sync::Arc::new(MemorySink::new());
        let orchestrator = RefreshOrchestrator::new(synth(), MemoryStore::new(), sink.clone());
        let start = tokio::time::Instant::now();

        let report = orchestrator.refresh(&[""]).await;

        let result = report.get("").unwrap();
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.config_name, "VITE__API_KEY");
        assert!(result.value().unwrap().expose().starts_with('_'));
        assert!(sink.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_broken_sink_does_not_affect_outcome() {
        let store = RejectingStore::new("VITE_VIGLINK_API_KEY");
        let orchestrator =
            RefreshOrchestrator::new(synth(), store, BrokenSink).with_policy(fast_policy());
        let report = orchestrator.refresh(&["viglink", "groq"]).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_sink_is_bounded() {
        let store = RejectingStore::new("VITE_GROQ_API_KEY");
        let orchestrator = RefreshOrchestrator::new(synth(), store, HangingSink)
            .with_policy(RetryPolicy::new(1, Backoff::None))
            .with_sink_timeout(Duration::from_millis(50));
        let report = orchestrator.refresh(&["groq"]).await;
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_refresh_targets_applies_paired_name() {
        let orchestrator = RefreshOrchestrator::new(synth(), MemoryStore::new(), NullSink);
        let targets = vec![("custom_token".to_string(), "CUSTOM_TOKEN".to_string())];

        let report = orchestrator.refresh_targets(&targets, &CancelToken::new()).await;

        let result = report.get("custom_token").unwrap();
        assert!(result.is_success());
        assert_eq!(result.config_name, "CUSTOM_TOKEN");
        assert_eq!(
            orchestrator.store().list_names().await.unwrap(),
            vec!["CUSTOM_TOKEN"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_covers_all_services() {
        let orchestrator = RefreshOrchestrator::new(synth(), MemoryStore::new(), NullSink);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = orchestrator
            .refresh_with_cancel(&["infolinks", "viglink"], &cancel)
            .await;

        assert_eq!(report.len(), 2);
        for result in report.results.values() {
            assert_eq!(result.error(), Some(CANCELLED_MESSAGE));
            assert_eq!(result.attempts, 0);
            assert_eq!(result.state, RefreshState::Cancelled);
        }
        assert!(orchestrator.store().list_names().await.unwrap().is_empty());
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let result = CredentialResult {
            service: "groq".to_string(),
            config_name: "VITE_GROQ_API_KEY".to_string(),
            outcome: CredentialOutcome::Error {
                error: "boom".to_string(),
            },
            attempts: 3,
            state: RefreshState::Exhausted,
            generated_at: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["state"], "exhausted");
    }

    #[test]
    fn test_terminal_states() {
        assert!(RefreshState::Success.is_terminal());
        assert!(RefreshState::Exhausted.is_terminal());
        assert!(!RefreshState::RetryWait { attempt: 1 }.is_terminal());
        assert_eq!(RefreshState::Attempting { attempt: 2 }.to_string(), "attempting(2)");
    }
}
