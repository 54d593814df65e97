//! HTTP error sink.
//!
//! Posts each event as JSON to a collector endpoint:
//!
//! ```json
//! { "action": "log_error", "data": { "method": "...", "error": "...", "timestamp": "..." } }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::{ErrorEvent, ErrorSink, SinkError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct Envelope<'a> {
    action: &'static str,
    data: &'a ErrorEvent,
}

/// Sink that POSTs events to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpSink {
    /// Create a sink for the given endpoint URL.
    pub fn new(endpoint: &str) -> Result<Self, SinkError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a sink whose requests time out after `timeout`.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, SinkError> {
        let endpoint = Url::parse(endpoint).map_err(|e| SinkError::Rejected {
            message: format!("invalid endpoint {:?}: {}", endpoint, e),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SinkError::Rejected {
                message: format!("unsupported scheme: {}", endpoint.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ErrorSink for HttpSink {
    async fn report(&self, event: &ErrorEvent) -> Result<(), SinkError> {
        let envelope = Envelope {
            action: "log_error",
            data: event,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout
                } else {
                    SinkError::Transport {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                message: format!("collector returned {}", status),
            });
        }

        Ok(())
    }
}
