//! Error reporting side channel.
//!
//! The refresh orchestrator reports every failed attempt and every terminal
//! failure to an [`ErrorSink`]. Reporting is best-effort: sink errors are
//! logged locally and never change the outcome of a refresh.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "http-sink")]
mod http;

#[cfg(feature = "http-sink")]
pub use http::HttpSink;

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Operation that failed (e.g. "refresh", "refresh_exhausted").
    pub method: String,

    /// Service being processed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// 1-based attempt number, if the failure belongs to an attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    /// Error message.
    pub error: String,

    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(method: impl Into<String>, error: impl ToString) -> Self {
        Self {
            method: method.into(),
            service: None,
            attempt: None,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Error delivering an event to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink rejected event: {message}")]
    Rejected { message: String },

    #[error("sink transport error: {message}")]
    Transport { message: String },

    #[error("sink timed out")]
    Timeout,
}

/// Destination for error events.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn report(&self, event: &ErrorEvent) -> Result<(), SinkError>;
}

/// Sink that writes events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ErrorSink for TracingSink {
    async fn report(&self, event: &ErrorEvent) -> Result<(), SinkError> {
        tracing::warn!(
            method = %event.method,
            service = event.service.as_deref().unwrap_or("-"),
            attempt = event.attempt.unwrap_or(0),
            "{}",
            event.error
        );
        Ok(())
    }
}

/// Sink that discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ErrorSink for NullSink {
    async fn report(&self, _event: &ErrorEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ErrorEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first.
    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl ErrorSink for MemorySink {
    async fn report(&self, event: &ErrorEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl<T: ErrorSink + ?Sized> ErrorSink for std::sync::Arc<T> {
    async fn report(&self, event: &ErrorEvent) -> Result<(), SinkError> {
        (**self).report(event).await
    }
}
