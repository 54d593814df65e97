//! Bounded retry with backoff, and cooperative cancellation.
//!
//! [`RetryPolicy::run`] drives an async operation up to `max_attempts` times,
//! sleeping [`Backoff::delay`] between failed attempts. Sleeps race a
//! [`CancelToken`] so a long backoff sequence can be aborted on shutdown.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Default number of attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default linear backoff step.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately.
    None,

    /// `base * attempt`.
    Linear {
        #[serde(with = "duration_ms")]
        base: Duration,
    },

    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        #[serde(with = "duration_ms")]
        base: Duration,
        #[serde(with = "duration_ms")]
        max: Duration,
    },
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: DEFAULT_BASE_DELAY,
        }
    }
}

/// Serialize durations as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// A value produced by a retried operation, with the attempt it succeeded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The cancel token fired before the operation succeeded.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Bounded-attempt retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(flatten)]
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, attempts run out, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. No delay follows the final
    /// attempt. A token cancelled before the first attempt yields
    /// `Cancelled { attempts: 0, .. }` without calling `op`.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        let mut last = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last,
                });
            }

            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempts: attempt }),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => last = Some(e),
            }

            let delay = self.backoff.delay(attempt);
            tracing::debug!("Attempt {} failed, retrying in {:?}", attempt, delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
            }
        }
    }
}

/// Cooperative cancellation signal.
///
/// Clones share the same signal. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal cancellation to every clone.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](CancelToken::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender is owned by self, so this only happens during teardown.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
