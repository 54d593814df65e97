//! Seed derivation and the seeded random stream.
//!
//! This module provides:
//! - [`Seed`] - A reproducible seed derived from a namespace, a UTC day bucket and a host tag
//! - [`SeedFabric`] - Derives seeds and builds streams from them
//! - [`RandomStream`] - A linear congruential generator producing floats in `[0, 1)`
//! - [`Clock`] - Time source, swappable for simulated days in tests
//!
//! # Not a CSPRNG
//!
//! [`RandomStream`] is a plain LCG over 32 bits. Its output is predictable from
//! the seed and must never be used where unpredictability matters.
//!
//! # Example
//!
//! ```
//! use keyfabric_core::seed::SeedFabric;
//!
//! let fabric = SeedFabric::new(Some("build-host".to_string()));
//! let seed = fabric.get_seed(Some("demo"));
//! let mut stream = SeedFabric::seeded_stream(&seed);
//! let x = stream.next_f64();
//! assert!((0.0..1.0).contains(&x));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Namespace used when the caller does not supply one.
pub const DEFAULT_NAMESPACE: &str = "keyfabric";

/// Host tag substituted when no host identifier is available.
pub const FALLBACK_HOST_TAG: &str = "localhost";

/// Seconds in one UTC day bucket.
const SECONDS_PER_DAY: i64 = 86_400;

/// LCG multiplier. `A mod 4 == 1` and an odd increment give full period mod 2^32.
const LCG_MULTIPLIER: u64 = 0x5_DEEC_E66D;
const LCG_INCREMENT: u64 = 0xB;
const LCG_MODULUS: u64 = 1 << 32;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Coarse time bucket that changes once per UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayBucket(pub i64);

impl DayBucket {
    /// Bucket containing the given instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant.timestamp().div_euclid(SECONDS_PER_DAY))
    }
}

impl fmt::Display for DayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque seed string.
///
/// Normally the lowercase hex SHA-256 digest of the seed inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed(String);

impl Seed {
    /// Wrap an existing seed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Static seed used when seed inputs cannot be hashed at all.
    pub fn fallback(instance_id: Option<&str>) -> Self {
        Self(format!("fallback-seed-{}", instance_id.unwrap_or("0000")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds a namespace string from a set of names.
///
/// Names are sorted and concatenated so the result does not depend on the
/// order they were discovered in.
pub struct Namespace;

impl Namespace {
    pub fn from_names<I, S>(names: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names.into_iter().map(|s| s.as_ref().to_string()).collect();
        names.sort();
        names.concat()
    }
}

/// Derives seeds from (namespace, day bucket, host tag).
#[derive(Clone)]
pub struct SeedFabric {
    host_tag: Option<String>,
    clock: Arc<dyn Clock>,
}

impl SeedFabric {
    /// Create a fabric with an explicit host tag and the system clock.
    pub fn new(host_tag: Option<String>) -> Self {
        Self {
            host_tag: host_tag.filter(|t| !t.is_empty()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a fabric whose host tag comes from `HOST`, then `HOSTNAME`.
    pub fn from_env() -> Self {
        let host_tag = std::env::var("HOST")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok());
        Self::new(host_tag)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured host tag, if any.
    pub fn host_tag(&self) -> Option<&str> {
        self.host_tag.as_deref()
    }

    /// Day bucket for the fabric's current time.
    pub fn day_bucket(&self) -> DayBucket {
        DayBucket::at(self.clock.now())
    }

    /// Derive the seed for the current day.
    ///
    /// Never fails: a missing host tag is replaced by [`FALLBACK_HOST_TAG`].
    pub fn get_seed(&self, namespace: Option<&str>) -> Seed {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        let host_tag = match self.host_tag.as_deref() {
            Some(tag) => tag,
            None => {
                tracing::debug!("No host tag available, using fallback '{}'", FALLBACK_HOST_TAG);
                FALLBACK_HOST_TAG
            }
        };
        let bucket = self.day_bucket();

        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(bucket.to_string().as_bytes());
        hasher.update(host_tag.as_bytes());
        Seed(hex::encode(hasher.finalize()))
    }

    /// Build a random stream from a seed.
    ///
    /// The first 16 characters are parsed as a hex `u64`. Unparseable or zero
    /// prefixes start the stream from state `1`.
    pub fn seeded_stream(seed: &Seed) -> RandomStream {
        let prefix: String = seed.as_str().chars().take(16).collect();
        let state = u64::from_str_radix(&prefix, 16)
            .ok()
            .filter(|v| *v != 0)
            .unwrap_or(1);
        RandomStream::new(state)
    }
}

impl fmt::Debug for SeedFabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedFabric")
            .field("host_tag", &self.host_tag)
            .field("day_bucket", &self.day_bucket())
            .finish()
    }
}

/// Deterministic pseudo-random stream over `[0, 1)`.
///
/// `state = (state * A + C) mod 2^32`, yielding `state / 2^32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStream {
    state: u64,
}

impl RandomStream {
    pub fn new(state: u64) -> Self {
        Self { state }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        // Reducing mod 2^32 after wrapping u64 arithmetic is exact because 2^32 divides 2^64.
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT)
            % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }

    /// Next integer in `0..n`. Returns 0 when `n` is 0.
    pub fn next_below(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        let value = (self.next_f64() * n as f64) as u32;
        value.min(n - 1)
    }
}

impl Iterator for RandomStream {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_f64())
    }
}
