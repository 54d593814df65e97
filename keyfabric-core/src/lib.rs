//! # Keyfabric Core
//!
//! Deterministic placeholder credentials with a self-healing refresh loop.
//!
//! This crate provides:
//! - A seed fabric that derives a per-day seed from a namespace and host tag
//! - A synthesizer that turns a seed into service-shaped placeholder tokens
//! - A refresh orchestrator that applies tokens to a configuration store,
//!   retrying with backoff and never overwriting values that are already set
//!
//! The tokens are cosmetic placeholders. They are not valid credentials for
//! any external service, and the generator is not cryptographically secure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keyfabric_core::{
//!     CredentialSynthesizer, EnvStore, RefreshOrchestrator, SeedFabric,
//!     ServiceRegistry, TracingSink,
//! };
//!
//! async fn fill_placeholders() {
//!     let registry = ServiceRegistry::with_defaults();
//!     let synth = CredentialSynthesizer::new(SeedFabric::from_env(), registry);
//!     let orchestrator = RefreshOrchestrator::new(synth, EnvStore::from_process(), TracingSink);
//!     let report = orchestrator.refresh(&["infolinks", "private_key"]).await;
//!     println!("{} succeeded, {} failed", report.succeeded(), report.failed());
//! }
//! ```

pub mod seed;
pub mod service;
pub mod synth;
pub mod retry;
pub mod store;
pub mod sink;
pub mod orchestrator;
pub mod repair;
pub mod error;

// Re-export commonly used types at crate root
pub use seed::{
    Clock,
    DayBucket,
    FixedClock,
    Namespace,
    RandomStream,
    Seed,
    SeedFabric,
    SystemClock,
};

pub use service::{
    Charset,
    RegistryError,
    ServiceDescriptor,
    ServiceRegistry,
    TokenShape,
};

pub use synth::{
    CredentialSynthesizer,
    SynthesisError,
};

pub use retry::{
    Backoff,
    CancelToken,
    RetryError,
    RetryPolicy,
};

pub use store::{
    ConfigStore,
    ConfigValue,
    DotenvStore,
    EnvStore,
    MemoryStore,
    StoreError,
};

pub use sink::{
    ErrorEvent,
    ErrorSink,
    MemorySink,
    NullSink,
    SinkError,
    TracingSink,
};

#[cfg(feature = "http-sink")]
pub use sink::HttpSink;

pub use orchestrator::{
    CredentialOutcome,
    CredentialResult,
    CredentialStatus,
    RefreshOrchestrator,
    RefreshReport,
    RefreshState,
};

pub use repair::{
    DEFAULT_REQUIRED_NAMES,
    DEFAULT_SERVICES,
};

pub use error::AttemptError;
