//! Error type for a single refresh attempt.

use thiserror::Error;

use crate::store::StoreError;
use crate::synth::SynthesisError;

/// Failure of a single refresh attempt.
///
/// Both variants feed the orchestrator's retry loop.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Token construction failed.
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Writing the configuration slot failed.
    #[error("apply failed: {0}")]
    Apply(#[from] StoreError),
}
