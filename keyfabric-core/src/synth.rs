//! Synthetic, service-shaped placeholder tokens.
//!
//! [`CredentialSynthesizer`] renders a [`TokenShape`] from a seeded
//! [`RandomStream`]. The output only *looks* like an API key, client ID or
//! private key. It is not a credential for any real service, it is not
//! secret, and anyone who knows the seed inputs can reproduce it.
//!
//! # Example
//!
//! ```
//! use keyfabric_core::{CredentialSynthesizer, SeedFabric, ServiceRegistry};
//!
//! let synth = CredentialSynthesizer::new(
//!     SeedFabric::new(Some("ci".to_string())),
//!     ServiceRegistry::with_defaults(),
//! );
//! let token = synth.create("infolinks").unwrap();
//! assert!(token.starts_with("il_"));
//! assert_eq!(token.len(), 3 + 16);
//! ```

use std::sync::Arc;
use thiserror::Error;

use crate::seed::{DEFAULT_NAMESPACE, RandomStream, SeedFabric};
use crate::service::{Charset, ServiceRegistry, TokenShape};

/// Error synthesizing a placeholder token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("cannot render token for {service}: {message}")]
    Template { service: String, message: String },
}

/// Builds deterministic placeholder tokens per service.
#[derive(Debug, Clone)]
pub struct CredentialSynthesizer {
    fabric: SeedFabric,
    registry: Arc<ServiceRegistry>,
    project_tag: String,
}

impl CredentialSynthesizer {
    pub fn new(fabric: SeedFabric, registry: ServiceRegistry) -> Self {
        Self {
            fabric,
            registry: Arc::new(registry),
            project_tag: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Namespace seeds with a project tag other than the default.
    pub fn with_project_tag(mut self, tag: impl Into<String>) -> Self {
        self.project_tag = tag.into();
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn fabric(&self) -> &SeedFabric {
        &self.fabric
    }

    /// Create today's placeholder token for a service.
    ///
    /// The result is a pure function of the service name and the seed inputs
    /// (project tag, UTC day, host tag). Unregistered names, the empty name
    /// included, use the generic `{service}_` template.
    ///
    /// Only a malformed shape can fail, and registered shapes are validated.
    pub fn create(&self, service: &str) -> Result<String, SynthesisError> {
        let namespace = format!("{}:{}", self.project_tag, service);
        let seed = self.fabric.get_seed(Some(&namespace));
        let mut stream = SeedFabric::seeded_stream(&seed);

        render(service, &self.registry.shape_for(service), &mut stream)
    }

    /// Configuration variable name the service's token is written to.
    pub fn config_name(&self, service: &str) -> String {
        self.registry.config_name(service)
    }
}

fn render(
    service: &str,
    shape: &TokenShape,
    stream: &mut RandomStream,
) -> Result<String, SynthesisError> {
    if shape.length == 0 {
        return Err(SynthesisError::Template {
            service: service.to_string(),
            message: "token length is zero".to_string(),
        });
    }

    let mut token = String::with_capacity(shape.prefix.len() + shape.length);
    token.push_str(&shape.prefix);

    match shape.charset {
        Charset::Numeric => token.push_str(&numeric_body(service, shape.length, stream)?),
        charset => {
            let alphabet = charset.alphabet();
            for _ in 0..shape.length {
                let index = stream.next_below(alphabet.len() as u32) as usize;
                token.push(alphabet[index] as char);
            }
        }
    }

    Ok(token)
}

/// `floor(r * 9 * 10^(n-1) + 10^(n-1))`: an n-digit number with no leading zero.
fn numeric_body(
    service: &str,
    digits: usize,
    stream: &mut RandomStream,
) -> Result<String, SynthesisError> {
    let exponent = digits.checked_sub(1).and_then(|e| u32::try_from(e).ok());
    let low = exponent.and_then(|e| 10u64.checked_pow(e));
    let low = match low {
        Some(low) if digits <= 18 => low,
        _ => {
            return Err(SynthesisError::Template {
                service: service.to_string(),
                message: format!("numeric length {} out of range", digits),
            });
        }
    };
    let span = low * 9;
    let value = low + ((stream.next_f64() * span as f64) as u64).min(span - 1);
    Ok(value.to_string())
}
