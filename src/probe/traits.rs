//! Core probe traits and types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProbeOutcome;
use crate::config::ConfigError;

/// Host identifier handed to the probe tool.
///
/// Hostname or literal address. Only emptiness is checked here; anything else
/// is left to the tool to reject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProbeTarget(String);

impl ProbeTarget {
    /// Create a target from a non-empty host string.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the host is empty or whitespace.
    pub fn new(host: impl Into<String>) -> Result<Self, ConfigError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::ValidationError(
                "probe target must not be empty".to_string(),
            ));
        }
        Ok(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProbeTarget {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProbeTarget> for String {
    fn from(value: ProbeTarget) -> Self {
        value.0
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable per-probe configuration.
///
/// Each probe captures the value current at its launch; replacing it never
/// affects a probe already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Host to probe.
    pub target: ProbeTarget,
    /// Wait bound passed to the tool. The supervisory deadline adds one second.
    pub timeout: Duration,
}

impl ProbeConfig {
    /// Create a probe configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the timeout is zero.
    pub fn new(target: ProbeTarget, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "probe timeout must be positive".to_string(),
            ));
        }
        Ok(Self { target, timeout })
    }
}

/// Capability to run exactly one probe.
///
/// Implementations never fail outward: launch errors, bad exits and parse
/// failures are all reported as [`ProbeOutcome`] variants. The scheduler only
/// depends on this trait, so tests substitute scripted fakes for the real tool.
#[async_trait::async_trait]
pub trait Prober: Send + Sync + 'static {
    /// Run one probe against `config.target`, bounded by `config.timeout`.
    async fn probe(&self, config: &ProbeConfig) -> ProbeOutcome;
}

#[async_trait::async_trait]
impl<P: Prober + ?Sized> Prober for Arc<P> {
    async fn probe(&self, config: &ProbeConfig) -> ProbeOutcome {
        (**self).probe(config).await
    }
}
