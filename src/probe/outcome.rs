//! Classified result of a single probe.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason reported when a successful probe produced no usable latency.
pub const PARSE_FAILURE_REASON: &str = "could not parse latency";

/// Reason reported when a latency token was found but is not a usable number.
pub const INVALID_LATENCY_REASON: &str = "invalid latency value";

/// Outcome of one probe attempt.
///
/// Every probe ends in exactly one of these variants; none of them is fatal and
/// none triggers a retry. The next scheduled tick is the only retry mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Echo reply received.
    Success {
        /// Round-trip time in milliseconds. Always finite and non-negative.
        latency_ms: f64,
    },
    /// No reply within the probe timeout, or the supervisory deadline fired.
    Timeout,
    /// The probe tool reported that the target cannot be routed to.
    Unreachable,
    /// Launch failure, unexpected exit, or unparseable output.
    Failed {
        /// Human-readable, never empty.
        reason: String,
    },
}

impl ProbeOutcome {
    /// Build a `Success`, degrading to `Failed` if the latency is negative or not finite.
    pub fn success(latency_ms: f64) -> Self {
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            Self::Success { latency_ms }
        } else {
            Self::failed(INVALID_LATENCY_REASON)
        }
    }

    /// Build a `Failed` outcome. An empty reason is replaced with a generic one.
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            reason
        };
        Self::Failed { reason }
    }

    /// Only `Success` counts as online.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Latency in milliseconds, if the probe succeeded.
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Self::Success { latency_ms } => Some(*latency_ms),
            _ => None,
        }
    }

    /// Stable lowercase label for logs and structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { latency_ms } => write!(f, "{latency_ms:.0} ms"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Unreachable => write!(f, "Unreachable"),
            Self::Failed { reason } => write!(f, "Failed: {reason}"),
        }
    }
}
