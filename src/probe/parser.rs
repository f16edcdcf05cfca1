//! Latency extraction from probe tool output.

use std::sync::OnceLock;

use regex::Regex;

use super::outcome::{INVALID_LATENCY_REASON, PARSE_FAILURE_REASON, ProbeOutcome};

/// Parse the first `time=<number> ms` token in `output`.
///
/// Only the first match in document order counts, so the per-reply line wins
/// over any trailing statistics summary. Never panics; anything unusable
/// becomes [`ProbeOutcome::Failed`].
///
/// # Examples
///
/// ```
/// use pingers::probe::{ProbeOutcome, parse_latency};
///
/// let out = "64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=42 ms";
/// assert_eq!(parse_latency(out), ProbeOutcome::Success { latency_ms: 42.0 });
/// ```
pub fn parse_latency(output: &str) -> ProbeOutcome {
    static LATENCY_REGEX: OnceLock<Regex> = OnceLock::new();

    let regex = LATENCY_REGEX.get_or_init(|| {
        Regex::new(r"time=(\d+(?:\.\d+)?)\s*ms").expect("failed to compile latency regex")
    });

    let Some(caps) = regex.captures(output) else {
        return ProbeOutcome::failed(PARSE_FAILURE_REASON);
    };

    match caps[1].parse::<f64>() {
        Ok(latency_ms) => ProbeOutcome::success(latency_ms),
        Err(_) => ProbeOutcome::failed(INVALID_LATENCY_REASON),
    }
}
