//! Probe layer.
//!
//! Runs exactly one reachability/latency probe and classifies the result.
//!
//! - [`Prober`]: async capability injected into the scheduler
//! - [`PingProber`]: implementation backed by the system `ping` tool
//! - [`ProbeOutcome`]: closed set of per-probe results
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pingers::probe::{PingProber, ProbeConfig, ProbeTarget, Prober};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProbeConfig::new(ProbeTarget::new("1.1.1.1")?, Duration::from_secs(2))?;
//! let outcome = PingProber::default().probe(&config).await;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

mod outcome;
mod parser;
pub mod ping;
mod traits;

pub use outcome::{INVALID_LATENCY_REASON, PARSE_FAILURE_REASON, ProbeOutcome};
pub use parser::parse_latency;
pub use ping::{PingProber, PingToolConfig, WaitUnit};
pub use traits::{ProbeConfig, ProbeTarget, Prober};
