//! Pingers - periodic reachability and latency probing
//!
//! This crate measures round-trip latency to a configurable host on a fixed
//! interval and hands each classified result to a consumer. It can be used as a
//! library, or run as a standalone binary with the `pingers` executable.
//!
//! # Architecture
//!
//! - **Probe**: one-shot invocation of the system `ping` with a supervisory deadline
//! - **Scheduler**: cancellable, reconfigurable timer delivering one outcome per tick
//! - **History**: last five outcomes with capture timestamps
//! - **Config**: YAML configuration with environment expansion
//!
//! # Example
//!
//! ```rust,no_run
//! use pingers::{AppConfig, PingProber, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load_or_default("configs/config.yaml")?;
//!     let prober = PingProber::new(config.ping.clone());
//!     let mut scheduler = Scheduler::new(
//!         prober,
//!         config.probe_config()?,
//!         config.schedule_config()?,
//!         |outcome| println!("{outcome}"),
//!     );
//!     scheduler.start();
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod history;
pub mod probe;
pub mod scheduler;

pub use config::{AppConfig, ConfigError};
pub use history::{HISTORY_CAPACITY, HistoryEntry, HistoryRing};
pub use probe::{PingProber, PingToolConfig, ProbeConfig, ProbeOutcome, ProbeTarget, Prober};
pub use scheduler::{ConfigUpdate, ScheduleConfig, Scheduler, SchedulerState};
