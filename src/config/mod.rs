//! Configuration module for pingers.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Probe settings (target host, interval, timeout)
//! - Probe tool invocation (program, extra arguments, wait unit, exit codes)

mod app;
mod validation;

pub use app::{AppConfig, ProbeSettings};
pub use validation::{ConfigError, expand_env_vars, parse_duration, parse_positive_duration};

// Re-export constants
pub use app::{DEFAULT_CONFIG_PATH, DEFAULT_HOST, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
