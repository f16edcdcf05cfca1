//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars};
use crate::probe::ping::SUPERVISORY_GRACE;
use crate::probe::{PingToolConfig, ProbeConfig, ProbeTarget};
use crate::scheduler::ScheduleConfig;

// =============================================================================
// Constants
// =============================================================================

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Default probe target (Cloudflare DNS).
pub const DEFAULT_HOST: &str = "1.1.1.1";

/// Default probe interval (10 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default probe timeout (2 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

// =============================================================================
// Probe Settings
// =============================================================================

/// What to probe and how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Target host; `${VAR:-default}` references are expanded (default: "1.1.1.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Time between ticks (default: 10s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Probe timeout passed to the tool (default: 2s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probe target and timing.
    #[serde(default)]
    pub probe: ProbeSettings,

    /// Probe tool invocation.
    #[serde(default)]
    pub ping: PingToolConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probe = self.probe_config()?;
        let schedule = self.schedule_config()?;
        self.ping.validate()?;

        if probe.timeout + SUPERVISORY_GRACE > schedule.interval() {
            tracing::warn!(
                timeout = ?probe.timeout,
                interval = ?schedule.interval(),
                "Probe may outlast the interval; slow probes will skip ticks"
            );
        }
        Ok(())
    }

    /// Probe configuration with the host's environment references expanded.
    pub fn probe_config(&self) -> Result<ProbeConfig, ConfigError> {
        let target = ProbeTarget::new(expand_env_vars(&self.probe.host))?;
        ProbeConfig::new(target, self.probe.timeout)
    }

    pub fn schedule_config(&self) -> Result<ScheduleConfig, ConfigError> {
        ScheduleConfig::new(self.probe.interval)
    }
}
