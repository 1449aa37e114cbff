//! Service configuration
//!
//! Loaded with figment from a TOML file merged with `HEATSRV_`-prefixed
//! environment variables (environment wins). Every field has a default so an
//! empty file is a valid configuration apart from the controller host.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{HeatSrvError, Result};
use crate::protocol::ClientOptions;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatSrvConfig {
    /// Controller connection settings
    pub controller: ControllerConfig,

    /// Poll scheduling and update decision settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// TCP connection settings for the heat pump controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller hostname or IP address
    pub host: String,
    /// Controller TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Attempts per command before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Poll loop and update tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds after which an unchanged field is forwarded again
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Numeric change tolerance, zero means exact comparison
    #[serde(default)]
    pub epsilon: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            epsilon: 0.0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl HeatSrvConfig {
    /// Load from a TOML file merged with `HEATSRV_` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: HeatSrvConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("HEATSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks beyond what serde types enforce.
    pub fn validate(&self) -> Result<()> {
        if self.controller.host.is_empty() {
            return Err(HeatSrvError::config("controller.host must not be empty"));
        }
        if self.poll.interval_secs == 0 {
            return Err(HeatSrvError::config("poll.interval_secs must be positive"));
        }
        if self.poll.heartbeat_secs == 0 {
            return Err(HeatSrvError::config("poll.heartbeat_secs must be positive"));
        }
        if self.poll.epsilon < 0.0 {
            return Err(HeatSrvError::config("poll.epsilon must not be negative"));
        }
        if self.controller.retry_attempts == 0 {
            return Err(HeatSrvError::config(
                "controller.retry_attempts must be positive",
            ));
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            host: self.controller.host.clone(),
            port: self.controller.port,
            connect_timeout: Duration::from_millis(self.controller.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.controller.read_timeout_ms),
            retry_attempts: self.controller.retry_attempts,
            retry_backoff: Duration::from_millis(self.controller.retry_backoff_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.poll.heartbeat_secs)
    }
}

fn default_port() -> u16 {
    8889
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_interval_secs() -> u64 {
    20
}

fn default_heartbeat_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}
