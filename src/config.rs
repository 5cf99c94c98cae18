//! Guard configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::health::HealthCheckConfig;
use crate::monitor::MonitorConfig;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub health: HealthCheckConfig,
    pub monitor: MonitorSettings,
    pub cache: CacheSettings,
}

/// `[monitor]` section; converted into a [`MonitorConfig`] per session
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    pub base_backoff_millis: u64,
    pub timeout_secs: u64,
    pub quiet: bool,
    pub max_concurrency: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            max_retries: defaults.max_retries,
            backoff_multiplier: defaults.backoff_multiplier,
            base_backoff_millis: defaults.base_backoff.as_millis() as u64,
            timeout_secs: defaults.timeout.as_secs(),
            quiet: defaults.quiet,
            max_concurrency: defaults.max_concurrency,
        }
    }
}

impl From<&MonitorSettings> for MonitorConfig {
    fn from(s: &MonitorSettings) -> Self {
        MonitorConfig {
            poll_interval: Duration::from_secs(s.poll_interval_secs),
            max_retries: s.max_retries,
            backoff_multiplier: s.backoff_multiplier,
            base_backoff: Duration::from_millis(s.base_backoff_millis),
            timeout: Duration::from_secs(s.timeout_secs),
            quiet: s.quiet,
            max_concurrency: s.max_concurrency,
        }
    }
}

/// `[cache]` section
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    pub image_ttl_secs: u64,
    pub metrics_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            image_ttl_secs: 300,
            metrics_ttl_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_secs)
    }

    pub fn metrics_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_ttl_secs)
    }
}

impl GuardConfig {
    /// Load from a file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::ConfigError(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::from(&self.monitor)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        if m.poll_interval_secs == 0 {
            return Err(Error::ConfigError("monitor.poll_interval_secs must be positive".into()));
        }
        if m.max_retries == 0 {
            return Err(Error::ConfigError("monitor.max_retries must be at least 1".into()));
        }
        if !m.backoff_multiplier.is_finite() || m.backoff_multiplier < 1.0 {
            return Err(Error::ConfigError(
                "monitor.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        if m.max_concurrency == 0 || self.health.metrics_concurrency == 0 {
            return Err(Error::ConfigError("concurrency limits must be positive".into()));
        }
        Ok(())
    }
}
