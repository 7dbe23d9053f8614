use crate::errors::MgmtError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sampling configuration shared by every statistics registry of one management registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub history_size: usize,
    pub history_interval_ms: u64,
    pub time_to_disable_ms: u64,
    /// Keep every statistic ticking regardless of query activity.
    pub always_on: bool,
    /// Bound on latency events retained per operation source.
    pub latency_window_capacity: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            history_interval_ms: 1_000,
            time_to_disable_ms: 30_000,
            always_on: true,
            latency_window_capacity: 4_096,
        }
    }
}

impl StatisticsConfig {
    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }

    /// Rejects values the sampler cannot work with.
    pub fn validate(&self) -> Result<(), MgmtError> {
        if self.history_size == 0 {
            return Err(MgmtError::InvalidConfig("history_size must be > 0".into()));
        }
        if self.history_interval_ms == 0 {
            return Err(MgmtError::InvalidConfig("history_interval_ms must be > 0".into()));
        }
        if self.time_to_disable_ms == 0 {
            return Err(MgmtError::InvalidConfig("time_to_disable_ms must be > 0".into()));
        }
        if self.latency_window_capacity == 0 {
            return Err(MgmtError::InvalidConfig("latency_window_capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// Top-level configuration of a [`crate::management::ManagementRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    pub cache_manager_name: String,
    pub statistics: StatisticsConfig,
    pub scheduler_threads: usize,
    /// Pending notification count at which the channel starts warning.
    pub notification_warn_threshold: usize,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            cache_manager_name: "cache-manager".to_string(),
            statistics: StatisticsConfig::default(),
            scheduler_threads: 1,
            notification_warn_threshold: 1_024,
        }
    }
}

impl ManagementConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, MgmtError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MgmtError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MgmtError::Io(format!("Failed to read config file: {e}")))?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from environment variables if present:
    /// - TIERMON_HISTORY_SIZE
    /// - TIERMON_HISTORY_INTERVAL_MS
    pub fn apply_env(&mut self) {
        if let Some(size) =
            std::env::var("TIERMON_HISTORY_SIZE").ok().and_then(|s| s.parse::<usize>().ok())
        {
            self.statistics.history_size = size.max(1);
        }
        if let Some(ms) =
            std::env::var("TIERMON_HISTORY_INTERVAL_MS").ok().and_then(|s| s.parse::<u64>().ok())
        {
            self.statistics.history_interval_ms = ms.max(1);
        }
    }

    pub fn validate(&self) -> Result<(), MgmtError> {
        if self.scheduler_threads == 0 {
            return Err(MgmtError::InvalidConfig("scheduler_threads must be > 0".into()));
        }
        if self.notification_warn_threshold == 0 {
            return Err(MgmtError::InvalidConfig(
                "notification_warn_threshold must be > 0".into(),
            ));
        }
        self.statistics.validate()
    }
}
