//! Run configuration.
//!
//! [`AuditConfig`] is the operator-facing form (TOML file, CLI overrides).
//! [`AuditConfig::validate`] turns it into the [`AuditOptions`] the
//! coordinator and workers consume.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::domain::ConfigError;

/// Command used to retrieve the BGP configuration.
pub const DEFAULT_FETCH_COMMAND: &str = "show running-config router bgp";

/// Default report path, appended to on every run.
pub const DEFAULT_REPORT_PATH: &str = "recommendations.txt";

/// Operator-facing run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Inventory file (TOML or JSON).
    pub inventory: Option<PathBuf>,
    /// Rule file; the built-in rule set is used when absent.
    pub rules: Option<PathBuf>,
    pub report: PathBuf,
    /// Directory for raw configuration snapshots; disabled when absent.
    pub snapshot_dir: Option<PathBuf>,
    pub max_parallel: usize,
    /// Bounds each individual connect and fetch call.
    pub device_timeout_secs: u64,
    /// Bounds the whole run; unbounded when absent.
    pub run_timeout_secs: Option<u64>,
    /// Time in-flight workers get to release their session after cancellation.
    pub grace_period_secs: u64,
    /// Extra connect attempts after a timeout or transport error.
    pub connect_retries: u32,
    /// Base delay for exponential backoff between connect attempts.
    pub retry_backoff_ms: u64,
    pub fetch_command: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            inventory: None,
            rules: None,
            report: PathBuf::from(DEFAULT_REPORT_PATH),
            snapshot_dir: None,
            max_parallel: 5,
            device_timeout_secs: 30,
            run_timeout_secs: None,
            grace_period_secs: 5,
            connect_retries: 0,
            retry_backoff_ms: 500,
            fetch_command: DEFAULT_FETCH_COMMAND.to_string(),
        }
    }
}

impl AuditConfig {
    /// Load a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Check every option and produce runtime options.
    pub fn validate(&self) -> Result<AuditOptions, ConfigError> {
        let invalid = |option: &str, reason: &str| ConfigError::InvalidOption {
            option: option.to_string(),
            reason: reason.to_string(),
        };

        if self.max_parallel == 0 {
            return Err(invalid("max_parallel", "must be at least 1"));
        }
        if self.max_parallel > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidOption {
                option: "max_parallel".to_string(),
                reason: format!("must be at most {}", Semaphore::MAX_PERMITS),
            });
        }
        if self.device_timeout_secs == 0 {
            return Err(invalid("device_timeout_secs", "must be greater than 0"));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(invalid("run_timeout_secs", "must be greater than 0"));
        }
        if self.fetch_command.trim().is_empty() {
            return Err(invalid("fetch_command", "must not be empty"));
        }
        if self.report.as_os_str().is_empty() {
            return Err(invalid("report", "must not be empty"));
        }

        Ok(AuditOptions {
            max_parallel: self.max_parallel,
            device_timeout: Duration::from_secs(self.device_timeout_secs),
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            grace_period: Duration::from_secs(self.grace_period_secs),
            connect_retries: self.connect_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            fetch_command: self.fetch_command.trim().to_string(),
        })
    }
}

/// Validated runtime options shared by the coordinator and its workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    pub max_parallel: usize,
    pub device_timeout: Duration,
    pub run_timeout: Option<Duration>,
    pub grace_period: Duration,
    pub connect_retries: u32,
    pub retry_backoff: Duration,
    pub fetch_command: String,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            device_timeout: Duration::from_secs(30),
            run_timeout: None,
            grace_period: Duration::from_secs(5),
            connect_retries: 0,
            retry_backoff: Duration::from_millis(500),
            fetch_command: DEFAULT_FETCH_COMMAND.to_string(),
        }
    }
}
