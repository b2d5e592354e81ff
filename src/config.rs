//! Configuration types for shelf-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`DownloadCoordinator`](crate::DownloadCoordinator)
///
/// Every field has a default, so `Config::default()` is a working setup with
/// the reference values (3 slots, 500 ms tick).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of parts transferring at once, shared by all items (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Interval of the progress watcher tick (default: 500 ms)
    #[serde(default = "default_tick_interval", with = "millis_serde")]
    pub tick_interval: Duration,

    /// How long a final summary stays up before session counters reset (default: 5 s)
    #[serde(default = "default_summary_display_delay", with = "millis_serde")]
    pub summary_display_delay: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Settings for the built-in HTTP transports
    #[serde(default)]
    pub transport: TransportConfig,

    /// Durable queue settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Backoff parameters used by [`BackoffRetry`](crate::retry::BackoffRetry)
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            tick_interval: default_tick_interval(),
            summary_display_delay: default_summary_display_delay(),
            event_buffer: default_event_buffer(),
            transport: TransportConfig::default(),
            persistence: PersistenceConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Check the values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config {
                message: "max_concurrent must be at least 1".to_string(),
                key: Some("max_concurrent".to_string()),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(Error::Config {
                message: "tick_interval must be greater than zero".to_string(),
                key: Some("tick_interval".to_string()),
            });
        }
        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }
        self.retry.validate()
    }
}

/// Settings shared by [`DirectTransport`](crate::transport::DirectTransport)
/// and [`HttpStagingFacility`](crate::transport::HttpStagingFacility)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Where the staging facility writes files before relocation (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP connect timeout (default: 30 s)
    #[serde(default = "default_connect_timeout", with = "millis_serde")]
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Durable queue configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite file holding queued items (default: "./shelf-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Retry configuration for transient part failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per part (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Reject backoff curves that shrink or exceed their own cap
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be a finite number of at least 1.0, got {}",
                    self.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::Config {
                message: "initial_delay must not exceed max_delay".to_string(),
                key: Some("retry.initial_delay".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_summary_display_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_user_agent() -> String {
    format!("shelf-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./shelf-dl.db")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
