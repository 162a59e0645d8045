//! Configuration structures for media usage tracking.
//!
//! - [`ScanConfig`] - Reference scanner settings (storage namespace, resource kind)
//! - [`JobConfig`] - Batch job settings (chunking, pacing, estimates, cancellation)
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a config file only needs the fields it overrides.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default namespace for every key the core writes to the key/value store.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "media_usage";

/// Default kind of resource managed by batch jobs.
pub const DEFAULT_RESOURCE_KIND: &str = "attachment";

/// Default number of queue entries processed between cancellation checks.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Default calibration constant for the remaining-time estimate.
pub const DEFAULT_SECONDS_PER_ITEM: f64 = 0.5;

/// Configuration for the reference scanner.
///
/// # Examples
///
/// ```
/// use mu_core::ScanConfig;
///
/// let config = ScanConfig::default();
/// assert_eq!(config.storage_namespace, "media_usage");
/// assert!(config.is_own_setting("media_usage:record:12"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Prefix for all persisted keys.
    ///
    /// Global settings whose name starts with this prefix are never reported
    /// as references, since they are the cache itself.
    pub storage_namespace: String,

    /// The kind of resource enumerated by batch jobs.
    pub resource_kind: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_owned(),
            resource_kind: DEFAULT_RESOURCE_KIND.to_owned(),
        }
    }
}

impl ScanConfig {
    /// Returns `true` if a global setting with this name belongs to our own storage.
    #[must_use]
    pub fn is_own_setting(&self, name: &str) -> bool {
        name.starts_with(self.storage_namespace.as_str())
    }

    /// Sets the storage namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }
}

/// Configuration for batch jobs.
///
/// # Examples
///
/// ```
/// use mu_core::JobConfig;
///
/// let config = JobConfig::default().with_chunk_size(10);
/// assert_eq!(config.chunk_size, 10);
/// assert_eq!(config.chunk_delay_ms, 250);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Entries processed together before the worker pauses.
    pub chunk_size: usize,

    /// Pause between chunks in milliseconds.
    pub chunk_delay_ms: u64,

    /// Seconds of work assumed per pending entry when estimating time remaining.
    pub seconds_per_item: f64,

    /// Interval at which a cancel request polls for the worker to stop.
    pub cancel_poll_interval_ms: u64,

    /// Upper bound on how long a cancel request waits for the worker.
    pub cancel_timeout_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay_ms: 250,
            seconds_per_item: DEFAULT_SECONDS_PER_ITEM,
            cancel_poll_interval_ms: 100,
            cancel_timeout_ms: 10_000,
        }
    }
}

impl JobConfig {
    /// Sets the chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the pause between chunks.
    #[must_use]
    pub const fn with_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = ms;
        self
    }

    /// Sets the seconds-per-item calibration constant.
    #[must_use]
    pub const fn with_seconds_per_item(mut self, seconds: f64) -> Self {
        self.seconds_per_item = seconds;
        self
    }

    /// Sets the cancel poll interval and timeout.
    #[must_use]
    pub const fn with_cancel_wait(mut self, poll_ms: u64, timeout_ms: u64) -> Self {
        self.cancel_poll_interval_ms = poll_ms;
        self.cancel_timeout_ms = timeout_ms;
        self
    }

    /// Pause between chunks.
    #[inline]
    #[must_use]
    pub const fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// Interval between cancel polls.
    #[inline]
    #[must_use]
    pub const fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }

    /// Upper bound on a cancel wait.
    #[inline]
    #[must_use]
    pub const fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use mu_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"jobs": {"chunk_size": 5}}"#).unwrap();
/// assert_eq!(config.jobs.chunk_size, 5);
/// assert_eq!(config.scan.resource_kind, "attachment");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanner configuration.
    pub scan: ScanConfig,

    /// Batch job configuration.
    pub jobs: JobConfig,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option values that deserialization alone cannot reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.chunk_size == 0 {
            return Err(ConfigError::invalid_option(
                "jobs.chunk_size",
                "must be at least 1",
            ));
        }
        if !self.jobs.seconds_per_item.is_finite() || self.jobs.seconds_per_item <= 0.0 {
            return Err(ConfigError::invalid_option(
                "jobs.seconds_per_item",
                "must be a positive number",
            ));
        }
        if self.scan.storage_namespace.is_empty() {
            return Err(ConfigError::invalid_option(
                "scan.storage_namespace",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.storage_namespace, "media_usage");
        assert_eq!(config.resource_kind, "attachment");
    }

    #[test]
    fn test_scan_config_own_setting() {
        let config = ScanConfig::default().with_namespace("wpmdc");
        assert!(config.is_own_setting("wpmdc_images_data"));
        assert!(!config.is_own_setting("theme_mods_twentytwenty"));
    }

    #[test]
    fn test_job_config_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.chunk_delay(), Duration::from_millis(250));
        assert!((config.seconds_per_item - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.cancel_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"scan": {"storage_namespace": "custom"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.scan.storage_namespace, "custom");
        assert_eq!(config.scan.resource_kind, "attachment");
        assert_eq!(config.jobs.chunk_size, 50);
    }

    #[test]
    fn test_config_validate_rejects_zero_chunk() {
        let mut config = Config::default();
        config.jobs.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jobs.chunk_size"));
    }

    #[test]
    fn test_config_validate_rejects_bad_rate() {
        let mut config = Config::default();
        config.jobs.seconds_per_item = f64::NAN;
        assert!(config.validate().is_err());

        config.jobs.seconds_per_item = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("mu.json")).unwrap();
        std::fs::write(&path, r#"{"jobs": {"chunk_size": 7, "chunk_delay_ms": 0}}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.jobs.chunk_size, 7);
        assert_eq!(config.jobs.chunk_delay_ms, 0);
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = Config::from_file(Utf8Path::new("/nonexistent/mu.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
