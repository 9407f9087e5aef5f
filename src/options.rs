//! Registry configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PortFwError, Result};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Default upper bound for the retry delay
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Registry options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Retries of a write after a transient store failure
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_interval: Duration,
    /// Double the delay after each retry
    pub inc_retry_interval: bool,
    /// Upper bound for the delay
    pub max_retry_interval: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            inc_retry_interval: true,
            max_retry_interval: DEFAULT_MAX_RETRY_INTERVAL,
        }
    }
}

/// On-disk form; durations in milliseconds.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OptionsFile {
    max_retries: u32,
    retry_interval_ms: u64,
    inc_retry_interval: bool,
    max_retry_interval_ms: u64,
}

impl Default for OptionsFile {
    fn default() -> Self {
        let defaults = RegistryOptions::default();
        Self {
            max_retries: defaults.max_retries,
            retry_interval_ms: defaults.retry_interval.as_millis() as u64,
            inc_retry_interval: defaults.inc_retry_interval,
            max_retry_interval_ms: defaults.max_retry_interval.as_millis() as u64,
        }
    }
}

impl RegistryOptions {
    /// Create new registry options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial retry delay.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Enable or disable exponential growth of the retry delay.
    pub fn with_inc_retry_interval(mut self, inc: bool) -> Self {
        self.inc_retry_interval = inc;
        self
    }

    /// Set the upper bound for the retry delay.
    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = interval;
        self
    }

    /// Delay to wait after `interval`.
    pub(crate) fn next_interval(&self, interval: Duration) -> Duration {
        if self.inc_retry_interval {
            interval.saturating_mul(2).min(self.max_retry_interval)
        } else {
            interval
        }
    }

    /// Parse options from JSON. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: OptionsFile = serde_json::from_str(text)
            .map_err(|e| PortFwError::ConfigError(format!("Invalid registry options: {}", e)))?;
        if file.retry_interval_ms > file.max_retry_interval_ms {
            return Err(PortFwError::ConfigError(format!(
                "retry_interval_ms ({}) exceeds max_retry_interval_ms ({})",
                file.retry_interval_ms, file.max_retry_interval_ms
            )));
        }
        Ok(Self {
            max_retries: file.max_retries,
            retry_interval: Duration::from_millis(file.retry_interval_ms),
            inc_retry_interval: file.inc_retry_interval,
            max_retry_interval: Duration::from_millis(file.max_retry_interval_ms),
        })
    }

    /// Read options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PortFwError::ConfigError(format!(
                "Failed to read options file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = RegistryOptions::new();
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.retry_interval, DEFAULT_RETRY_INTERVAL);
        assert!(opts.inc_retry_interval);
    }

    #[test]
    fn test_next_interval_doubles_and_caps() {
        let opts = RegistryOptions::new()
            .with_retry_interval(Duration::from_millis(400))
            .with_max_retry_interval(Duration::from_millis(1000));
        let second = opts.next_interval(opts.retry_interval);
        assert_eq!(second, Duration::from_millis(800));
        assert_eq!(opts.next_interval(second), Duration::from_millis(1000));

        let flat = opts.clone().with_inc_retry_interval(false);
        assert_eq!(flat.next_interval(second), second);
    }

    #[test]
    fn test_from_json_partial() {
        let opts = RegistryOptions::from_json(r#"{"max_retries": 5, "retry_interval_ms": 0}"#).unwrap();
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.retry_interval, Duration::ZERO);
        assert_eq!(opts.max_retry_interval, DEFAULT_MAX_RETRY_INTERVAL);
    }

    #[test]
    fn test_from_json_rejects_unknown_and_inverted() {
        assert!(matches!(
            RegistryOptions::from_json(r#"{"retries": 5}"#),
            Err(PortFwError::ConfigError(_))
        ));
        assert!(matches!(
            RegistryOptions::from_json(r#"{"retry_interval_ms": 5000, "max_retry_interval_ms": 10}"#),
            Err(PortFwError::ConfigError(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = RegistryOptions::from_file("/nonexistent/portfw.json");
        assert!(matches!(result, Err(PortFwError::ConfigError(_))));
    }
}
