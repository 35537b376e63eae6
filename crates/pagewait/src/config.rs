//! Facade configuration.

use crate::poll::DEFAULT_POLL_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for facade waits (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Environment variable overriding the default timeout
pub const ENV_DEFAULT_TIMEOUT: &str = "PAGEWAIT_DEFAULT_TIMEOUT_MS";

/// Environment variable overriding the resource poll interval
pub const ENV_POLL_INTERVAL: &str = "PAGEWAIT_POLL_INTERVAL_MS";

/// Options for a [`PageExtensions`](crate::PageExtensions) instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Timeout used when a wait is called without one
    pub default_timeout_ms: u64,
    /// Interval between request-log checks in resource and font waits
    pub resource_poll_interval_ms: u64,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            resource_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ExtensionsConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `PAGEWAIT_*` environment variables.
    ///
    /// Values that do not parse as milliseconds are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();
        if let Some(ms) = parse(ENV_DEFAULT_TIMEOUT) {
            config.default_timeout_ms = ms;
        }
        if let Some(ms) = parse(ENV_POLL_INTERVAL) {
            config.resource_poll_interval_ms = ms;
        }
        config
    }

    /// Set default timeout in milliseconds
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set resource poll interval in milliseconds
    #[must_use]
    pub const fn with_resource_poll_interval(mut self, interval_ms: u64) -> Self {
        self.resource_poll_interval_ms = interval_ms;
        self
    }

    /// Default timeout as Duration
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Resource poll interval as Duration
    #[must_use]
    pub const fn resource_poll_interval(&self) -> Duration {
        Duration::from_millis(self.resource_poll_interval_ms)
    }
}
