//! Spooler configuration.
//!
//! Durations are configured in milliseconds; every field has a default so
//! an empty `spooler:` section is valid.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::error::DomainError;

/// Settings shared by all projection handlers, with per-view overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpoolerConfig {
    /// Number of worker tasks.
    #[serde(default = "default_concurrent_workers")]
    pub concurrent_workers: usize,
    /// Events fetched per poll.
    #[serde(default = "default_bulk_limit")]
    pub bulk_limit: u64,
    /// Failures after which an event is skipped.
    #[serde(default = "default_failure_count_until_skip")]
    pub failure_count_until_skip: u64,
    /// Pacing floor between two polls of one handler (milliseconds).
    #[serde(default = "default_cycle_duration_ms")]
    pub cycle_duration_ms: u64,
    /// Lease window per view (milliseconds). Renewed at half this interval.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    /// Identity of this process in the lease table.
    #[serde(default = "default_locker_id")]
    pub locker_id: String,
    /// Per-view overrides, keyed by view name.
    #[serde(default)]
    pub handlers: HashMap<String, HandlerConfig>,
}

/// Overrides for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Pacing floor for this view (milliseconds).
    #[serde(default)]
    pub minimum_cycle_duration_ms: Option<u64>,
    /// Events fetched per poll for this view.
    #[serde(default)]
    pub bulk_limit: Option<u64>,
}

/// Resolved tuning of one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Pacing floor between polls.
    pub minimum_cycle_duration: Duration,
    /// Events fetched per poll.
    pub bulk_limit: u64,
    /// Failures after which an event is skipped.
    pub failure_count_until_skip: u64,
    /// Lease window.
    pub lock_duration: Duration,
}

fn default_concurrent_workers() -> usize {
    2
}

fn default_bulk_limit() -> u64 {
    200
}

fn default_failure_count_until_skip() -> u64 {
    5
}

fn default_cycle_duration_ms() -> u64 {
    2_000
}

fn default_lease_duration_ms() -> u64 {
    30_000
}

fn default_locker_id() -> String {
    format!("warden-{}", Uuid::new_v4())
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            concurrent_workers: default_concurrent_workers(),
            bulk_limit: default_bulk_limit(),
            failure_count_until_skip: default_failure_count_until_skip(),
            cycle_duration_ms: default_cycle_duration_ms(),
            lease_duration_ms: default_lease_duration_ms(),
            locker_id: default_locker_id(),
            handlers: HashMap::new(),
        }
    }
}

impl SpoolerConfig {
    /// Lease window requested for every view.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Settings for `view_name`, falling back to the defaults for anything
    /// the view does not override.
    #[must_use]
    pub fn handler_settings(&self, view_name: &str) -> HandlerSettings {
        let overrides = self.handlers.get(view_name);
        HandlerSettings {
            minimum_cycle_duration: Duration::from_millis(
                overrides
                    .and_then(|o| o.minimum_cycle_duration_ms)
                    .unwrap_or(self.cycle_duration_ms),
            ),
            bulk_limit: overrides
                .and_then(|o| o.bulk_limit)
                .unwrap_or(self.bulk_limit),
            failure_count_until_skip: self.failure_count_until_skip,
            lock_duration: self.lease_duration(),
        }
    }

    /// Checks the values the spooler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` naming the offending setting.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.concurrent_workers == 0 {
            return Err(DomainError::InvalidArgument(
                "concurrent_workers must be at least 1".into(),
            ));
        }
        if self.lease_duration_ms == 0 {
            return Err(DomainError::InvalidArgument(
                "lease_duration_ms must be positive".into(),
            ));
        }
        if self.locker_id.is_empty() {
            return Err(DomainError::InvalidArgument("locker_id is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_section_uses_defaults() {
        let config: SpoolerConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.concurrent_workers, 2);
        assert_eq!(config.bulk_limit, 200);
        assert_eq!(config.lease_duration(), Duration::from_secs(30));
        assert!(config.locker_id.starts_with("warden-"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_handler_settings_apply_overrides() {
        // Arrange
        let yaml = r"
bulk_limit: 50
cycle_duration_ms: 1000
handlers:
  users:
    bulk_limit: 10
";
        let config: SpoolerConfig = serde_yaml::from_str(yaml).unwrap();

        // Act
        let users = config.handler_settings("users");
        let orgs = config.handler_settings("orgs");

        // Assert
        assert_eq!(users.bulk_limit, 10);
        assert_eq!(users.minimum_cycle_duration, Duration::from_secs(1));
        assert_eq!(orgs.bulk_limit, 50);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = SpoolerConfig {
            concurrent_workers: 0,
            ..SpoolerConfig::default()
        };

        assert!(config.validate().unwrap_err().is_invalid_argument());
    }
}
