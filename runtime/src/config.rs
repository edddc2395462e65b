//! Batch configuration.
//!
//! [`BatchConfig`] is what batch operations consume: a concurrency bound and
//! the retry policy handed to every child. [`BatchSettings`] is its plain-data
//! form, loadable from environment variables or any `serde` source.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `VOLLEY_MAX_CONCURRENCY` | Max children in flight (`0` = unbounded) | unbounded |
//! | `VOLLEY_MAX_RETRIES` | Retries per request (`0` disables retrying) | `0` |
//! | `VOLLEY_RETRY_INITIAL_DELAY_MS` | First backoff delay | `100` |
//! | `VOLLEY_RETRY_MAX_DELAY_MS` | Backoff cap | `30000` |

use crate::retry::{ExponentialBackoff, NoRetry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use volley_core::RetryPolicy;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable present but not parseable
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue {
        /// Variable name
        name: String,
        /// Raw value
        value: String,
    },

    /// Settings parsed but inconsistent
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Plain-data batch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Max children in flight; `None` or `Some(0)` = unbounded
    pub max_concurrency: Option<usize>,
    /// Retries per request; `0` disables retrying
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    pub retry_initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            max_retries: 0,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl BatchSettings {
    /// Load from `VOLLEY_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable values and
    /// [`ConfigError::Validation`] for inconsistent ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BatchSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = Self {
            max_concurrency: parse(&lookup, "VOLLEY_MAX_CONCURRENCY")?,
            max_retries: parse(&lookup, "VOLLEY_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_initial_delay_ms: parse(&lookup, "VOLLEY_RETRY_INITIAL_DELAY_MS")?
                .unwrap_or(defaults.retry_initial_delay_ms),
            retry_max_delay_ms: parse(&lookup, "VOLLEY_RETRY_MAX_DELAY_MS")?
                .unwrap_or(defaults.retry_max_delay_ms),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings are internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the initial delay exceeds the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_initial_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Validation(format!(
                "retry_initial_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_initial_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}

/// Configuration consumed by batch operations.
///
/// # Example
///
/// ```
/// use volley_runtime::{BatchConfig, ExponentialBackoff};
///
/// let config = BatchConfig::new()
///     .with_max_concurrency(8)
///     .with_retry_policy(ExponentialBackoff::default());
///
/// assert_eq!(config.max_concurrency(), Some(8));
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    max_concurrency: Option<usize>,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl BatchConfig {
    /// Unbounded concurrency, no retries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_concurrency: None,
            retry_policy: Arc::new(NoRetry),
        }
    }

    /// Bound the number of children in flight at once.
    ///
    /// A bound of `0` removes the limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = (max > 0).then_some(max);
        self
    }

    /// Retry policy handed to every child operation.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Share an existing policy with the children.
    #[must_use]
    pub fn with_shared_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Build from environment variables.
    ///
    /// # Errors
    ///
    /// See [`BatchSettings::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        BatchSettings::from_env().and_then(Self::try_from)
    }

    /// Concurrency bound, if any.
    #[must_use]
    pub const fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// The retry policy children use.
    #[must_use]
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        Arc::clone(&self.retry_policy)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<BatchSettings> for BatchConfig {
    type Error = ConfigError;

    fn try_from(settings: BatchSettings) -> Result<Self, Self::Error> {
        settings.validate()?;

        let mut config = Self::new();
        if let Some(max) = settings.max_concurrency {
            config = config.with_max_concurrency(max);
        }
        if settings.max_retries > 0 {
            config = config.with_retry_policy(
                ExponentialBackoff::builder()
                    .max_retries(settings.max_retries)
                    .initial_delay(Duration::from_millis(settings.retry_initial_delay_ms))
                    .max_delay(Duration::from_millis(settings.retry_max_delay_ms))
                    .build(),
            );
        }
        Ok(config)
    }
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: failures should panic
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = BatchSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, BatchSettings::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let settings = BatchSettings::from_lookup(lookup(&[
            ("VOLLEY_MAX_CONCURRENCY", "16"),
            ("VOLLEY_MAX_RETRIES", "4"),
            ("VOLLEY_RETRY_INITIAL_DELAY_MS", "50"),
            ("VOLLEY_RETRY_MAX_DELAY_MS", "5000"),
        ]))
        .unwrap();

        assert_eq!(settings.max_concurrency, Some(16));
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.retry_initial_delay_ms, 50);
        assert_eq!(settings.retry_max_delay_ms, 5000);
    }

    #[test]
    fn test_zero_concurrency_means_unbounded() {
        let settings =
            BatchSettings::from_lookup(lookup(&[("VOLLEY_MAX_CONCURRENCY", "0")])).unwrap();
        assert_eq!(settings.max_concurrency, Some(0));
        assert_eq!(BatchConfig::try_from(settings).unwrap().max_concurrency(), None);

        let deserialized: BatchSettings =
            serde_json::from_str(r#"{"max_concurrency": 0}"#).unwrap();
        assert_eq!(BatchConfig::try_from(deserialized).unwrap().max_concurrency(), None);

        assert_eq!(BatchConfig::new().with_max_concurrency(0).max_concurrency(), None);
    }

    #[test]
    fn test_deserialized_settings_are_validated() {
        let settings: BatchSettings = serde_json::from_str(
            r#"{"max_retries": 2, "retry_initial_delay_ms": 5000, "retry_max_delay_ms": 10}"#,
        )
        .unwrap();

        let err = BatchConfig::try_from(settings).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = BatchSettings::from_lookup(lookup(&[("VOLLEY_MAX_RETRIES", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "VOLLEY_MAX_RETRIES".to_string(),
                value: "lots".to_string(),
            }
        );
    }

    #[test]
    fn test_initial_delay_above_cap_rejected() {
        let err = BatchSettings::from_lookup(lookup(&[
            ("VOLLEY_RETRY_INITIAL_DELAY_MS", "9000"),
            ("VOLLEY_RETRY_MAX_DELAY_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: BatchSettings =
            serde_json::from_str(r#"{"max_concurrency": 4, "max_retries": 2}"#).unwrap();
        assert_eq!(settings.max_concurrency, Some(4));
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.retry_max_delay_ms, 30_000);

        let config = BatchConfig::try_from(settings).unwrap();
        assert_eq!(config.max_concurrency(), Some(4));
    }
}
