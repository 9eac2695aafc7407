//! Registry configuration.

use thiserror::Error;

use crate::download::RetryPolicy;
use crate::download::constants::CONNECT_TIMEOUT_SECS;
use crate::user_agent::UserAgent;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 32;

/// Maximum allowed connect timeout in seconds.
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 3600;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Concurrency outside `MIN_CONCURRENCY..=MAX_CONCURRENCY`.
    #[error(
        "max_concurrent_downloads must be between {min} and {max}, got {value}",
        min = MIN_CONCURRENCY,
        max = MAX_CONCURRENCY
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Connect timeout outside `1..=MAX_CONNECT_TIMEOUT_SECS`.
    #[error(
        "connect_timeout_secs must be between 1 and {max}, got {value}",
        max = MAX_CONNECT_TIMEOUT_SECS
    )]
    InvalidConnectTimeout {
        /// The rejected value.
        value: u64,
    },
}

/// Settings for a [`DownloadRegistry`](crate::DownloadRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Transfers allowed to run at once; the rest wait in FIFO order.
    pub max_concurrent_downloads: usize,
    /// User-Agent sent on every request.
    pub user_agent: UserAgent,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
    /// Policy for tasks started without one.
    pub default_policy: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            user_agent: UserAgent::default(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            default_policy: RetryPolicy::default(),
        }
    }
}

impl ManagerConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrent_downloads) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_downloads,
            });
        }
        if !(1..=MAX_CONNECT_TIMEOUT_SECS).contains(&self.connect_timeout_secs) {
            return Err(ConfigError::InvalidConnectTimeout {
                value: self.connect_timeout_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = ManagerConfig {
            max_concurrent_downloads: 0,
            ..ManagerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency { value: 0 })
        );
        config.max_concurrent_downloads = 33;
        assert!(config.validate().is_err());
        config.max_concurrent_downloads = 32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connect_timeout_bounds() {
        let config = ManagerConfig {
            connect_timeout_secs: 0,
            ..ManagerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConnectTimeout { value: 0 })
        );
    }
}
