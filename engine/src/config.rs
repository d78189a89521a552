//! Sync configuration.

use crate::backoff::DEFAULT_BASE_DELAY;
use crate::processor::DEFAULT_MAX_RETRIES;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default period of the queue-size poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for remote store requests.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine configuration, usually loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Backoff base delay (`SYNC_BASE_DELAY_MS`)
    pub base_delay: Duration,
    /// Attempts before a record is dropped (`SYNC_MAX_RETRIES`)
    pub max_retries: u32,
    /// Queue-size polling period (`SYNC_POLL_INTERVAL_SECS`)
    pub poll_interval: Duration,
    /// Base URL of the document server (`SYNC_REMOTE_URL`)
    pub remote_url: Option<String>,
    /// Per-request timeout (`SYNC_REMOTE_TIMEOUT_SECS`)
    pub remote_timeout: Duration,
    /// Secret shared with the server for signing user tokens (`SYNC_REMOTE_AUTH_SECRET`)
    pub remote_auth_secret: Option<String>,
    /// Directory for the local queue files (`SYNC_STORAGE_DIR`); in memory when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            remote_url: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            remote_auth_secret: None,
            storage_dir: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_delay = match lookup("SYNC_BASE_DELAY_MS") {
            Some(v) => Duration::from_millis(parse_number("SYNC_BASE_DELAY_MS", &v)?),
            None => defaults.base_delay,
        };

        let max_retries = match lookup("SYNC_MAX_RETRIES") {
            Some(v) => {
                let n: u32 = parse_number("SYNC_MAX_RETRIES", &v)?;
                if n == 0 {
                    return Err(ConfigError::ZeroRetries);
                }
                n
            }
            None => defaults.max_retries,
        };

        let poll_interval = match lookup("SYNC_POLL_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = parse_number("SYNC_POLL_INTERVAL_SECS", &v)?;
                if secs == 0 {
                    return Err(ConfigError::ZeroPollInterval);
                }
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };

        let remote_timeout = match lookup("SYNC_REMOTE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("SYNC_REMOTE_TIMEOUT_SECS", &v)?),
            None => defaults.remote_timeout,
        };

        let remote_url = lookup("SYNC_REMOTE_URL").filter(|v| !v.is_empty());
        let remote_auth_secret = lookup("SYNC_REMOTE_AUTH_SECRET").filter(|v| !v.is_empty());
        let storage_dir = lookup("SYNC_STORAGE_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_delay,
            max_retries,
            poll_interval,
            remote_url,
            remote_timeout,
            remote_auth_secret,
            storage_dir,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("SYNC_MAX_RETRIES must be at least 1")]
    ZeroRetries,

    #[error("SYNC_POLL_INTERVAL_SECS must be at least 1")]
    ZeroPollInterval,

    #[error("SYNC_REMOTE_URL is required to reach the document server")]
    MissingRemoteUrl,
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}
