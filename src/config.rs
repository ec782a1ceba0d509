//! Configuration types for feedsync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for a sync session
///
/// Every field has a default, so an empty JSON object deserializes into a usable
/// configuration (apart from the access token, which the service needs).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Stream service connection settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Operation queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Local store settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry configuration for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(Error::Config {
                message: "base URL must not be empty".to_string(),
                key: Some("service.base_url".to_string()),
            });
        }
        if self.service.page_size == 0 {
            return Err(Error::Config {
                message: "page size must be at least 1".to_string(),
                key: Some("service.page_size".to_string()),
            });
        }
        if self.queue.max_concurrent_operations == 0 {
            return Err(Error::Config {
                message: "at least one operation must be allowed to run".to_string(),
                key: Some("queue.max_concurrent_operations".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff multiplier must be >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

/// Stream service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service API (default: "https://cloud.feedly.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth access token sent as a bearer credential
    #[serde(default)]
    pub access_token: Option<String>,

    /// User agent for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Number of items requested per page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Page ordering requested from the service
    #[serde(default)]
    pub ranked: Ranking,

    /// Only request unread articles (default: false)
    #[serde(default)]
    pub unread_only: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            user_agent: default_user_agent(),
            timeout: default_request_timeout(),
            page_size: default_page_size(),
            ranked: Ranking::default(),
            unread_only: false,
        }
    }
}

/// Order in which the service returns stream items
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    /// Newest first (default)
    #[default]
    Newest,
    /// Oldest first
    Oldest,
}

impl Ranking {
    /// Query-string value understood by the service
    pub fn as_str(&self) -> &'static str {
        match self {
            Ranking::Newest => "newest",
            Ranking::Oldest => "oldest",
        }
    }
}

/// Operation queue configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of operations running at once (default: 4)
    ///
    /// Pagination keeps at most one fetch in flight; the extra slots let grouping
    /// and merging of earlier pages overlap with the next fetch.
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: default_max_concurrent_operations(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./feedsync.db")
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

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
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

fn default_base_url() -> String {
    "https://cloud.feedly.com".to_string()
}

fn default_user_agent() -> String {
    format!("feedsync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrent_operations() -> usize {
    4
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./feedsync.db")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
