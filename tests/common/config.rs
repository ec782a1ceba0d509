//! Test configuration helpers for building sessions against a mock server or the live service

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use feedsync::config::{PersistenceConfig, QueueConfig, RetryConfig, ServiceConfig};
use feedsync::{Database, HttpStreamService, SyncConfig, SyncSession};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Sync configuration pointing at `base_url` with fast retries
pub fn mock_config(base_url: &str, db_path: &Path) -> SyncConfig {
    SyncConfig {
        service: ServiceConfig {
            base_url: base_url.to_string(),
            access_token: Some("test-token".to_string()),
            timeout: Duration::from_secs(5),
            page_size: 20,
            ..Default::default()
        },
        queue: QueueConfig {
            max_concurrent_operations: 4,
        },
        persistence: PersistenceConfig {
            database_path: db_path.to_path_buf(),
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// A session against `base_url` and a fresh database in a temp dir
///
/// Returns the session, the database (for assertions) and the temp dir, which must be
/// kept alive for the duration of the test.
pub async fn create_mock_session(
    base_url: &str,
) -> Result<(SyncSession, Arc<Database>, TempDir), ConfigError> {
    let temp_dir =
        tempfile::tempdir().map_err(|e| ConfigError(format!("Failed to create temp dir: {e}")))?;
    let config = mock_config(base_url, &temp_dir.path().join("feedsync.db"));
    let (session, db) = create_session(config).await?;
    Ok((session, db, temp_dir))
}

/// Build the HTTP service, open the database and create a session from `config`
pub async fn create_session(
    config: SyncConfig,
) -> Result<(SyncSession, Arc<Database>), ConfigError> {
    let service = HttpStreamService::new(config.service.clone(), config.retry.clone())
        .map_err(|e| ConfigError(format!("Failed to create service: {e}")))?;
    let db = Arc::new(
        Database::open(&config.persistence)
            .await
            .map_err(|e| ConfigError(format!("Failed to open database: {e}")))?,
    );
    let session = SyncSession::new(config, Arc::new(service), db.clone())
        .map_err(|e| ConfigError(format!("Failed to create session: {e}")))?;
    Ok((session, db))
}

/// Live service credentials
pub struct LiveCredentials {
    /// OAuth access token
    pub access_token: String,
    /// Account the streams belong to
    pub user_id: String,
    /// Service base URL
    pub base_url: String,
}

/// Load live service credentials from the environment
///
/// Required environment variables:
/// - `FEEDSYNC_ACCESS_TOKEN` - OAuth access token
/// - `FEEDSYNC_USER_ID` - Account id
///
/// Optional environment variables:
/// - `FEEDSYNC_BASE_URL` - Service base URL (default: the bundled default)
pub fn load_live_credentials() -> Result<LiveCredentials, ConfigError> {
    dotenvy::dotenv().ok();

    let access_token = std::env::var("FEEDSYNC_ACCESS_TOKEN")
        .map_err(|_| ConfigError("FEEDSYNC_ACCESS_TOKEN not set in environment".to_string()))?;
    let user_id = std::env::var("FEEDSYNC_USER_ID")
        .map_err(|_| ConfigError("FEEDSYNC_USER_ID not set in environment".to_string()))?;
    let base_url =
        std::env::var("FEEDSYNC_BASE_URL").unwrap_or_else(|_| ServiceConfig::default().base_url);

    Ok(LiveCredentials {
        access_token,
        user_id,
        base_url,
    })
}

/// Whether live credentials are available
pub fn has_live_credentials() -> bool {
    load_live_credentials().is_ok()
}

/// A session against the live service and a fresh database in a temp dir
pub async fn create_live_session(
    credentials: &LiveCredentials,
) -> Result<(SyncSession, Arc<Database>, TempDir), ConfigError> {
    let temp_dir =
        tempfile::tempdir().map_err(|e| ConfigError(format!("Failed to create temp dir: {e}")))?;

    let mut config = SyncConfig::default();
    config.service.base_url = credentials.base_url.clone();
    config.service.access_token = Some(credentials.access_token.clone());
    config.persistence.database_path = temp_dir.path().join("live.db");

    let (session, db) = create_session(config).await?;
    Ok((session, db, temp_dir))
}
