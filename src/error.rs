//! Error types for feedsync
//!
//! Errors are split into the three fatal classes a sync session can end with:
//! - [`TransportError`] - the stream service could not deliver a page
//! - [`GroupingError`] - a page was missing when it was needed (an invariant violation)
//! - [`StoreError`] - the local store could not merge a page
//!
//! Everything else (database plumbing, configuration, I/O) is wrapped by the top-level
//! [`Error`]. Cancellation is not an error; it is reported as
//! [`SyncOutcome::Canceled`](crate::sync::SyncOutcome::Canceled).

use thiserror::Error;

/// Result type alias for feedsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedsync
#[derive(Debug, Error)]
pub enum Error {
    /// Fetching a page of the remote stream failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A page could not be partitioned by feed
    #[error("grouping error: {0}")]
    Grouping(#[from] GroupingError),

    /// Merging a page into the local store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "service.page_size")
        key: Option<String>,
    },

    /// The operation graph was used incorrectly (e.g. wiring a node that already started)
    #[error("operation queue error: {0}")]
    Queue(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures while fetching one page of the stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The service rejected the credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The service answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code returned by the service
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request could not be sent (DNS, connect, TLS, ...)
    #[error("request failed: {0}")]
    Request(String),

    /// The response body was not a valid stream page
    #[error("failed to decode stream page: {0}")]
    Decode(String),
}

/// Failures while partitioning a page by feed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupingError {
    /// The upstream fetch finished without producing a page
    #[error("no page available from {stage}")]
    MissingPage {
        /// Name of the stage that should have produced the page
        stage: String,
    },
}

/// Failures while merging grouped items into the local store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store rejected the merge
    #[error("failed to merge items for feed {feed_id}: {reason}")]
    MergeFailed {
        /// Feed whose items were being merged
        feed_id: String,
        /// The reason the merge failed
        reason: String,
    },

    /// An item could not be stored as an article
    #[error("invalid item {item_id}: {reason}")]
    InvalidItem {
        /// Identifier of the offending item
        item_id: String,
        /// Why the item was rejected
        reason: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Page fetch failed
    Transport,
    /// Page grouping failed
    Grouping,
    /// Store merge failed
    Store,
    /// Anything that is not part of the sync taxonomy (config, queue misuse, I/O)
    Internal,
}

impl Error {
    /// Classify this error into the sync error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::Network(_) => ErrorKind::Transport,
            Error::Grouping(_) => ErrorKind::Grouping,
            Error::Store(_) | Error::Database(_) | Error::Sqlx(_) => ErrorKind::Store,
            Error::Config { .. }
            | Error::Queue(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &str {
        match self {
            Error::Transport(e) => match e {
                TransportError::Timeout(_) => "transport_timeout",
                TransportError::Unauthorized(_) => "transport_unauthorized",
                TransportError::Http { .. } => "transport_http",
                TransportError::Request(_) => "transport_request",
                TransportError::Decode(_) => "transport_decode",
            },
            Error::Grouping(GroupingError::MissingPage { .. }) => "missing_page",
            Error::Store(e) => match e {
                StoreError::MergeFailed { .. } => "merge_failed",
                StoreError::InvalidItem { .. } => "invalid_item",
            },
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Config { .. } => "config_error",
            Error::Queue(_) => "queue_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Other(_) => "internal_error",
        }
    }
}
