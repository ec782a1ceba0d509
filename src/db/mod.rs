//! Database layer for feedsync
//!
//! Handles SQLite persistence for the local account's feeds, articles, and article status.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`feeds`] - Feed records
//! - [`articles`] - Article merge ([`ArticleStore`]) and article queries

use crate::error::Result;
use crate::types::{GroupedItems, MergeSummary};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod articles;
mod feeds;
mod migrations;

/// Destination of merged stream pages
///
/// Implementations are scoped to one account and keyed by feed identifier and article
/// identity. A merge must be convergent: merging the same items twice leaves the store
/// as merging them once.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Create articles that are not present yet and update the ones that are
    async fn merge_items(&self, grouped: &GroupedItems) -> Result<MergeSummary>;
}

/// Feed record from database
#[derive(Debug, Clone, FromRow)]
pub struct FeedRow {
    /// Feed stream identifier ("feed/<url>")
    pub id: String,
    /// Feed display title
    pub title: Option<String>,
    /// Unix timestamp when the feed was first seen
    pub created_at: i64,
}

/// Article record from database
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    /// Service-assigned article identity
    pub id: String,
    /// Feed the article belongs to
    pub feed_id: String,
    /// Article title
    pub title: Option<String>,
    /// Link to the article
    pub url: Option<String>,
    /// Author name
    pub author: Option<String>,
    /// Full HTML content
    pub content_html: Option<String>,
    /// Summary HTML
    pub summary: Option<String>,
    /// Unix timestamp of publication
    pub published_at: Option<i64>,
    /// Unix timestamp of the last modification on the service
    pub updated_at: Option<i64>,
    /// Unix timestamp when the article was first stored
    pub created_at: i64,
}

impl ArticleRow {
    /// Publication time as a UTC timestamp
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Read/starred flags of an article
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ArticleStatus {
    /// Article the status belongs to
    pub article_id: String,
    /// Whether the article has been read
    pub read: bool,
    /// Whether the article is starred (saved for later)
    pub starred: bool,
}

/// Database handle for feedsync
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
