//! Feed records.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, FeedRow};

impl Database {
    /// Insert a feed, or refresh its title if it already exists
    ///
    /// A missing title never overwrites a known one.
    pub(super) async fn upsert_feed(
        conn: &mut SqliteConnection,
        feed_id: &str,
        title: Option<&str>,
        now: i64,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO feeds (id, title, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET title = COALESCE(excluded.title, feeds.title)
            "#,
        )
        .bind(feed_id)
        .bind(title)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Get a feed by its identifier
    pub async fn get_feed(&self, id: &str) -> Result<Option<FeedRow>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, title, created_at
            FROM feeds
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get feed: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all feeds, ordered by identifier
    pub async fn list_feeds(&self) -> Result<Vec<FeedRow>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, title, created_at
            FROM feeds
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list feeds: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Number of feeds in the store
    pub async fn feed_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feeds")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count feeds: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
