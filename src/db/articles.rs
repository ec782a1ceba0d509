//! Article merge and article queries.

use crate::error::{DatabaseError, StoreError};
use crate::types::{FeedItems, GroupedItems, MergeSummary, ParsedItem};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{ArticleRow, ArticleStatus, ArticleStore, Database};

#[async_trait::async_trait]
impl ArticleStore for Database {
    /// Merge one page in a single transaction
    ///
    /// Either every feed of the page is written or none is. Articles are upserted by
    /// identity, so merging the same page again only rewrites identical values.
    async fn merge_items(&self, grouped: &GroupedItems) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        if grouped.is_empty() {
            return Ok(summary);
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin merge transaction: {}",
                e
            )))
        })?;
        let now = chrono::Utc::now().timestamp();

        for feed in grouped.iter() {
            let (created, updated) = Self::merge_feed(&mut *tx, feed, now).await?;
            summary.feeds += 1;
            summary.articles_created += created;
            summary.articles_updated += updated;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit merge transaction: {}",
                e
            )))
        })?;

        tracing::debug!(
            feeds = summary.feeds,
            created = summary.articles_created,
            updated = summary.articles_updated,
            "Merged items into store"
        );
        Ok(summary)
    }
}

impl Database {
    /// Write one feed and its items, returning (created, updated) article counts
    async fn merge_feed(
        conn: &mut SqliteConnection,
        feed: &FeedItems,
        now: i64,
    ) -> Result<(usize, usize)> {
        let merge_failed = |e: sqlx::Error| {
            Error::Store(StoreError::MergeFailed {
                feed_id: feed.feed_id.clone(),
                reason: e.to_string(),
            })
        };

        Self::upsert_feed(conn, &feed.feed_id, feed.feed_title.as_deref(), now)
            .await
            .map_err(merge_failed)?;

        let mut created = 0;
        let mut updated = 0;
        for item in &feed.items {
            if item.id.trim().is_empty() {
                return Err(StoreError::InvalidItem {
                    item_id: item.id.clone(),
                    reason: "article id is empty".to_string(),
                }
                .into());
            }

            let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM articles WHERE id = ?")
                .bind(&item.id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(merge_failed)?
                .is_some();

            Self::upsert_article(conn, &feed.feed_id, item, now)
                .await
                .map_err(merge_failed)?;

            if exists {
                updated += 1;
            } else {
                created += 1;
            }
        }

        Ok((created, updated))
    }

    async fn upsert_article(
        conn: &mut SqliteConnection,
        feed_id: &str,
        item: &ParsedItem,
        now: i64,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO articles (
                id, feed_id, title, url, author, content_html, summary,
                published_at, updated_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                feed_id = excluded.feed_id,
                title = excluded.title,
                url = excluded.url,
                author = excluded.author,
                content_html = excluded.content_html,
                summary = excluded.summary,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(feed_id)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.author)
        .bind(&item.content_html)
        .bind(&item.summary)
        .bind(item.published.map(|t| t.timestamp()))
        .bind(item.updated.map(|t| t.timestamp()))
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO article_status (article_id, read, starred)
            VALUES (?, ?, ?)
            ON CONFLICT(article_id) DO UPDATE SET
                read = excluded.read,
                starred = excluded.starred
            "#,
        )
        .bind(&item.id)
        .bind(!item.unread)
        .bind(item.starred)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Number of articles in the store
    pub async fn article_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count articles: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Get an article by its identity
    pub async fn get_article(&self, id: &str) -> Result<Option<ArticleRow>> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, feed_id, title, url, author, content_html, summary,
                   published_at, updated_at, created_at
            FROM articles
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get article: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Articles of one feed, newest first
    pub async fn articles_for_feed(&self, feed_id: &str) -> Result<Vec<ArticleRow>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, feed_id, title, url, author, content_html, summary,
                   published_at, updated_at, created_at
            FROM articles
            WHERE feed_id = ?
            ORDER BY published_at DESC, id ASC
            "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list articles for feed: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Read/starred flags of an article
    pub async fn get_status(&self, article_id: &str) -> Result<Option<ArticleStatus>> {
        let row = sqlx::query_as::<_, ArticleStatus>(
            r#"
            SELECT article_id, read, starred
            FROM article_status
            WHERE article_id = ?
            "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get article status: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Number of articles not marked read
    pub async fn unread_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_status WHERE read = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count unread articles: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
