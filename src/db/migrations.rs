//! Database lifecycle and schema migrations.
//!
//! Schema changes are listed in [`MIGRATIONS`] and applied in version order, each in its
//! own transaction together with its `schema_version` row.

use crate::config::PersistenceConfig;
use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::Database;

/// One schema version and the statements that produce it
struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "feeds, articles and article status",
    statements: &[
        r#"
        CREATE TABLE feeds (
            id TEXT PRIMARY KEY,
            title TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE articles (
            id TEXT PRIMARY KEY,
            feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
            title TEXT,
            url TEXT,
            author TEXT,
            content_html TEXT,
            summary TEXT,
            published_at INTEGER,
            updated_at INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
        "CREATE INDEX idx_articles_feed_published ON articles(feed_id, published_at DESC)",
        r#"
        CREATE TABLE article_status (
            article_id TEXT PRIMARY KEY REFERENCES articles(id) ON DELETE CASCADE,
            read INTEGER NOT NULL DEFAULT 0,
            starred INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ],
}];

fn connection_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::ConnectionFailed(format!("{context}: {e}")))
}

fn migration_failed(version: i64) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::MigrationFailed(format!("v{version}: {e}")))
}

impl Database {
    /// Open (creating if needed) the SQLite database at `path` and bring its schema up to date
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "cannot create {}: {e}",
                    parent.display()
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(connection_failed("invalid database path"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(connection_failed("cannot open database"))?;

        let db = Self { pool };
        db.run_migrations().await?;

        tracing::debug!(path = %path.display(), "Article database ready");
        Ok(db)
    }

    /// Open the database named by the persistence settings
    pub async fn open(config: &PersistenceConfig) -> Result<Self> {
        Self::new(&config.database_path).await
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(connection_failed("cannot acquire connection"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed(0))?;

        // MAX over an empty table is a single NULL row
        let current = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_version")
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::Database(DatabaseError::QueryFailed(e.to_string())))?
            .flatten()
            .unwrap_or(0);

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "Applying database migration"
            );

            let mut tx = conn
                .begin()
                .await
                .map_err(migration_failed(migration.version))?;
            for statement in migration.statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(migration_failed(migration.version))?;
            }
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(migration.version)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await
                .map_err(migration_failed(migration.version))?;
            tx.commit()
                .await
                .map_err(migration_failed(migration.version))?;
        }

        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
