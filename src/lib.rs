//! # feedsync
//!
//! Paginated sync of a feed-aggregation stream into a local article store.
//!
//! ## How it works
//!
//! A sync walks a remote stream page by page. Every page becomes a chain of three
//! operations (fetch, group by feed, merge into the store) on an operation queue that
//! runs independent work in parallel: while page `P` is being grouped and merged, page
//! `P + 1` is already being fetched. A checkpoint node depends on the merge of every
//! chain and tells the session when the whole stream has been ingested.
//!
//! - **Library-first** - no CLI or UI, purely a crate for embedding
//! - **Pluggable** - the remote service ([`StreamService`]) and the local store
//!   ([`ArticleStore`]) are traits; [`HttpStreamService`] and [`Database`] are the
//!   bundled implementations
//! - **Event-driven** - consumers subscribe to [`SyncEvent`]s instead of polling
//! - **Cancellable** - [`SyncHandle::cancel`] stops a session at any point
//!
//! ## Quick Start
//!
//! ```no_run
//! use feedsync::{Database, HttpStreamService, ResourceId, SyncConfig, SyncSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = SyncConfig::default();
//!     config.service.access_token = Some("token".to_string());
//!
//!     let service = HttpStreamService::new(config.service.clone(), config.retry.clone())?;
//!     let store = Database::open(&config.persistence).await?;
//!     let session = SyncSession::new(config, Arc::new(service), Arc::new(store))?;
//!
//!     // Subscribe to events
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let outcome = session.start(ResourceId::global_all("user-id"), None).wait().await;
//!     println!("Outcome: {:?}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Article store and its SQLite implementation
pub mod db;
/// Error types
pub mod error;
/// Dependency-ordered operation execution
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote stream service
pub mod service;
/// Per-page stage operations
pub mod stages;
/// Sync session orchestration
pub mod sync;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{PersistenceConfig, QueueConfig, Ranking, RetryConfig, ServiceConfig, SyncConfig};
pub use db::{ArticleStore, Database};
pub use error::{
    DatabaseError, Error, ErrorKind, GroupingError, Result, StoreError, TransportError,
};
pub use queue::{Operation, OperationContext, OperationQueue};
pub use service::{HttpStreamService, StreamService};
pub use sync::{SyncCanceler, SyncHandle, SyncOutcome, SyncSession};
pub use types::{
    GroupedItems, MergeSummary, OperationId, OperationState, ParsedItem, ResourceId,
    SessionState, StreamPage, SyncEvent, SyncReport,
};
