//! Basic sync example
//!
//! Syncs every article of an account into a local SQLite database and prints progress
//! events while it runs. Ctrl-C cancels the sync.
//!
//! ```bash
//! FEEDSYNC_ACCESS_TOKEN=... FEEDSYNC_USER_ID=... cargo run --example basic_sync
//! ```

use feedsync::{Database, HttpStreamService, ResourceId, SyncConfig, SyncEvent, SyncOutcome, SyncSession};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let user_id = std::env::var("FEEDSYNC_USER_ID")?;
    let mut config = SyncConfig::default();
    config.service.access_token = Some(std::env::var("FEEDSYNC_ACCESS_TOKEN")?);
    config.persistence.database_path = "./feedsync-demo.db".into();

    let service = HttpStreamService::new(config.service.clone(), config.retry.clone())?;
    let db = Arc::new(Database::open(&config.persistence).await?);
    let session = SyncSession::new(config, Arc::new(service), db.clone())?;

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::PageFetched {
                    page, item_count, ..
                } => println!("Page {} fetched: {} items", page, item_count),
                SyncEvent::ItemsMerged { page, summary } => println!(
                    "Page {} merged: {} new, {} updated",
                    page, summary.articles_created, summary.articles_updated
                ),
                SyncEvent::EndOfStream { pages } => println!("Stream has {} pages", pages),
                _ => {}
            }
        }
    });

    let handle = session.start(ResourceId::global_all(&user_id), None);
    let canceler = handle.canceler();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Canceling...");
            canceler.cancel();
        }
    });

    match handle.wait().await {
        SyncOutcome::Finished(report) => println!(
            "Done in {:?}: {} articles fetched, {} stored in total",
            report.elapsed,
            report.items_fetched,
            db.article_count().await?
        ),
        SyncOutcome::Failed(e) => eprintln!("Sync failed: {}", e),
        SyncOutcome::Canceled => println!("Sync canceled"),
    }

    Ok(())
}
