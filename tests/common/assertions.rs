//! Custom test assertions for integration tests

use std::time::Duration;
use feedsync::{Database, SyncEvent, SyncHandle, SyncOutcome};
use tokio::sync::broadcast;

/// Wait for a session outcome, panicking if it takes longer than `timeout`
pub async fn wait_for_outcome(handle: SyncHandle, timeout: Duration) -> SyncOutcome {
    match tokio::time::timeout(timeout, handle.wait()).await {
        Ok(outcome) => outcome,
        Err(_) => panic!("sync did not finish within {timeout:?}"),
    }
}

/// Drain every event until a terminal one (inclusive)
pub async fn collect_events_until_terminal(
    events: &mut broadcast::Receiver<SyncEvent>,
    timeout: Duration,
) -> Vec<SyncEvent> {
    let mut collected = Vec::new();
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let terminal = matches!(
                        event,
                        SyncEvent::Completed { .. }
                            | SyncEvent::Failed { .. }
                            | SyncEvent::Canceled { .. }
                    );
                    collected.push(event);
                    if terminal {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;

    if result.is_err() {
        panic!("no terminal event within {timeout:?}; got {collected:?}");
    }
    collected
}

/// Assert the store holds exactly `expected` articles
pub async fn assert_article_count(db: &Database, expected: i64) {
    let actual = db.article_count().await.expect("article count");
    assert_eq!(
        actual, expected,
        "Expected {expected} articles in the store, found {actual}"
    );
}
