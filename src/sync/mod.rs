//! Sync session - drives paginated ingestion of one stream into the article store.
//!
//! A session owns an [`OperationQueue`] per run. Starting a run:
//!
//! 1. suspends the queue and adds a [`CheckpointOperation`] with no dependencies,
//! 2. adds the fetch/group/merge chain for the first page and makes the checkpoint wait
//!    on its merge,
//! 3. resumes the queue.
//!
//! Each fetch that reports a continuation adds the chain for the next page before it
//! finishes, and the checkpoint gains that chain's merge as another dependency. Once a
//! page comes back without continuation no chain is added, and the checkpoint runs when
//! the last merge finishes. A failed node cancels the whole queue as its failure is
//! recorded, so a fetch still waiting for a slot never starts.
//!
//! The run itself is a single task that reacts to three things in priority order:
//! caller cancellation, failed nodes, and the checkpoint signal.

mod chain;
mod handle;


pub use handle::{SyncCanceler, SyncHandle, SyncOutcome};

use crate::config::SyncConfig;
use crate::db::ArticleStore;
use crate::error::{Error, Result};
use crate::queue::{NodeOutcome, OperationQueue};
use crate::service::StreamService;
use crate::stages::CheckpointOperation;
use crate::types::{ResourceId, SessionState, SyncEvent};
use chain::ChainBuilder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Syncs streams from a [`StreamService`] into an [`ArticleStore`]
///
/// # Example
///
/// ```no_run
/// use feedsync::{Database, HttpStreamService, ResourceId, SyncConfig, SyncOutcome, SyncSession};
/// use std::sync::Arc;
///
/// # async fn example() -> feedsync::Result<()> {
/// let config = SyncConfig::default();
/// let service = HttpStreamService::new(config.service.clone(), config.retry.clone())?;
/// let store = Database::open(&config.persistence).await?;
///
/// let session = SyncSession::new(config, Arc::new(service), Arc::new(store))?;
/// let handle = session.start(ResourceId::global_all("my-user-id"), None);
///
/// match handle.wait().await {
///     SyncOutcome::Finished(report) => println!("merged {} pages", report.pages_fetched),
///     SyncOutcome::Failed(e) => eprintln!("sync failed: {e}"),
///     SyncOutcome::Canceled => {}
/// }
/// # Ok(())
/// # }
/// ```
pub struct SyncSession {
    config: SyncConfig,
    service: Arc<dyn StreamService>,
    store: Arc<dyn ArticleStore>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncSession {
    /// Create a session
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(
        config: SyncConfig,
        service: Arc<dyn StreamService>,
        store: Arc<dyn ArticleStore>,
    ) -> Result<Self> {
        config.validate()?;

        // Buffer enough events for a slow subscriber to follow a long stream
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config,
            service,
            store,
            event_tx,
        })
    }

    /// Subscribe to progress events of every run started from this session
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// The session configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start syncing `resource`, optionally only items newer than `newer_than`
    ///
    /// Must be called from within a Tokio runtime. Every call starts an independent run
    /// on a fresh operation queue.
    pub fn start(&self, resource: ResourceId, newer_than: Option<DateTime<Utc>>) -> SyncHandle {
        let cancel_token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let run = SessionRun {
            resource: resource.clone(),
            newer_than,
            service: Arc::clone(&self.service),
            store: Arc::clone(&self.store),
            max_concurrent: self.config.queue.max_concurrent_operations,
            event_tx: self.event_tx.clone(),
            cancel_token: cancel_token.clone(),
        };
        tokio::spawn(run.execute(state_tx, outcome_tx));

        SyncHandle::new(resource, cancel_token, state_rx, outcome_rx)
    }
}

/// Everything one run needs, moved into its task
struct SessionRun {
    resource: ResourceId,
    newer_than: Option<DateTime<Utc>>,
    service: Arc<dyn StreamService>,
    store: Arc<dyn ArticleStore>,
    max_concurrent: usize,
    event_tx: broadcast::Sender<SyncEvent>,
    cancel_token: CancellationToken,
}

impl SessionRun {
    async fn execute(
        self,
        state_tx: watch::Sender<SessionState>,
        outcome_tx: oneshot::Sender<SyncOutcome>,
    ) {
        let outcome = self.drive(&state_tx).await;

        match &outcome {
            SyncOutcome::Finished(report) => {
                tracing::info!(
                    resource = %self.resource,
                    pages = report.pages_fetched,
                    items = report.items_fetched,
                    created = report.articles_created,
                    updated = report.articles_updated,
                    elapsed = ?report.elapsed,
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    report: report.clone(),
                });
            }
            SyncOutcome::Failed(error) => {
                tracing::error!(resource = %self.resource, error = %error, "Sync failed");
                self.emit(SyncEvent::Failed {
                    error: error.to_string(),
                });
            }
            SyncOutcome::Canceled => {
                tracing::info!(resource = %self.resource, "Sync canceled");
                self.emit(SyncEvent::Canceled {
                    resource: self.resource.clone(),
                });
            }
        }

        state_tx.send_replace(outcome.state());
        // The handle may have been dropped
        outcome_tx.send(outcome).ok();
    }

    async fn drive(&self, state_tx: &watch::Sender<SessionState>) -> SyncOutcome {
        if self.cancel_token.is_cancelled() {
            return SyncOutcome::Canceled;
        }

        let started = Instant::now();
        tracing::info!(resource = %self.resource, newer_than = ?self.newer_than, "Sync started");
        self.emit(SyncEvent::Started {
            resource: self.resource.clone(),
            newer_than: self.newer_than,
        });

        let (queue, mut node_events) = OperationQueue::new(self.max_concurrent);
        queue.set_cancel_on_failure(true);
        queue.suspend();

        let (checkpoint, mut checkpoint_rx) = CheckpointOperation::new();
        let chains = match self.wire_first_page(&queue, checkpoint) {
            Ok(chains) => chains,
            Err(error) => {
                queue.cancel_all();
                return SyncOutcome::Failed(error);
            }
        };

        state_tx.send_replace(SessionState::Running);
        queue.resume();

        let mut checkpoint_open = true;
        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    queue.cancel_all();
                    return SyncOutcome::Canceled;
                }

                Some(event) = node_events.recv() => {
                    if let NodeOutcome::Failed(error) = event.outcome {
                        tracing::debug!(operation = %event.id, name = %event.name, "Stage failed, canceling queue");
                        queue.cancel_all();
                        return SyncOutcome::Failed(error);
                    }
                }

                fired = &mut checkpoint_rx, if checkpoint_open => {
                    match fired {
                        Ok(()) if chains.end_of_stream() => {
                            tracing::debug!(
                                resource = %self.resource,
                                merges = chains.mergers().len(),
                                "Checkpoint reached"
                            );
                            return SyncOutcome::Finished(chains.report(started.elapsed()));
                        }
                        Ok(()) => {
                            queue.cancel_all();
                            return SyncOutcome::Failed(Error::Other(
                                "checkpoint reached before the end of the stream".to_string(),
                            ));
                        }
                        // Dropped unrun: a failed node is on its way through `node_events`
                        Err(_) => checkpoint_open = false,
                    }
                }
            }
        }
    }

    /// Add the checkpoint and the first chain to a suspended queue
    fn wire_first_page(
        &self,
        queue: &OperationQueue,
        checkpoint: CheckpointOperation,
    ) -> Result<Arc<ChainBuilder>> {
        let checkpoint_id = queue.add(Arc::new(checkpoint), &[])?;
        let chains = ChainBuilder::new(
            queue.clone(),
            Arc::clone(&self.service),
            Arc::clone(&self.store),
            self.resource.clone(),
            self.newer_than,
            checkpoint_id,
            self.event_tx.clone(),
        );
        chains.enqueue_page(0, None)?;
        Ok(chains)
    }

    fn emit(&self, event: SyncEvent) {
        self.event_tx.send(event).ok();
    }
}
