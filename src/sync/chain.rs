//! Builds the per-page stage chains and tracks what they produced.

use crate::db::ArticleStore;
use crate::error::{Error, Result};
use crate::queue::{Handoff, OperationQueue};
use crate::service::StreamService;
use crate::stages::{FetchPageOperation, GroupItemsOperation, MergeItemsOperation, StageListener};
use crate::types::{MergeSummary, OperationId, ResourceId, StreamPage, SyncEvent, SyncReport};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

/// What the session has seen so far
#[derive(Default)]
struct Progress {
    chains: usize,
    /// Fetch node of the newest chain; the next fetch runs after it
    last_fetch: Option<OperationId>,
    /// Merge node of every chain, in page order
    mergers: Vec<OperationId>,
    pages_fetched: usize,
    items_fetched: usize,
    merged: MergeSummary,
    end_of_stream: bool,
}

/// Adds fetch/group/merge chains to the queue and wires each merge into the checkpoint
///
/// Also the [`StageListener`] of every stage it creates: when a fetch reports a page with
/// a continuation, the next chain is added right there, while the reporting fetch is still
/// running. Its own merge is therefore still pending, which keeps the checkpoint closed
/// until the chain for the next page is wired in.
pub(super) struct ChainBuilder {
    this: Weak<ChainBuilder>,
    queue: OperationQueue,
    service: Arc<dyn StreamService>,
    store: Arc<dyn ArticleStore>,
    resource: ResourceId,
    newer_than: Option<DateTime<Utc>>,
    checkpoint: OperationId,
    event_tx: broadcast::Sender<SyncEvent>,
    progress: Mutex<Progress>,
}

impl ChainBuilder {
    pub(super) fn new(
        queue: OperationQueue,
        service: Arc<dyn StreamService>,
        store: Arc<dyn ArticleStore>,
        resource: ResourceId,
        newer_than: Option<DateTime<Utc>>,
        checkpoint: OperationId,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            queue,
            service,
            store,
            resource,
            newer_than,
            checkpoint,
            event_tx,
            progress: Mutex::new(Progress::default()),
        })
    }

    /// Add the chain for page number `page`, requested with `continuation`
    pub(super) fn enqueue_page(&self, page: usize, continuation: Option<String>) -> Result<()> {
        let mut progress = self.lock();
        self.enqueue_locked(&mut progress, page, continuation)
    }

    /// Whether a page without continuation has been seen
    pub(super) fn end_of_stream(&self) -> bool {
        self.lock().end_of_stream
    }

    /// Merge node of every chain added so far
    pub(super) fn mergers(&self) -> Vec<OperationId> {
        self.lock().mergers.clone()
    }

    pub(super) fn report(&self, elapsed: Duration) -> SyncReport {
        let progress = self.lock();
        SyncReport {
            resource: self.resource.clone(),
            pages_fetched: progress.pages_fetched,
            chains: progress.chains,
            items_fetched: progress.items_fetched,
            articles_created: progress.merged.articles_created,
            articles_updated: progress.merged.articles_updated,
            elapsed,
        }
    }

    fn enqueue_locked(
        &self,
        progress: &mut Progress,
        page: usize,
        continuation: Option<String>,
    ) -> Result<()> {
        let listener: Arc<dyn StageListener> = self
            .this
            .upgrade()
            .ok_or_else(|| Error::Other("sync session is gone".to_string()))?;

        let fetched = Handoff::new();
        let grouped = Handoff::new();

        let fetch_deps: Vec<OperationId> = progress.last_fetch.into_iter().collect();
        let fetch = self.queue.add(
            Arc::new(FetchPageOperation::new(
                Arc::clone(&self.service),
                Arc::clone(&listener),
                self.resource.clone(),
                page,
                continuation.clone(),
                self.newer_than,
                fetched.clone(),
            )),
            &fetch_deps,
        )?;
        let group = self.queue.add(
            Arc::new(GroupItemsOperation::new(
                Arc::clone(&listener),
                page,
                fetched,
                grouped.clone(),
            )),
            &[fetch],
        )?;
        let merge = self.queue.add(
            Arc::new(MergeItemsOperation::new(
                Arc::clone(&self.store),
                listener,
                page,
                grouped,
            )),
            &[group],
        )?;
        self.queue.add_dependency(self.checkpoint, merge)?;

        progress.chains += 1;
        progress.last_fetch = Some(fetch);
        progress.mergers.push(merge);

        tracing::debug!(resource = %self.resource, page, %fetch, %merge, "Chain added");
        self.emit(SyncEvent::PageRequested {
            resource: self.resource.clone(),
            page,
            continuation,
        });
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StageListener for ChainBuilder {
    fn page_fetched(&self, page: usize, contents: &StreamPage) -> Result<()> {
        let mut progress = self.lock();
        progress.pages_fetched += 1;
        progress.items_fetched += contents.item_count();

        self.emit(SyncEvent::PageFetched {
            page,
            stream_id: contents.stream_id.clone(),
            item_count: contents.item_count(),
            continuation: contents.continuation.clone(),
        });

        match &contents.continuation {
            Some(_) if self.queue.is_canceled() => Ok(()),
            Some(next) => self.enqueue_locked(&mut progress, page + 1, Some(next.clone())),
            None => {
                progress.end_of_stream = true;
                tracing::debug!(resource = %self.resource, pages = page + 1, "Reached end of stream");
                self.emit(SyncEvent::EndOfStream { pages: page + 1 });
                Ok(())
            }
        }
    }

    fn items_grouped(&self, page: usize, feeds: usize, items: usize, skipped: usize) {
        self.emit(SyncEvent::ItemsGrouped {
            page,
            feeds,
            items,
            skipped,
        });
    }

    fn items_merged(&self, page: usize, summary: MergeSummary) {
        self.lock().merged += summary;
        self.emit(SyncEvent::ItemsMerged { page, summary });
    }
}
