use super::StageListener;
use crate::db::ArticleStore;
use crate::error::{GroupingError, Result};
use crate::queue::{Handoff, Operation, OperationContext};
use crate::types::GroupedItems;
use std::sync::Arc;

/// Writes one page's grouped items to the article store
pub struct MergeItemsOperation {
    store: Arc<dyn ArticleStore>,
    listener: Arc<dyn StageListener>,
    page: usize,
    input: Handoff<GroupedItems>,
}

impl MergeItemsOperation {
    /// Create the merge stage for page number `page`
    pub fn new(
        store: Arc<dyn ArticleStore>,
        listener: Arc<dyn StageListener>,
        page: usize,
        input: Handoff<GroupedItems>,
    ) -> Self {
        Self {
            store,
            listener,
            page,
            input,
        }
    }
}

#[async_trait::async_trait]
impl Operation for MergeItemsOperation {
    fn name(&self) -> String {
        format!("merge page {}", self.page)
    }

    async fn run(&self, ctx: OperationContext) -> Result<()> {
        if ctx.is_canceled() {
            return Ok(());
        }

        let grouped = self.input.take().ok_or_else(|| GroupingError::MissingPage {
            stage: format!("group page {}", self.page),
        })?;

        tracing::debug!(
            page = self.page,
            items = grouped.item_count(),
            feeds = grouped.feed_count(),
            "Ingesting items"
        );

        // Dropping the merge future rolls back its transaction
        let summary = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => return Ok(()),
            summary = self.store.merge_items(&grouped) => summary?,
        };

        if ctx.is_canceled() {
            return Ok(());
        }
        self.listener.items_merged(self.page, summary);
        Ok(())
    }
}
