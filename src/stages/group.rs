use super::StageListener;
use crate::error::{GroupingError, Result};
use crate::queue::{Handoff, Operation, OperationContext};
use crate::types::{GroupedItems, ParsedItem, StreamPage};
use std::sync::Arc;

/// Partition items by the feed they belong to
///
/// Returns the grouping and the number of items that were dropped because the service
/// did not say which feed they came from.
pub fn group_by_feed(items: Vec<ParsedItem>) -> (GroupedItems, usize) {
    let mut grouped = GroupedItems::new();
    let mut skipped = 0;

    for item in items {
        match item.feed_id.clone() {
            Some(feed_id) if !feed_id.is_empty() => grouped.push(&feed_id, item),
            _ => {
                tracing::warn!(item = %item.id, "Skipping item without an origin feed");
                skipped += 1;
            }
        }
    }

    (grouped, skipped)
}

/// Groups the page produced by its fetch dependency
pub struct GroupItemsOperation {
    listener: Arc<dyn StageListener>,
    page: usize,
    input: Handoff<StreamPage>,
    output: Handoff<GroupedItems>,
}

impl GroupItemsOperation {
    /// Create the grouping stage for page number `page`
    pub fn new(
        listener: Arc<dyn StageListener>,
        page: usize,
        input: Handoff<StreamPage>,
        output: Handoff<GroupedItems>,
    ) -> Self {
        Self {
            listener,
            page,
            input,
            output,
        }
    }
}

#[async_trait::async_trait]
impl Operation for GroupItemsOperation {
    fn name(&self) -> String {
        format!("group page {}", self.page)
    }

    async fn run(&self, ctx: OperationContext) -> Result<()> {
        if ctx.is_canceled() {
            return Ok(());
        }

        let page = self.input.take().ok_or_else(|| GroupingError::MissingPage {
            stage: format!("fetch page {}", self.page),
        })?;

        let (grouped, skipped) = group_by_feed(page.items);
        let (feeds, items) = (grouped.feed_count(), grouped.item_count());
        tracing::debug!(page = self.page, feeds, items, skipped, "Grouped page items");

        self.listener.items_grouped(self.page, feeds, items, skipped);
        self.output.put(grouped);
        Ok(())
    }
}
