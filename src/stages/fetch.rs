use super::StageListener;
use crate::error::Result;
use crate::queue::{Handoff, Operation, OperationContext};
use crate::service::StreamService;
use crate::types::{ResourceId, StreamPage};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Fetches one page of a stream and hands it to the grouping stage
pub struct FetchPageOperation {
    service: Arc<dyn StreamService>,
    listener: Arc<dyn StageListener>,
    resource: ResourceId,
    continuation: Option<String>,
    newer_than: Option<DateTime<Utc>>,
    page: usize,
    output: Handoff<StreamPage>,
}

impl FetchPageOperation {
    /// Create a fetch for page number `page` (zero-based) of `resource`
    pub fn new(
        service: Arc<dyn StreamService>,
        listener: Arc<dyn StageListener>,
        resource: ResourceId,
        page: usize,
        continuation: Option<String>,
        newer_than: Option<DateTime<Utc>>,
        output: Handoff<StreamPage>,
    ) -> Self {
        Self {
            service,
            listener,
            resource,
            continuation,
            newer_than,
            page,
            output,
        }
    }
}

#[async_trait::async_trait]
impl Operation for FetchPageOperation {
    fn name(&self) -> String {
        format!("fetch page {}", self.page)
    }

    async fn run(&self, ctx: OperationContext) -> Result<()> {
        tracing::debug!(
            resource = %self.resource,
            page = self.page,
            continuation = ?self.continuation,
            "Requesting page"
        );

        let result = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => None,
            result = self.service.stream_contents(
                &self.resource,
                self.continuation.as_deref(),
                self.newer_than,
            ) => Some(result),
        };

        // Canceled before or while the request was in flight: finish without a page
        let Some(result) = result else {
            return Ok(());
        };
        let page = result?;
        if ctx.is_canceled() {
            return Ok(());
        }

        self.listener.page_fetched(self.page, &page)?;
        self.output.put(page);
        Ok(())
    }
}
