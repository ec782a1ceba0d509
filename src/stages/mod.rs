//! The per-page stage operations and the sink that closes a sync.
//!
//! Every page of the stream becomes a three-node chain in the operation queue:
//!
//! ```text
//! FetchPageOperation -> GroupItemsOperation -> MergeItemsOperation -> CheckpointOperation
//! ```
//!
//! Stages pass their output to the next stage through a [`Handoff`](crate::queue::Handoff)
//! slot and report progress to a [`StageListener`]. The checkpoint is shared by all chains
//! of a session.

mod checkpoint;
mod fetch;
mod group;
mod merge;


pub use checkpoint::CheckpointOperation;
pub use fetch::FetchPageOperation;
pub use group::{GroupItemsOperation, group_by_feed};
pub use merge::MergeItemsOperation;

use crate::error::Result;
use crate::types::{MergeSummary, StreamPage};

/// Observer of stage progress
///
/// Called from inside the running stage, before the stage's node finishes, so anything
/// the listener adds to the queue is in place before the stage's dependents are released.
/// Stages never call the listener after they have been canceled.
pub trait StageListener: Send + Sync {
    /// A page arrived from the service
    ///
    /// An error fails the fetch node.
    fn page_fetched(&self, page: usize, contents: &StreamPage) -> Result<()>;

    /// A page was partitioned by feed
    fn items_grouped(&self, _page: usize, _feeds: usize, _items: usize, _skipped: usize) {}

    /// A page was merged into the store
    fn items_merged(&self, _page: usize, _summary: MergeSummary) {}
}
