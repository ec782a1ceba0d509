//! Operation trait, per-run context, and the handoff slot stages use to pass results.

use crate::error::{Error, Result};
use crate::types::OperationId;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// A unit of cancellable asynchronous work scheduled by an [`OperationQueue`](super::OperationQueue)
///
/// Implementations must watch `ctx.cancel_token` and return promptly once it fires.
/// A canceled operation must not report a result to any listener; returning `Ok(())`
/// without output is the expected way to bow out.
#[async_trait::async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Short human-readable name used in logs and node events
    fn name(&self) -> String;

    /// Execute the operation
    async fn run(&self, ctx: OperationContext) -> Result<()>;
}

/// State handed to an operation when the queue starts it
#[derive(Clone, Debug)]
pub struct OperationContext {
    /// Identity of the node being run
    pub id: OperationId,
    /// Fires when the node (or the whole queue) is canceled
    pub cancel_token: CancellationToken,
}

impl OperationContext {
    /// Whether the node has been asked to stop
    pub fn is_canceled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// How a node ended
#[derive(Debug)]
pub enum NodeOutcome {
    /// The operation returned `Ok(())` and was not canceled
    Succeeded,
    /// The operation returned an error (or panicked)
    Failed(Error),
    /// The node was canceled while queued or running
    Canceled,
}

impl NodeOutcome {
    /// Whether dependents of this node may run
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }
}

/// Completion notice published by the queue for every node that was started
#[derive(Debug)]
pub struct NodeEvent {
    /// Node identity
    pub id: OperationId,
    /// Operation name
    pub name: String,
    /// How the node ended
    pub outcome: NodeOutcome,
}

/// Single-value slot passed by reference from a producing operation to its dependent
///
/// The producer `put`s its output before finishing; the consumer `take`s it once the
/// queue has started it, which only happens after the producer finished successfully.
/// Taking moves the value out, so ownership passes from stage to stage.
pub struct Handoff<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Handoff<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Store the producer's output, replacing anything already there
    pub fn put(&self, value: T) {
        *self.lock() = Some(value);
    }

    /// Move the output out of the slot
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether the producer has stored an output that was not yet taken
    pub fn is_filled(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // A panic while holding the lock cannot leave an Option half-written
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}
