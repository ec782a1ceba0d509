use crate::error::Result;
use crate::queue::{Operation, OperationContext};
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Sink node that signals once every node it depends on has succeeded
///
/// The node does no work of its own. The queue only starts it after all of its
/// dependencies finished successfully, so running it is the signal.
pub struct CheckpointOperation {
    fired: Mutex<Option<oneshot::Sender<()>>>,
}

impl CheckpointOperation {
    /// Create a checkpoint and the receiver its signal arrives on
    ///
    /// The receiver sees an error instead of a signal if the checkpoint is dropped
    /// without running, which happens when the queue is canceled or a dependency fails.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let checkpoint = Self {
            fired: Mutex::new(Some(tx)),
        };
        (checkpoint, rx)
    }
}

#[async_trait::async_trait]
impl Operation for CheckpointOperation {
    fn name(&self) -> String {
        "checkpoint".to_string()
    }

    async fn run(&self, ctx: OperationContext) -> Result<()> {
        if ctx.is_canceled() {
            return Ok(());
        }

        let sender = self
            .fired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            tracing::debug!(operation = %ctx.id, "Checkpoint reached");
            // The session may already have stopped listening
            sender.send(()).ok();
        }
        Ok(())
    }
}
