//! Caller-side view of a running sync: its handle, canceler and terminal outcome.

use crate::error::Error;
use crate::types::{ResourceId, SessionState, SyncReport};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal outcome of a sync session
#[derive(Debug)]
pub enum SyncOutcome {
    /// Every page was fetched and merged
    Finished(SyncReport),
    /// A stage failed; the session was aborted and nothing was rolled back
    Failed(Error),
    /// The session was canceled by the caller
    Canceled,
}

impl SyncOutcome {
    /// Whether the stream was fully ingested
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Finished(_))
    }

    /// Report of a successful session
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Finished(report) => Some(report),
            _ => None,
        }
    }

    /// Error of a failed session
    pub fn error(&self) -> Option<&Error> {
        match self {
            SyncOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Session state this outcome leaves the session in
    pub fn state(&self) -> SessionState {
        match self {
            SyncOutcome::Finished(_) => SessionState::Finished,
            SyncOutcome::Failed(_) => SessionState::Failed,
            SyncOutcome::Canceled => SessionState::Canceled,
        }
    }
}

/// Cancels a running session; cloneable and usable from any task
#[derive(Clone, Debug)]
pub struct SyncCanceler {
    token: CancellationToken,
}

impl SyncCanceler {
    /// Ask the session to stop (idempotent)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Handle to a started sync session
///
/// Dropping the handle does not stop the session.
pub struct SyncHandle {
    resource: ResourceId,
    cancel_token: CancellationToken,
    state: watch::Receiver<SessionState>,
    outcome: oneshot::Receiver<SyncOutcome>,
}

impl SyncHandle {
    pub(super) fn new(
        resource: ResourceId,
        cancel_token: CancellationToken,
        state: watch::Receiver<SessionState>,
        outcome: oneshot::Receiver<SyncOutcome>,
    ) -> Self {
        Self {
            resource,
            cancel_token,
            state,
            outcome,
        }
    }

    /// Stream being synced
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Cancel the session
    ///
    /// Safe to call at any time and any number of times. Unless the session already
    /// ended, its outcome will be [`SyncOutcome::Canceled`].
    pub fn cancel(&self) {
        if !self.cancel_token.is_cancelled() {
            tracing::debug!(resource = %self.resource, "Sync cancellation requested");
        }
        self.cancel_token.cancel();
    }

    /// A cloneable canceler for use after the handle has been consumed
    pub fn canceler(&self) -> SyncCanceler {
        SyncCanceler {
            token: self.cancel_token.clone(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Finished | SessionState::Failed | SessionState::Canceled
        )
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> SyncOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            // Only reachable if the session task panicked
            Err(_) => SyncOutcome::Failed(Error::Other(
                "sync session ended without reporting an outcome".to_string(),
            )),
        }
    }

    /// Run `callback` with the terminal outcome once the session ends
    ///
    /// Use [`canceler`](Self::canceler) first if the session may need canceling later.
    pub fn on_finish<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(SyncOutcome) + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = self.wait().await;
            callback(outcome);
        })
    }
}
