//! Operation queue - executes a growing graph of dependent operations on the tokio pool.
//!
//! Nodes are added with a set of dependencies and become eligible once every dependency
//! has finished successfully. Edges can be added later with
//! [`OperationQueue::add_dependency`] as long as the dependent has not started, which is
//! what lets a sink node wait on work that did not exist when the sink was created.
//!
//! - [`OperationQueue::suspend`] / [`OperationQueue::resume`] gate whether eligible nodes
//!   may start, so a caller can wire several nodes before any of them runs.
//! - [`OperationQueue::cancel_all`] cancels every queued node and asks running nodes to
//!   stop through their [`CancellationToken`].
//! - Every started node reports a [`NodeEvent`] on the channel returned by
//!   [`OperationQueue::new`]. By default a failed node simply never releases its
//!   dependents; with [`OperationQueue::set_cancel_on_failure`] the first failure cancels
//!   the whole queue before any other node can start.

mod operation;


pub use operation::{Handoff, NodeEvent, NodeOutcome, Operation, OperationContext};

use crate::error::{Error, Result};
use crate::types::{OperationId, OperationState};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Receiving end of a queue's node completion notices
pub type NodeEvents = mpsc::UnboundedReceiver<NodeEvent>;

/// Executor over a dynamically growing dependency graph (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    /// Node table and queue flags; every graph mutation happens under this lock
    graph: Mutex<Graph>,
    /// Parent of every node's cancellation token
    cancel_token: CancellationToken,
    /// Limits how many nodes run at once
    concurrent_limit: Arc<Semaphore>,
    /// Completion notices for started nodes
    events_tx: mpsc::UnboundedSender<NodeEvent>,
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<OperationId, Node>,
    next_id: u64,
    suspended: bool,
    canceled: bool,
    cancel_on_failure: bool,
}

struct Node {
    name: String,
    /// Taken when the node starts, or dropped when it is canceled
    operation: Option<Arc<dyn Operation>>,
    state: OperationState,
    /// Dependencies that have not finished yet
    waiting_on: HashSet<OperationId>,
    /// Every dependency ever declared, finished or not
    dependencies: Vec<OperationId>,
    dependents: Vec<OperationId>,
    /// A dependency failed or was canceled, so this node can never run
    blocked: bool,
    /// Finished with an error
    error: Option<String>,
}

impl Node {
    fn is_ready(&self) -> bool {
        self.state == OperationState::Pending && self.waiting_on.is_empty() && !self.blocked
    }

    fn succeeded(&self) -> bool {
        self.state == OperationState::Finished && self.error.is_none()
    }
}

impl OperationQueue {
    /// Create an empty queue allowing `max_concurrent` nodes to run at once
    ///
    /// Returns the queue and the receiver of its node completion notices.
    pub fn new(max_concurrent: usize) -> (Self, NodeEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(QueueInner {
                graph: Mutex::new(Graph::default()),
                cancel_token: CancellationToken::new(),
                concurrent_limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
                events_tx,
            }),
        };
        (queue, events_rx)
    }

    /// Insert a node that runs after every node in `depends_on` finishes successfully
    ///
    /// # Errors
    /// Returns [`Error::Queue`] if a dependency is not part of this queue.
    pub fn add(
        &self,
        operation: Arc<dyn Operation>,
        depends_on: &[OperationId],
    ) -> Result<OperationId> {
        let mut graph = self.lock();

        if let Some(missing) = depends_on.iter().find(|dep| !graph.nodes.contains_key(dep)) {
            return Err(Error::Queue(format!("unknown dependency {}", missing)));
        }

        let id = OperationId(graph.next_id);
        graph.next_id += 1;

        let name = operation.name();
        let mut node = Node {
            name: name.clone(),
            operation: Some(operation),
            state: OperationState::Pending,
            waiting_on: HashSet::new(),
            dependencies: depends_on.to_vec(),
            dependents: Vec::new(),
            blocked: false,
            error: None,
        };

        for dep_id in depends_on {
            if let Some(dep) = graph.nodes.get_mut(dep_id) {
                link(&mut node, id, *dep_id, dep);
            }
        }

        if graph.canceled {
            node.state = OperationState::Canceled;
            node.operation = None;
        }

        tracing::trace!(operation = %id, name = %name, deps = depends_on.len(), "Node added");
        graph.nodes.insert(id, node);
        self.start_ready(&mut graph);

        Ok(id)
    }

    /// Make a still-pending node additionally wait for `dependency`
    ///
    /// An already-successful dependency is satisfied immediately; a failed or canceled
    /// one leaves the dependent permanently ineligible.
    ///
    /// # Errors
    /// Returns [`Error::Queue`] if either node is unknown, the dependent already
    /// started, or the edge would create a cycle.
    pub fn add_dependency(&self, dependent: OperationId, dependency: OperationId) -> Result<()> {
        let mut graph = self.lock();

        if dependent == dependency {
            return Err(Error::Queue(format!("{} cannot depend on itself", dependent)));
        }
        if !graph.nodes.contains_key(&dependency) {
            return Err(Error::Queue(format!("unknown dependency {}", dependency)));
        }
        match graph.nodes.get(&dependent) {
            None => return Err(Error::Queue(format!("unknown operation {}", dependent))),
            Some(node) if graph.canceled && node.state == OperationState::Canceled => {
                return Ok(());
            }
            Some(node) if node.state != OperationState::Pending => {
                return Err(Error::Queue(format!(
                    "{} ({}) already started; cannot add dependency {}",
                    dependent, node.name, dependency
                )));
            }
            Some(_) => {}
        }
        if depends_transitively(&graph, dependency, dependent) {
            return Err(Error::Queue(format!(
                "{} -> {} would create a cycle",
                dependent, dependency
            )));
        }

        // Both nodes exist; take the dependent out to borrow the dependency mutably
        if let Some(mut node) = graph.nodes.remove(&dependent) {
            node.dependencies.push(dependency);
            if let Some(dep) = graph.nodes.get_mut(&dependency) {
                link(&mut node, dependent, dependency, dep);
            }
            let downstream = if node.blocked {
                node.dependents.clone()
            } else {
                Vec::new()
            };
            graph.nodes.insert(dependent, node);
            block_downstream(&mut graph, downstream);
        }

        self.start_ready(&mut graph);
        Ok(())
    }

    /// Stop eligible nodes from starting until [`resume`](Self::resume) is called
    ///
    /// Nodes that are already running are not affected.
    pub fn suspend(&self) {
        self.lock().suspended = true;
    }

    /// Allow eligible nodes to start again and start every node that is ready now
    pub fn resume(&self) {
        let mut graph = self.lock();
        graph.suspended = false;
        self.start_ready(&mut graph);
    }

    /// Cancel every queued node and signal every running node to stop
    ///
    /// Nodes added afterwards are canceled on insertion. Idempotent.
    pub fn cancel_all(&self) {
        let mut graph = self.lock();
        self.cancel_locked(&mut graph);
    }

    /// Make the first failed node cancel the whole queue
    ///
    /// The cancellation happens while the failure is recorded, so no other node can
    /// start in between. Nodes already running are signaled as with
    /// [`cancel_all`](Self::cancel_all).
    pub fn set_cancel_on_failure(&self, enabled: bool) {
        self.lock().cancel_on_failure = enabled;
    }

    /// Whether eligible nodes are currently held back
    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    /// Whether [`cancel_all`](Self::cancel_all) has been called
    pub fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    /// Current state of a node
    pub fn state(&self, id: OperationId) -> Option<OperationState> {
        self.lock().nodes.get(&id).map(|node| node.state)
    }

    /// Error message of a node that finished unsuccessfully
    pub fn error(&self, id: OperationId) -> Option<String> {
        self.lock().nodes.get(&id).and_then(|node| node.error.clone())
    }

    /// Every dependency ever declared for a node, in the order they were added
    pub fn dependencies(&self, id: OperationId) -> Vec<OperationId> {
        self.lock()
            .nodes
            .get(&id)
            .map(|node| node.dependencies.clone())
            .unwrap_or_default()
    }

    /// Number of nodes ever added
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Whether no node was ever added
    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// Number of nodes that are neither finished nor canceled
    pub fn outstanding(&self) -> usize {
        self.lock()
            .nodes
            .values()
            .filter(|node| !node.state.is_terminal() && !node.blocked)
            .count()
    }

    fn cancel_locked(&self, graph: &mut Graph) {
        if graph.canceled {
            return;
        }
        graph.canceled = true;
        self.inner.cancel_token.cancel();

        let mut canceled = 0usize;
        for node in graph.nodes.values_mut() {
            if node.state == OperationState::Pending {
                node.state = OperationState::Canceled;
                node.operation = None;
                canceled += 1;
            }
        }
        tracing::debug!(canceled, "Canceled all queued operations");
    }

    fn lock(&self) -> MutexGuard<'_, Graph> {
        // Graph updates are applied field by field with no await points, so the data
        // is consistent even if a holder panicked
        self.inner
            .graph
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start every node that is eligible right now (caller holds the graph lock)
    fn start_ready(&self, graph: &mut Graph) {
        if graph.suspended || graph.canceled {
            return;
        }

        let ready: Vec<OperationId> = graph
            .nodes
            .iter()
            .filter(|(_, node)| node.is_ready())
            .map(|(id, _)| *id)
            .collect();

        for id in ready {
            let Some(node) = graph.nodes.get_mut(&id) else {
                continue;
            };
            let Some(operation) = node.operation.take() else {
                continue;
            };
            node.state = OperationState::Executing;
            self.spawn(id, node.name.clone(), operation);
        }
    }

    fn spawn(&self, id: OperationId, name: String, operation: Arc<dyn Operation>) {
        let queue = self.clone();
        let cancel_token = self.inner.cancel_token.child_token();
        let concurrent_limit = Arc::clone(&self.inner.concurrent_limit);

        tokio::spawn(async move {
            // Acquire a permit (blocks if at max concurrent operations)
            let permit = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                permit = concurrent_limit.acquire_owned() => permit.ok(),
            };

            let Some(_permit) = permit else {
                queue.finish(id, name, NodeOutcome::Canceled);
                return;
            };

            tracing::debug!(operation = %id, name = %name, "Operation started");

            let ctx = OperationContext {
                id,
                cancel_token: cancel_token.clone(),
            };
            let result = AssertUnwindSafe(operation.run(ctx)).catch_unwind().await;

            let outcome = match result {
                _ if cancel_token.is_cancelled() => NodeOutcome::Canceled,
                Ok(Ok(())) => NodeOutcome::Succeeded,
                Ok(Err(e)) => NodeOutcome::Failed(e),
                Err(_) => NodeOutcome::Failed(Error::Other(format!(
                    "operation {} ({}) panicked",
                    id, name
                ))),
            };

            queue.finish(id, name, outcome);
        });
    }

    /// Record a node's outcome, release or block its dependents, and publish the notice
    fn finish(&self, id: OperationId, name: String, outcome: NodeOutcome) {
        {
            let mut graph = self.lock();

            let dependents = match graph.nodes.get_mut(&id) {
                Some(node) => {
                    match &outcome {
                        NodeOutcome::Succeeded => node.state = OperationState::Finished,
                        NodeOutcome::Failed(e) => {
                            node.state = OperationState::Finished;
                            node.error = Some(e.to_string());
                        }
                        NodeOutcome::Canceled => node.state = OperationState::Canceled,
                    }
                    node.dependents.clone()
                }
                None => Vec::new(),
            };

            if outcome.is_success() {
                for dependent_id in dependents {
                    if let Some(dependent) = graph.nodes.get_mut(&dependent_id) {
                        dependent.waiting_on.remove(&id);
                    }
                }
            } else {
                block_downstream(&mut graph, dependents);
                if matches!(outcome, NodeOutcome::Failed(_)) && graph.cancel_on_failure {
                    self.cancel_locked(&mut graph);
                }
            }

            self.start_ready(&mut graph);
        }

        match &outcome {
            NodeOutcome::Succeeded => {
                tracing::debug!(operation = %id, name = %name, "Operation finished")
            }
            NodeOutcome::Failed(e) => {
                tracing::warn!(operation = %id, name = %name, error = %e, "Operation failed")
            }
            NodeOutcome::Canceled => {
                tracing::debug!(operation = %id, name = %name, "Operation canceled")
            }
        }

        // The receiver is gone only when nobody is interested in outcomes any more
        self.inner
            .events_tx
            .send(NodeEvent { id, name, outcome })
            .ok();
    }
}

/// Record that `node` (with identity `node_id`) waits on `dep` (with identity `dep_id`)
fn link(node: &mut Node, node_id: OperationId, dep_id: OperationId, dep: &mut Node) {
    if dep.succeeded() {
        return;
    }
    if dep.state.is_terminal() || dep.blocked {
        node.blocked = true;
        node.operation = None;
        return;
    }
    node.waiting_on.insert(dep_id);
    dep.dependents.push(node_id);
}

/// Mark every node reachable through dependent edges as never runnable
fn block_downstream(graph: &mut Graph, mut stack: Vec<OperationId>) {
    while let Some(id) = stack.pop() {
        if let Some(node) = graph.nodes.get_mut(&id) {
            if node.blocked || node.state != OperationState::Pending {
                continue;
            }
            node.blocked = true;
            node.operation = None;
            stack.extend(node.dependents.iter().copied());
        }
    }
}

/// Whether `from` (transitively) waits on `target`
fn depends_transitively(graph: &Graph, from: OperationId, target: OperationId) -> bool {
    let mut stack = vec![from];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(node) = graph.nodes.get(&current) {
            stack.extend(node.waiting_on.iter().copied());
        }
    }
    false
}
