use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use opscout_core::error::{OpscoutError, Result};
use opscout_core::event::EventBus;
use opscout_core::types::{NodeStatus, WorkflowEvent};

use super::node::TaskNode;
use super::state::{StatePatch, WorkflowState};

/// Used when a node sets no timeout of its own.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node_id: String,
    /// Whether the engine substituted degraded text for the node's output.
    pub degraded: bool,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Per-node results in completion order.
    pub node_results: Vec<NodeResult>,
    /// The terminal state with every patch merged.
    pub state: WorkflowState,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

struct NodeRun {
    index: usize,
    elapsed_ms: u64,
    outcome: Result<StatePatch>,
}

/// Executes a task DAG with concurrent fan-out.
///
/// Every node whose predecessors are all done is spawned immediately, so
/// independent branches never wait on each other. Patches are merged by a
/// single dispatch loop; handlers only ever see `Arc` snapshots of the state.
pub struct GraphExecutor {
    /// Nodes in topological order.
    nodes: Vec<TaskNode>,
    /// Predecessor positions, aligned with `nodes`.
    predecessors: Vec<Vec<usize>>,
    default_timeout: Duration,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("nodes", &self.node_ids())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl GraphExecutor {
    /// Validate the graph and build an executor for it.
    ///
    /// Rejects duplicate node ids, unknown predecessors, two nodes sharing
    /// an output slot, and dependency cycles.
    pub fn new(nodes: Vec<TaskNode>) -> Result<Self> {
        let order = topological_order(&nodes)?;

        let mut slots: Vec<Option<TaskNode>> = nodes.into_iter().map(Some).collect();
        let nodes: Vec<TaskNode> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        let position: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let predecessors = nodes
            .iter()
            .map(|n| {
                n.predecessors
                    .iter()
                    .filter_map(|p| position.get(p.as_str()).copied())
                    .collect()
            })
            .collect();

        Ok(Self {
            nodes,
            predecessors,
            default_timeout: DEFAULT_NODE_TIMEOUT,
            events: None,
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Publish progress events on the given bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Node ids in the order they would be scheduled.
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }

    /// Run the graph to completion from `initial`.
    ///
    /// A failing fatal node cancels every in-flight node and its error is
    /// returned. Cancelling `cancel` does the same and returns
    /// [`OpscoutError::Cancelled`].
    pub async fn execute(
        &self,
        initial: WorkflowState,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        let run_token = cancel.child_token();
        let mut state = initial;
        let mut status = vec![NodeStatus::Pending; self.nodes.len()];
        let mut node_results = Vec::with_capacity(self.nodes.len());
        let mut tasks: JoinSet<NodeRun> = JoinSet::new();
        let mut task_nodes: HashMap<task::Id, usize> = HashMap::new();

        self.spawn_ready(&state, &mut status, &mut tasks, &mut task_nodes, &run_token);

        while !tasks.is_empty() {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.abort(&mut tasks, &run_token, &mut status).await;
                    warn!("Workflow cancelled");
                    return Err(OpscoutError::Cancelled);
                }
                Some(joined) = tasks.join_next_with_id() => joined,
                else => break,
            };

            let run = match joined {
                Ok((id, run)) => {
                    task_nodes.remove(&id);
                    run
                }
                Err(e) => {
                    let node = task_nodes
                        .get(&e.id())
                        .map(|&i| self.nodes[i].id.clone())
                        .unwrap_or_else(|| "<unknown>".into());
                    let message = if e.is_panic() {
                        "handler panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    error!(node_id = %node, error = %message, "Node task failed, aborting run");
                    self.publish(WorkflowEvent::NodeFailed {
                        node_id: node.clone(),
                        error: message.clone(),
                    });
                    self.abort(&mut tasks, &run_token, &mut status).await;
                    return Err(OpscoutError::NodeFailed { node, message });
                }
            };

            let node = &self.nodes[run.index];
            let merged = match run.outcome {
                Ok(patch) if patch.slot() != node.output => Err(OpscoutError::NodeFailed {
                    node: node.id.clone(),
                    message: format!("wrote {} but declared {}", patch.slot(), node.output),
                }),
                Ok(patch) => state.apply(patch).map(|_| false),
                Err(e) if !node.fatal && !e.is_engine_failure() => {
                    warn!(node_id = %node.id, error = %e, "Node failed, continuing with degraded output");
                    state
                        .apply(node.output.patch(degraded_text(&node.id, &e)))
                        .map(|_| true)
                }
                Err(e) => Err(e),
            };

            match merged {
                Ok(degraded) => {
                    status[run.index] = NodeStatus::Done;
                    debug!(
                        node_id = %node.id,
                        degraded,
                        elapsed_ms = run.elapsed_ms,
                        "Node execution complete"
                    );
                    self.publish(WorkflowEvent::NodeCompleted {
                        node_id: node.id.clone(),
                        degraded,
                        elapsed_ms: run.elapsed_ms,
                    });
                    node_results.push(NodeResult {
                        node_id: node.id.clone(),
                        degraded,
                        elapsed_ms: run.elapsed_ms,
                    });
                }
                Err(e) => {
                    status[run.index] = NodeStatus::Failed;
                    error!(node_id = %node.id, error = %e, "Fatal node failure, aborting run");
                    self.publish(WorkflowEvent::NodeFailed {
                        node_id: node.id.clone(),
                        error: e.to_string(),
                    });
                    self.abort(&mut tasks, &run_token, &mut status).await;
                    return Err(e);
                }
            }

            self.spawn_ready(&state, &mut status, &mut tasks, &mut task_nodes, &run_token);
        }

        let unfinished: Vec<&str> = self
            .nodes
            .iter()
            .zip(&status)
            .filter(|(_, s)| **s != NodeStatus::Done)
            .map(|(n, _)| n.id.as_str())
            .collect();
        if !unfinished.is_empty() {
            return Err(OpscoutError::Config(format!(
                "nodes never became ready: {}",
                unfinished.join(", ")
            )));
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(nodes = node_results.len(), total_elapsed_ms, "Graph execution complete");

        Ok(ExecutionResult {
            node_results,
            state,
            total_elapsed_ms,
        })
    }

    /// Spawn every pending node whose predecessors are all done.
    fn spawn_ready(
        &self,
        state: &WorkflowState,
        status: &mut [NodeStatus],
        tasks: &mut JoinSet<NodeRun>,
        task_nodes: &mut HashMap<task::Id, usize>,
        token: &CancellationToken,
    ) {
        let mut snapshot: Option<Arc<WorkflowState>> = None;

        for (index, node) in self.nodes.iter().enumerate() {
            if status[index] != NodeStatus::Pending {
                continue;
            }
            if !self.predecessors[index]
                .iter()
                .all(|&p| status[p] == NodeStatus::Done)
            {
                continue;
            }

            let snapshot = snapshot
                .get_or_insert_with(|| Arc::new(state.clone()))
                .clone();
            status[index] = NodeStatus::Running;
            info!(node_id = %node.id, "Starting node");
            self.publish(WorkflowEvent::NodeStarted {
                node_id: node.id.clone(),
            });

            let handler = node.handler.clone();
            let limit = node.timeout.unwrap_or(self.default_timeout);
            let node_id = node.id.clone();
            let token = token.clone();

            let spawned = tasks.spawn(async move {
                let started = Instant::now();
                // Covers panics raised while the handler builds its future too
                let work =
                    AssertUnwindSafe(async move { handler.run(snapshot).await }).catch_unwind();

                let outcome = tokio::select! {
                    _ = token.cancelled() => Err(OpscoutError::Cancelled),
                    res = tokio::time::timeout(limit, work) => match res {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(_)) => Err(OpscoutError::NodeFailed {
                            node: node_id.clone(),
                            message: "handler panicked".into(),
                        }),
                        Err(_) => Err(OpscoutError::NodeTimeout {
                            node: node_id.clone(),
                            timeout_ms: limit.as_millis() as u64,
                        }),
                    },
                };

                NodeRun {
                    index,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    outcome,
                }
            });
            task_nodes.insert(spawned.id(), index);
        }
    }

    /// Cancel and drain every in-flight node.
    async fn abort(
        &self,
        tasks: &mut JoinSet<NodeRun>,
        token: &CancellationToken,
        status: &mut [NodeStatus],
    ) {
        token.cancel();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        for s in status.iter_mut() {
            match *s {
                NodeStatus::Pending => *s = NodeStatus::Skipped,
                NodeStatus::Running => *s = NodeStatus::Failed,
                _ => {}
            }
        }

        let skipped: Vec<&str> = self
            .nodes
            .iter()
            .zip(status.iter())
            .filter(|(_, s)| **s == NodeStatus::Skipped)
            .map(|(n, _)| n.id.as_str())
            .collect();
        if !skipped.is_empty() {
            warn!(skipped = %skipped.join(", "), "Run aborted before these nodes started");
        }
    }
}

fn degraded_text(node_id: &str, error: &OpscoutError) -> String {
    format!("[{}] analysis unavailable: {}", node_id, error)
}

/// Kahn's algorithm over the predecessor lists, after identity checks.
fn topological_order(nodes: &[TaskNode]) -> Result<Vec<usize>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(OpscoutError::DuplicateNode(node.id.clone()));
        }
    }

    let mut slots = HashSet::new();
    for node in nodes {
        if !slots.insert(&node.output) {
            return Err(OpscoutError::DuplicateOutputKey(node.output.to_string()));
        }
    }

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for pred in &node.predecessors {
            let p = *index
                .get(pred.as_str())
                .ok_or_else(|| OpscoutError::UnknownPredecessor {
                    node: node.id.clone(),
                    predecessor: pred.clone(),
                })?;
            in_degree[i] += 1;
            dependents[p].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck: Vec<&str> = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].id.as_str())
            .collect();
        return Err(OpscoutError::CycleDetected(stuck.join(", ")));
    }

    Ok(order)
}
