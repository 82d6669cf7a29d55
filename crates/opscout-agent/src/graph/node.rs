use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use opscout_core::error::Result;

use super::state::{OutputSlot, StatePatch, WorkflowState};

/// The work a task node performs: a snapshot of the state in, a patch out.
pub trait NodeHandler: Send + Sync + 'static {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>>;
}

/// A node in the task graph.
///
/// A node with no predecessors starts with the run. A node with several
/// predecessors is a join barrier: it starts only once all of them are done.
#[derive(Clone)]
pub struct TaskNode {
    /// Unique identifier for this node.
    pub id: String,
    /// Nodes that must complete before this one starts.
    pub predecessors: Vec<String>,
    /// The only slot this node may write.
    pub output: OutputSlot,
    /// Whether a failure aborts the whole run.
    pub fatal: bool,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
    pub(crate) handler: Arc<dyn NodeHandler>,
}

impl TaskNode {
    /// Create a non-fatal node with no predecessors.
    pub fn new(id: impl Into<String>, output: OutputSlot, handler: Arc<dyn NodeHandler>) -> Self {
        Self {
            id: id.into(),
            predecessors: Vec::new(),
            output,
            fatal: false,
            timeout: None,
            handler,
        }
    }

    /// Set the predecessor set.
    pub fn after<I, S>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predecessors = predecessors.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the node fatal-on-error.
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("predecessors", &self.predecessors)
            .field("output", &self.output)
            .field("fatal", &self.fatal)
            .field("timeout", &self.timeout)
            .finish()
    }
}
