//! Task-DAG execution engine.
//!
//! A workflow is a set of `TaskNode`s, each naming the nodes it depends on and
//! the single `OutputSlot` it writes. The `GraphExecutor` validates the graph
//! up front, then spawns every node as soon as its predecessors are done and
//! merges the returned `StatePatch`es into one `WorkflowState`.

pub mod executor;
pub mod node;
pub mod state;

pub use executor::{ExecutionResult, GraphExecutor, NodeResult, DEFAULT_NODE_TIMEOUT};
pub use node::{NodeHandler, TaskNode};
pub use state::{OutputSlot, StatePatch, WorkflowState};
