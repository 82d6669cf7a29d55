pub mod analysis;
pub mod critic;
pub mod evaluation;
pub mod graph;
pub mod maturity;
pub mod personas;
pub mod pipeline;
pub mod recommend;
pub mod scoring;
pub mod trend;

pub use graph::{
    ExecutionResult, GraphExecutor, NodeHandler, NodeResult, OutputSlot, StatePatch, TaskNode,
    WorkflowState,
};
pub use maturity::{MaturityAssessment, MaturityStage};
pub use pipeline::OpportunityPipeline;
pub use recommend::recommend_patents;
pub use scoring::opportunity_score;
