use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use opscout_core::config::WorkflowConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::event::EventBus;
use opscout_core::traits::{KnowledgeQuery, TextGenerator};
use opscout_core::types::WorkflowEvent;

use crate::analysis::{
    AssociationAnalysis, EmergingThemeAnalysis, TechnologyGapAnalysis, ASSOCIATION,
    EMERGING_THEME, TECHNOLOGY_GAP,
};
use crate::critic::{CriticReview, CRITIC};
use crate::evaluation::{StrategyEvaluation, EVALUATION};
use crate::graph::{GraphExecutor, OutputSlot, TaskNode, WorkflowState};

/// The opportunity-scouting workflow.
///
/// Association, emerging-theme and technology-gap analyses run concurrently;
/// the critic joins on all three; the strategy evaluation writes the report.
pub struct OpportunityPipeline {
    knowledge: Arc<dyn KnowledgeQuery>,
    generator: Arc<dyn TextGenerator>,
    workflow: WorkflowConfig,
    events: Arc<EventBus>,
    current_year: i32,
}

impl OpportunityPipeline {
    pub fn new(
        knowledge: Arc<dyn KnowledgeQuery>,
        generator: Arc<dyn TextGenerator>,
        workflow: WorkflowConfig,
    ) -> Self {
        Self {
            knowledge,
            generator,
            workflow,
            events: Arc::new(EventBus::default()),
            current_year: chrono::Utc::now().year(),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Fix the year maturity is judged against.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Assemble and validate the workflow graph.
    pub fn build_graph(&self) -> Result<GraphExecutor> {
        let nodes = vec![
            TaskNode::new(
                ASSOCIATION,
                OutputSlot::NodeOutput(ASSOCIATION.into()),
                Arc::new(AssociationAnalysis::new(
                    self.knowledge.clone(),
                    self.generator.clone(),
                    self.workflow.max_associations,
                )),
            ),
            TaskNode::new(
                EMERGING_THEME,
                OutputSlot::NodeOutput(EMERGING_THEME.into()),
                Arc::new(EmergingThemeAnalysis::new(
                    self.knowledge.clone(),
                    self.generator.clone(),
                )),
            ),
            TaskNode::new(
                TECHNOLOGY_GAP,
                OutputSlot::NodeOutput(TECHNOLOGY_GAP.into()),
                Arc::new(TechnologyGapAnalysis::new(
                    self.knowledge.clone(),
                    self.generator.clone(),
                    self.workflow.max_gap_findings,
                )),
            ),
            TaskNode::new(
                CRITIC,
                OutputSlot::Critique,
                Arc::new(CriticReview::new(self.generator.clone())),
            )
            .after([ASSOCIATION, EMERGING_THEME, TECHNOLOGY_GAP])
            .fatal(),
            TaskNode::new(
                EVALUATION,
                OutputSlot::FinalReport,
                Arc::new(StrategyEvaluation::new(
                    self.knowledge.clone(),
                    self.generator.clone(),
                    self.current_year,
                )),
            )
            .after([CRITIC])
            .fatal(),
        ];

        Ok(GraphExecutor::new(nodes)?
            .with_default_timeout(Duration::from_secs(self.workflow.node_timeout_secs))
            .with_event_bus(self.events.clone()))
    }

    /// Run the workflow over `items` and return the final report.
    pub async fn run(&self, items: Vec<String>) -> Result<String> {
        self.run_with_cancel(items, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        items: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id);
        self.run_inner(run_id, items, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: String,
        items: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<String> {
        let start = Instant::now();
        info!(items = items.len(), "Workflow run started");
        self.events.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            items: items.len(),
        });

        let outcome = match self.build_graph() {
            Ok(graph) => graph.execute(WorkflowState::new(items), cancel).await,
            Err(e) => Err(e),
        };
        let report = outcome.and_then(|result| {
            result
                .state
                .final_report()
                .filter(|r| !r.trim().is_empty())
                .map(String::from)
                .ok_or(OpscoutError::NoReport)
        });

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(succeeded = report.is_ok(), elapsed_ms, "Workflow run finished");
        self.events.publish(WorkflowEvent::RunCompleted {
            run_id,
            succeeded: report.is_ok(),
            elapsed_ms,
        });
        report
    }
}
