use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use opscout_core::error::Result;
use opscout_core::traits::{KnowledgeQuery, TextGenerator};

use super::{patent_params, synthesize, EMERGING_THEME, NO_VALID_INPUT};
use crate::graph::{NodeHandler, StatePatch, WorkflowState};
use crate::personas;
use crate::trend::{describe_trend, parse_years, yearly_counts, YEAR_QUERY};

/// Filing-trend analysis over the selected patents.
pub struct EmergingThemeAnalysis {
    knowledge: Arc<dyn KnowledgeQuery>,
    generator: Arc<dyn TextGenerator>,
}

impl EmergingThemeAnalysis {
    pub fn new(knowledge: Arc<dyn KnowledgeQuery>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            knowledge,
            generator,
        }
    }

    pub async fn analyze(&self, items: &[String]) -> String {
        if items.is_empty() {
            return NO_VALID_INPUT.to_string();
        }

        let records = match self.knowledge.query(YEAR_QUERY, patent_params(items)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(node_id = EMERGING_THEME, error = %e, "Trend query failed");
                return format!("Trend analysis failed while querying the knowledge graph: {}", e);
            }
        };

        let counts = yearly_counts(&parse_years(&records));
        debug!(distinct_years = counts.len(), "Yearly filing counts collected");

        let findings = describe_trend(&counts);
        synthesize(
            &*self.generator,
            EMERGING_THEME,
            personas::TREND_ANALYST,
            items,
            &findings,
        )
        .await
    }
}

impl NodeHandler for EmergingThemeAnalysis {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>> {
        Box::pin(async move {
            let text = self.analyze(state.items()).await;
            Ok(StatePatch::node_output(EMERGING_THEME, text))
        })
    }
}
