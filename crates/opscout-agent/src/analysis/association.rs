use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use opscout_core::error::Result;
use opscout_core::traits::{KnowledgeQuery, TextGenerator};
use opscout_core::types::Record;

use super::{count_field, patent_params, str_field, synthesize, ASSOCIATION, NO_VALID_INPUT};
use crate::graph::{NodeHandler, StatePatch, WorkflowState};
use crate::personas;

/// Technical implementations used by other patents in the same application
/// areas as the selected ones, with the number of such patents.
pub const ASSOCIATION_QUERY: &str = "MATCH (p1:Patent)-[:应用于]->(scene:应用领域) WHERE p1.name IN $patent_list
MATCH (scene)<-[:应用于]-(p2:Patent) WHERE NOT p2.name IN $patent_list
MATCH (p2)-[:实现方式是]->(t:技术实现)
RETURN t.name AS associated_tech, COUNT(DISTINCT p2) AS association_strength";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedTech {
    pub name: String,
    /// Distinct co-occurring patents.
    pub strength: u64,
}

/// Strongest first, ties broken by name; at most `limit` entries.
pub fn rank_associations(records: &[Record], limit: usize) -> Vec<AssociatedTech> {
    let mut ranked: Vec<AssociatedTech> = records
        .iter()
        .filter_map(|r| {
            Some(AssociatedTech {
                name: str_field(r, "associated_tech")?,
                strength: count_field(r, "association_strength"),
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.strength.cmp(&a.strength).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

pub fn describe_associations(ranked: &[AssociatedTech]) -> String {
    if ranked.is_empty() {
        return "No significant associated technologies were found in the application areas \
                of the selected patents."
            .to_string();
    }
    let parts: Vec<String> = ranked
        .iter()
        .map(|t| format!("{} (strength {})", t.name, t.strength))
        .collect();
    format!(
        "The most strongly associated technical implementations are: {}",
        parts.join(", ")
    )
}

pub struct AssociationAnalysis {
    knowledge: Arc<dyn KnowledgeQuery>,
    generator: Arc<dyn TextGenerator>,
    limit: usize,
}

impl AssociationAnalysis {
    pub fn new(
        knowledge: Arc<dyn KnowledgeQuery>,
        generator: Arc<dyn TextGenerator>,
        limit: usize,
    ) -> Self {
        Self {
            knowledge,
            generator,
            limit,
        }
    }

    pub async fn analyze(&self, items: &[String]) -> String {
        if items.is_empty() {
            return NO_VALID_INPUT.to_string();
        }

        let records = match self
            .knowledge
            .query(ASSOCIATION_QUERY, patent_params(items))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(node_id = ASSOCIATION, error = %e, "Association query failed");
                return format!("Association analysis failed while querying the knowledge graph: {}", e);
            }
        };

        let findings = describe_associations(&rank_associations(&records, self.limit));
        synthesize(
            &*self.generator,
            ASSOCIATION,
            personas::ASSOCIATION_ANALYST,
            items,
            &findings,
        )
        .await
    }
}

impl NodeHandler for AssociationAnalysis {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>> {
        Box::pin(async move {
            let text = self.analyze(state.items()).await;
            Ok(StatePatch::node_output(ASSOCIATION, text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscout_test_utils::{record, MockKnowledgeQuery, MockTextGenerator};
    use serde_json::json;

    fn rows() -> Vec<Record> {
        vec![
            record(json!({"associated_tech": "Thermal paste", "association_strength": 2})),
            record(json!({"associated_tech": "Vapor chamber", "association_strength": 5})),
            record(json!({"associated_tech": "Fan control", "association_strength": 2})),
            record(json!({"associated_tech": null, "association_strength": 9})),
        ]
    }

    #[test]
    fn test_rank_associations() {
        let ranked = rank_associations(&rows(), 10);
        let names: Vec<&str> = ranked.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Vapor chamber", "Fan control", "Thermal paste"]);
        assert_eq!(rank_associations(&rows(), 1).len(), 1);
    }

    #[test]
    fn test_describe_associations() {
        let text = describe_associations(&rank_associations(&rows(), 2));
        assert!(text.contains("Vapor chamber (strength 5), Fan control (strength 2)"));
        assert!(describe_associations(&[]).contains("No significant"));
    }

    #[tokio::test]
    async fn test_empty_items_skip_gateways() {
        let knowledge = Arc::new(MockKnowledgeQuery::new());
        let generator = Arc::new(MockTextGenerator::new());
        let node = AssociationAnalysis::new(knowledge.clone(), generator.clone(), 10);

        assert_eq!(node.analyze(&[]).await, NO_VALID_INPUT);
        assert_eq!(knowledge.call_count(), 0);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_becomes_text() {
        let knowledge = Arc::new(MockKnowledgeQuery::new().failing_on("技术实现", "connection refused"));
        let generator = Arc::new(MockTextGenerator::new());
        let node = AssociationAnalysis::new(knowledge, generator.clone(), 10);

        let text = node.analyze(&["A".into()]).await;
        assert!(text.contains("connection refused"));
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_findings_reach_generator() {
        let knowledge = Arc::new(MockKnowledgeQuery::new().with_rows("技术实现", rows()));
        let generator = Arc::new(MockTextGenerator::new().with_reply(ASSOCIATION, "assoc report"));
        let node = AssociationAnalysis::new(knowledge.clone(), generator.clone(), 10);

        let patch = node
            .run(Arc::new(WorkflowState::new(vec!["A".into()])))
            .await
            .unwrap();
        assert_eq!(patch, StatePatch::node_output(ASSOCIATION, "assoc report"));

        let (_, params) = &knowledge.calls()[0];
        assert_eq!(params["patent_list"], json!(["A"]));
        let call = &generator.calls_for(ASSOCIATION)[0];
        assert!(call.input.contains("Vapor chamber (strength 5)"));
    }
}
