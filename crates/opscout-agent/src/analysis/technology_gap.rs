use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use opscout_core::error::Result;
use opscout_core::traits::{KnowledgeQuery, TextGenerator};
use opscout_core::types::Record;

use super::{count_field, patent_params, str_field, synthesize, NO_VALID_INPUT, TECHNOLOGY_GAP};
use crate::graph::{NodeHandler, StatePatch, WorkflowState};
use crate::personas;

/// For every problem the selected patents address: the number of distinct
/// technical solutions anywhere in the graph, and one application-area name
/// per (patent, area) pair among patents addressing that problem.
pub const GAP_QUERY: &str = "MATCH (p:Patent)-[:旨在解决]->(problem:待解决问题) WHERE p.name IN $patent_list
WITH DISTINCT problem
OPTIONAL MATCH (problem)<-[:旨在解决]-(:Patent)-[:实现方式是]->(tech:技术实现)
WITH problem, COUNT(DISTINCT tech) AS tech_count
OPTIONAL MATCH (problem)<-[:旨在解决]-(sp:Patent)-[:应用于]->(scene:应用领域)
RETURN problem.name AS problem_name, tech_count, collect(scene.name) AS scenes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapFinding {
    pub problem: String,
    /// Distinct known technical solutions for the problem.
    pub tech_count: u64,
    /// Distinct application areas the problem appears in.
    pub area_count: usize,
    /// Most frequent application area; ties go to the smallest name.
    pub top_area: Option<String>,
}

fn top_area(scenes: &[String]) -> Option<String> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for s in scenes {
        *freq.entry(s.as_str()).or_insert(0) += 1;
    }
    freq.into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string())
}

fn scene_names(record: &Record) -> Vec<String> {
    match record.get("scenes") {
        Some(serde_json::Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Least-served problems first, ties broken by name; at most `limit` entries.
pub fn rank_gaps(records: &[Record], limit: usize) -> Vec<GapFinding> {
    let mut findings: Vec<GapFinding> = records
        .iter()
        .filter_map(|r| {
            let problem = str_field(r, "problem_name")?;
            let scenes = scene_names(r);
            Some(GapFinding {
                problem,
                tech_count: count_field(r, "tech_count"),
                area_count: scenes.iter().collect::<BTreeSet<_>>().len(),
                top_area: top_area(&scenes),
            })
        })
        .collect();
    findings.sort_by(|a, b| {
        a.tech_count
            .cmp(&b.tech_count)
            .then_with(|| a.problem.cmp(&b.problem))
    });
    findings.truncate(limit);
    findings
}

pub fn describe_gaps(findings: &[GapFinding]) -> String {
    if findings.is_empty() {
        return "No obvious technology gaps were found in the problem domains of the selected patents."
            .to_string();
    }
    let lines: Vec<String> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "{}. Problem: [{}] (known technical solutions across the graph: {}; \
                 application areas: {}, mainly [{}])",
                i + 1,
                f.problem,
                f.tech_count,
                f.area_count,
                f.top_area.as_deref().unwrap_or("none yet")
            )
        })
        .collect();
    format!(
        "Potential technology gaps in the problem domains of the selected patents:\n{}",
        lines.join("\n")
    )
}

/// Finds the problems with the fewest known solutions.
pub struct TechnologyGapAnalysis {
    knowledge: Arc<dyn KnowledgeQuery>,
    generator: Arc<dyn TextGenerator>,
    limit: usize,
}

impl TechnologyGapAnalysis {
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

        let records = match self.knowledge.query(GAP_QUERY, patent_params(items)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(node_id = TECHNOLOGY_GAP, error = %e, "Gap query failed");
                return format!(
                    "Technology gap analysis failed while querying the knowledge graph: {}",
                    e
                );
            }
        };

        let findings = describe_gaps(&rank_gaps(&records, self.limit));
        synthesize(
            &*self.generator,
            TECHNOLOGY_GAP,
            personas::GAP_ANALYST,
            items,
            &findings,
        )
        .await
    }
}

impl NodeHandler for TechnologyGapAnalysis {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>> {
        Box::pin(async move {
            let text = self.analyze(state.items()).await;
            Ok(StatePatch::node_output(TECHNOLOGY_GAP, text))
        })
    }
}
