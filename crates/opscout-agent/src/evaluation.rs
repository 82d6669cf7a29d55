use std::fmt::Write as _;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::{KnowledgeQuery, TextGenerator};

use crate::critic::{analyst_reports, NO_RESULT};
use crate::graph::{NodeHandler, StatePatch, WorkflowState};
use crate::maturity::{assess_maturity, MaturityAssessment};
use crate::personas;
use crate::scoring::opportunity_score;

pub const EVALUATION: &str = "Evaluation";

/// Structured strategy assessment requested from the generator.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategicAssessment {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Opportunity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Which prior findings the opportunity was derived from.
    #[serde(default)]
    pub evidence: String,
    pub hotness: f64,
    #[serde(default)]
    pub hotness_rationale: String,
    pub gap: f64,
    #[serde(default)]
    pub gap_rationale: String,
    pub maturity: f64,
    #[serde(default)]
    pub maturity_rationale: String,
}

/// An opportunity with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredOpportunity {
    pub opportunity: Opportunity,
    pub score: f64,
}

/// Extract JSON from text that may contain markdown code fences.
pub(crate) fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

pub fn parse_assessment(text: &str) -> Result<StrategicAssessment> {
    let assessment: StrategicAssessment = serde_json::from_str(extract_json(text))?;
    if assessment.opportunities.is_empty() {
        return Err(OpscoutError::Validation(
            "assessment contains no opportunities".into(),
        ));
    }
    Ok(assessment)
}

/// Score every opportunity against the assessed stage. Any out-of-range
/// input fails the whole batch.
pub fn score_opportunities(
    opportunities: &[Opportunity],
    maturity_stage: &str,
) -> Result<Vec<ScoredOpportunity>> {
    opportunities
        .iter()
        .map(|o| {
            let score = opportunity_score(o.hotness, o.gap, o.maturity, maturity_stage).map_err(
                |e| match e {
                    OpscoutError::Validation(msg) => {
                        OpscoutError::Validation(format!("opportunity '{}': {}", o.name, msg))
                    }
                    other => other,
                },
            )?;
            Ok(ScoredOpportunity {
                opportunity: o.clone(),
                score,
            })
        })
        .collect()
}

fn evaluation_prompt(state: &WorkflowState, maturity: &MaturityAssessment) -> String {
    format!(
        "You are producing a strategy report that a CEO and CTO can use directly for decisions. \
It must be credible and fully argued.

--- Intelligence ---
Your team analysed a core list of {count} patents and submitted three preliminary reports \
and an internal review:

{reports}

Internal review:
{critique}

Technology maturity assessment (computed from filing dates):
{maturity}
--- End of intelligence ---

Identify 2 to 3 concrete, promising technology innovation opportunities. For each one:
1. Describe the opportunity.
2. Link it to the specific findings above it derives from. Refer to the analyses by what \
they found, never as \"Report 1/2/3\".
3. Score hotness, gap, and maturity, each between 0.0 and 1.0, with a short rationale for \
every score.

Respond with a single JSON object and nothing else:
{{\"summary\": \"executive summary\", \"opportunities\": [{{\"name\": \"\", \"description\": \"\", \
\"evidence\": \"\", \"hotness\": 0.0, \"hotness_rationale\": \"\", \"gap\": 0.0, \
\"gap_rationale\": \"\", \"maturity\": 0.0, \"maturity_rationale\": \"\"}}], \
\"recommendations\": [\"1-2 highest-priority strategic recommendations\"]}}",
        count = state.items().len(),
        reports = analyst_reports(state),
        critique = state.critique().unwrap_or(NO_RESULT),
        maturity = maturity.text,
    )
}

pub fn render_report(
    assessment: &StrategicAssessment,
    scored: &[ScoredOpportunity],
    maturity: &MaturityAssessment,
) -> String {
    let mut out = String::from("# Strategic Opportunity Report\n\n## Executive Summary\n\n");
    let _ = writeln!(out, "{}\n", assessment.summary.trim());
    let _ = writeln!(out, "## Technology Maturity\n\n{}\n", maturity.text);
    out.push_str("## Innovation Opportunities\n");

    for (i, s) in scored.iter().enumerate() {
        let o = &s.opportunity;
        let _ = writeln!(out, "\n### Opportunity {}: {}\n", i + 1, o.name);
        if !o.description.is_empty() {
            let _ = writeln!(out, "{}\n", o.description);
        }
        let _ = writeln!(out, "- **Evidence:** {}", o.evidence);
        let _ = writeln!(out, "- **Maturity assessment:** {}", maturity.text);
        let _ = writeln!(out, "- **Hotness:** {:.2} - {}", o.hotness, o.hotness_rationale);
        let _ = writeln!(out, "- **Gap:** {:.2} - {}", o.gap, o.gap_rationale);
        let _ = writeln!(out, "- **Maturity:** {:.2} - {}", o.maturity, o.maturity_rationale);
        let _ = writeln!(out, "- **Final opportunity score:** {:.2} / 100", s.score);
    }

    out.push_str("\n## Strategic Recommendations\n\n");
    if assessment.recommendations.is_empty() {
        out.push_str("No recommendations were given.\n");
    }
    for (i, r) in assessment.recommendations.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, r);
    }
    out
}

/// A complete report for when the structured assessment is unavailable.
pub fn render_degraded_report(
    state: &WorkflowState,
    maturity: &MaturityAssessment,
    reason: &str,
) -> String {
    format!(
        "# Strategic Opportunity Report (degraded)\n\n\
         The strategy assessment could not be completed: {}\n\n\
         ## Technology Maturity\n\n{}\n\n\
         ## Analyst Findings\n\n{}\n\n\
         ## Internal Review\n\n{}\n",
        reason,
        maturity.text,
        analyst_reports(state),
        state.critique().unwrap_or(NO_RESULT)
    )
}

/// Terminal node: maturity assessment, structured assessment, scoring, report.
pub struct StrategyEvaluation {
    knowledge: Arc<dyn KnowledgeQuery>,
    generator: Arc<dyn TextGenerator>,
    current_year: i32,
}

impl StrategyEvaluation {
    pub fn new(
        knowledge: Arc<dyn KnowledgeQuery>,
        generator: Arc<dyn TextGenerator>,
        current_year: i32,
    ) -> Self {
        Self {
            knowledge,
            generator,
            current_year,
        }
    }

    pub async fn evaluate(&self, state: &WorkflowState) -> Result<String> {
        let maturity =
            assess_maturity(&*self.knowledge, state.items(), self.current_year).await;
        info!(stage = %maturity.stage, "Maturity assessed");

        let prompt = evaluation_prompt(state, &maturity);
        let raw = match self
            .generator
            .generate(EVALUATION, personas::STRATEGY_EVALUATOR, &prompt)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(node_id = EVALUATION, error = %e, "Assessment generation failed");
                return Ok(render_degraded_report(
                    state,
                    &maturity,
                    &format!("generation failed: {}", e),
                ));
            }
        };

        let assessment = match parse_assessment(&raw) {
            Ok(a) => a,
            Err(e) => {
                warn!(node_id = EVALUATION, error = %e, "Assessment could not be parsed");
                return Ok(render_degraded_report(
                    state,
                    &maturity,
                    &format!("unparseable assessment: {}", e),
                ));
            }
        };

        let scored = score_opportunities(&assessment.opportunities, maturity.stage.label())?;
        Ok(render_report(&assessment, &scored, &maturity))
    }
}

impl NodeHandler for StrategyEvaluation {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>> {
        Box::pin(async move {
            let report = self.evaluate(&state).await?;
            Ok(StatePatch::FinalReport(report))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscout_test_utils::{record, MockKnowledgeQuery, MockTextGenerator};
    use serde_json::json;

    const ASSESSMENT: &str = r#"Here is the assessment:
```json
{
  "summary": "Thermal management is fragmenting.",
  "opportunities": [
    {"name": "Leak-proof cold plates", "description": "Sealed plates", "evidence": "few solutions for coolant leaks",
     "hotness": 0.9, "hotness_rationale": "rising filings", "gap": 0.9, "gap_rationale": "no solutions",
     "maturity": 0.5, "maturity_rationale": "mid-stage"},
    {"name": "Quiet fans", "evidence": "noise complaints",
     "hotness": 0.5, "gap": 0.5, "maturity": 0.5}
  ],
  "recommendations": ["Prototype sealed plates"]
}
```"#;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new(vec!["A".into(), "B".into()]);
        state.apply(StatePatch::node_output("Association", "assoc")).unwrap();
        state.apply(StatePatch::Critique("thin data".into())).unwrap();
        state
    }

    fn knowledge_with_years(years: &[&str]) -> Arc<MockKnowledgeQuery> {
        let rows = years
            .iter()
            .map(|y| record(json!({"patent": "A", "year": y})))
            .collect();
        Arc::new(MockKnowledgeQuery::new().with_rows("ApplicationDate", rows))
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Sure! {\"a\":1} Done."), "{\"a\":1}");
        assert_eq!(extract_json("no json"), "no json");
    }

    #[test]
    fn test_parse_assessment() {
        let a = parse_assessment(ASSESSMENT).unwrap();
        assert_eq!(a.opportunities.len(), 2);
        assert_eq!(a.opportunities[1].description, "");
        assert!(parse_assessment("{\"summary\": \"x\"}").is_err());
        assert!(parse_assessment("not json at all").is_err());
    }

    #[test]
    fn test_score_opportunities_rejects_out_of_range() {
        let mut a = parse_assessment(ASSESSMENT).unwrap();
        a.opportunities[1].gap = 1.2;
        let err = score_opportunities(&a.opportunities, "mid-stage").unwrap_err();
        match err {
            OpscoutError::Validation(msg) => assert!(msg.contains("Quiet fans")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_full_report() {
        let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, ASSESSMENT));
        let node = StrategyEvaluation::new(knowledge_with_years(&["2018"]), generator.clone(), 2026);

        let report = node.evaluate(&state()).await.unwrap();
        assert!(report.starts_with("# Strategic Opportunity Report\n"));
        assert!(report.contains("### Opportunity 1: Leak-proof cold plates"));
        // 0.9/0.9/0.5 earns the synergy bonus: 82 + 20.
        assert!(report.contains("**Final opportunity score:** 100.00 / 100"));
        assert!(report.contains("**Final opportunity score:** 50.00 / 100"));
        assert!(report.contains("[mid-stage]"));
        assert!(report.contains("1. Prototype sealed plates"));

        let call = &generator.calls_for(EVALUATION)[0];
        assert_eq!(call.instructions, personas::STRATEGY_EVALUATOR);
        assert!(call.input.contains("core list of 2 patents"));
        assert!(call.input.contains("thin data"));
        assert!(call.input.contains("[mid-stage]"));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades() {
        let generator = Arc::new(MockTextGenerator::new().failing_for(EVALUATION));
        let node = StrategyEvaluation::new(knowledge_with_years(&["2026"]), generator, 2026);

        let report = node.evaluate(&state()).await.unwrap();
        assert!(report.starts_with("# Strategic Opportunity Report (degraded)"));
        assert!(report.contains("generation failed"));
        assert!(report.contains("[nascent]"));
        assert!(report.contains("assoc"));
    }

    #[tokio::test]
    async fn test_unparseable_output_degrades() {
        let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, "I cannot comply."));
        let node = StrategyEvaluation::new(knowledge_with_years(&[]), generator, 2026);

        let report = node.evaluate(&state()).await.unwrap();
        assert!(report.contains("unparseable assessment"));
        assert!(report.contains("No year data"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_fatal() {
        let bad = ASSESSMENT.replace("\"hotness\": 0.5", "\"hotness\": 1.5");
        let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, bad));
        let node = StrategyEvaluation::new(knowledge_with_years(&["2018"]), generator, 2026);

        let err = node
            .run(Arc::new(state()))
            .await
            .unwrap_err();
        assert!(matches!(err, OpscoutError::Validation(_)));
    }
}
