use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use opscout_agent::analysis::{ASSOCIATION, EMERGING_THEME, TECHNOLOGY_GAP};
use opscout_agent::critic::CRITIC;
use opscout_agent::evaluation::EVALUATION;
use opscout_agent::{OpportunityPipeline, WorkflowState};
use opscout_core::config::WorkflowConfig;
use opscout_core::error::OpscoutError;
use opscout_core::types::WorkflowEvent;
use opscout_test_utils::{record, MockKnowledgeQuery, MockTextGenerator};

const ASSESSMENT: &str = r#"{
  "summary": "Cooling demand is outpacing solutions.",
  "opportunities": [
    {"name": "Sealed cold plates", "evidence": "coolant leaks have no known solution",
     "hotness": 0.7, "hotness_rationale": "steady filings",
     "gap": 0.9, "gap_rationale": "zero solutions",
     "maturity": 0.6, "maturity_rationale": "mid-stage cluster"}
  ],
  "recommendations": ["Build a sealed cold plate prototype"]
}"#;

fn knowledge() -> Arc<MockKnowledgeQuery> {
    Arc::new(
        MockKnowledgeQuery::new()
            .with_rows(
                "技术实现)\nRETURN t.name",
                vec![record(json!({"associated_tech": "Vapor chamber", "association_strength": 4}))],
            )
            .with_rows(
                "待解决问题",
                vec![record(json!({
                    "problem_name": "Coolant leaks",
                    "tech_count": 0,
                    "scenes": ["Servers"]
                }))],
            )
            .with_rows(
                "ApplicationDate",
                vec![
                    record(json!({"patent": "A", "year": "2018"})),
                    record(json!({"patent": "B", "year": "2019"})),
                    record(json!({"patent": "C", "year": "2020"})),
                    record(json!({"patent": "D", "year": "2021"})),
                ],
            ),
    )
}

fn items() -> Vec<String> {
    vec!["A".into(), "B".into(), "C".into(), "D".into()]
}

fn pipeline(generator: Arc<MockTextGenerator>) -> OpportunityPipeline {
    OpportunityPipeline::new(knowledge(), generator, WorkflowConfig::default()).with_current_year(2026)
}

#[tokio::test]
async fn test_full_run_produces_scored_report() {
    let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, ASSESSMENT));
    let report = pipeline(generator.clone()).run(items()).await.unwrap();

    assert!(report.contains("### Opportunity 1: Sealed cold plates"));
    // 100 * (0.21 + 0.45 + 0.12) = 78
    assert!(report.contains("**Final opportunity score:** 78.00 / 100"));
    assert!(report.contains("[mid-stage]"));

    for role in [ASSOCIATION, EMERGING_THEME, TECHNOLOGY_GAP, CRITIC, EVALUATION] {
        assert_eq!(generator.calls_for(role).len(), 1, "{} should run once", role);
    }

    let critic_input = &generator.calls_for(CRITIC)[0].input;
    assert!(critic_input.contains("Association report"));
    assert!(critic_input.contains("EmergingTheme report"));
    assert!(critic_input.contains("TechnologyGap report"));

    let evaluation_input = &generator.calls_for(EVALUATION)[0].input;
    assert!(evaluation_input.contains("Critic report"));
}

#[tokio::test]
async fn test_completion_order_does_not_change_outputs() {
    let fast_first = Arc::new(
        MockTextGenerator::new()
            .with_delay(ASSOCIATION, Duration::from_millis(60))
            .with_delay(EMERGING_THEME, Duration::from_millis(30)),
    );
    let slow_first = Arc::new(
        MockTextGenerator::new()
            .with_delay(TECHNOLOGY_GAP, Duration::from_millis(60))
            .with_delay(EMERGING_THEME, Duration::from_millis(30)),
    );

    let a = pipeline(fast_first)
        .build_graph()
        .unwrap()
        .execute(WorkflowState::new(items()), CancellationToken::new())
        .await
        .unwrap();
    let b = pipeline(slow_first)
        .build_graph()
        .unwrap()
        .execute(WorkflowState::new(items()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(a.state.node_outputs(), b.state.node_outputs());
    assert_eq!(a.state.critique(), b.state.critique());

    let order = |r: &opscout_agent::ExecutionResult| -> Vec<String> {
        r.node_results.iter().map(|n| n.node_id.clone()).collect()
    };
    assert_ne!(order(&a)[..3], order(&b)[..3]);
    assert_eq!(order(&a)[3..], [CRITIC.to_string(), EVALUATION.to_string()]);
}

#[tokio::test]
async fn test_empty_items_still_report() {
    let knowledge = Arc::new(MockKnowledgeQuery::new());
    let generator = Arc::new(MockTextGenerator::new());
    let pipeline =
        OpportunityPipeline::new(knowledge.clone(), generator.clone(), WorkflowConfig::default());

    let report = pipeline.run(vec![]).await.unwrap();
    assert!(!report.is_empty());
    assert_eq!(knowledge.call_count(), 0);
    assert!(generator.calls_for(ASSOCIATION).is_empty());
    assert!(generator.calls_for(EMERGING_THEME).is_empty());
    assert!(generator.calls_for(TECHNOLOGY_GAP).is_empty());

    let critic_input = &generator.calls_for(CRITIC)[0].input;
    assert_eq!(critic_input.matches("No valid patents were provided").count(), 3);
}

#[tokio::test]
async fn test_out_of_range_score_yields_no_report() {
    let bad = ASSESSMENT.replace("\"gap\": 0.9", "\"gap\": 1.9");
    let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, bad));

    let err = pipeline(generator).run(items()).await.unwrap_err();
    assert!(matches!(err, OpscoutError::Validation(_)));
}

#[tokio::test]
async fn test_analysis_failures_degrade_but_complete() {
    let generator = Arc::new(
        MockTextGenerator::new()
            .failing_for(ASSOCIATION)
            .failing_for(CRITIC)
            .with_reply(EVALUATION, ASSESSMENT),
    );
    let knowledge = Arc::new(MockKnowledgeQuery::new().failing_on("待解决问题", "connection refused"));
    let pipeline = OpportunityPipeline::new(knowledge, generator.clone(), WorkflowConfig::default());

    let report = pipeline.run(items()).await.unwrap();
    assert!(report.contains("Sealed cold plates"));

    let evaluation_input = &generator.calls_for(EVALUATION)[0].input;
    assert!(evaluation_input.contains("Association report generation failed"));
    assert!(evaluation_input.contains("Technology gap analysis failed"));
    assert!(evaluation_input.contains("Critique unavailable"));
}

#[tokio::test]
async fn test_slow_analysis_times_out_into_degraded_text() {
    let generator = Arc::new(
        MockTextGenerator::new().with_delay(EMERGING_THEME, Duration::from_secs(5)),
    );
    let workflow = WorkflowConfig {
        node_timeout_secs: 1,
        ..WorkflowConfig::default()
    };
    let graph = OpportunityPipeline::new(knowledge(), generator, workflow)
        .build_graph()
        .unwrap();

    let result = graph
        .execute(WorkflowState::new(items()), CancellationToken::new())
        .await
        .unwrap();
    let text = result.state.node_output(EMERGING_THEME).unwrap();
    assert!(text.starts_with("[EmergingTheme] analysis unavailable"));
    assert!(result.state.final_report().is_some());
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let generator = Arc::new(
        MockTextGenerator::new().with_delay(ASSOCIATION, Duration::from_secs(10)),
    );
    let pipeline = pipeline(generator.clone());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline.run_with_cancel(items(), cancel).await.unwrap_err();
    assert!(matches!(err, OpscoutError::Cancelled));
    assert!(generator.calls_for(CRITIC).is_empty());
}

#[tokio::test]
async fn test_run_events() {
    let generator = Arc::new(MockTextGenerator::new().with_reply(EVALUATION, ASSESSMENT));
    let pipeline = pipeline(generator);
    let mut rx = pipeline.events().subscribe();

    pipeline.run(items()).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { items: 4, .. })));
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::RunCompleted { succeeded: true, .. })
    ));
    let completed = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::NodeCompleted { .. }))
        .count();
    assert_eq!(completed, 5);
}
