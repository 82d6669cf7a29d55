use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use opscout_core::error::Result;
use opscout_core::traits::TextGenerator;

use crate::analysis::{ASSOCIATION, EMERGING_THEME, TECHNOLOGY_GAP};
use crate::graph::{NodeHandler, StatePatch, WorkflowState};
use crate::personas;

pub const CRITIC: &str = "Critic";

/// Placeholder for an analysis that left no output.
pub(crate) const NO_RESULT: &str = "(no result)";

/// The three analyst reports, labelled, as fed to later stages.
pub(crate) fn analyst_reports(state: &WorkflowState) -> String {
    [
        ("Association technology analyst", ASSOCIATION),
        ("Emerging theme analyst", EMERGING_THEME),
        ("Venture analyst, technology gaps", TECHNOLOGY_GAP),
    ]
    .iter()
    .enumerate()
    .map(|(i, (title, key))| {
        format!(
            "Report {}: [{}]\n{}",
            i + 1,
            title,
            state.node_output(key).unwrap_or(NO_RESULT)
        )
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// Reviews the merged analyst reports.
pub struct CriticReview {
    generator: Arc<dyn TextGenerator>,
}

impl CriticReview {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

impl NodeHandler for CriticReview {
    fn run(&self, state: Arc<WorkflowState>) -> BoxFuture<'_, Result<StatePatch>> {
        Box::pin(async move {
            let input = format!(
                "The following three reports were produced from a user-confirmed patent list. \
                 Review them rigorously.\n\n{}\n\n\
                 Give your critical opinion on these reports according to your role.",
                analyst_reports(&state)
            );

            let critique = match self
                .generator
                .generate(CRITIC, personas::CRITIC, &input)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(node_id = CRITIC, error = %e, "Critique generation failed");
                    format!("Critique unavailable: {}", e)
                }
            };

            Ok(StatePatch::Critique(critique))
        })
    }
}
