//! The three fan-out analysis nodes.
//!
//! Each one queries the knowledge graph for every selected patent at once,
//! condenses the rows into findings in Rust, and asks the text generator to
//! write the findings up. Gateway failures never escape a node: they become
//! the node's output text.

pub mod association;
pub mod emerging_theme;
pub mod technology_gap;

pub use association::AssociationAnalysis;
pub use emerging_theme::EmergingThemeAnalysis;
pub use technology_gap::TechnologyGapAnalysis;

use opscout_core::traits::TextGenerator;
use opscout_core::types::Record;

pub const ASSOCIATION: &str = "Association";
pub const EMERGING_THEME: &str = "EmergingTheme";
pub const TECHNOLOGY_GAP: &str = "TechnologyGap";

/// Output of any analysis node run with an empty patent list.
pub const NO_VALID_INPUT: &str = "No valid patents were provided for analysis.";

/// Query parameters shared by every patent-list query.
pub(crate) fn patent_params(items: &[String]) -> serde_json::Value {
    serde_json::json!({ "patent_list": items })
}

pub(crate) fn str_field(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn count_field(record: &Record, key: &str) -> u64 {
    match record.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Have the generator write up `findings`; on failure keep the raw findings.
pub(crate) async fn synthesize(
    generator: &dyn TextGenerator,
    role: &str,
    instructions: &str,
    items: &[String],
    findings: &str,
) -> String {
    let input = format!(
        "Selected patents ({}):\n{}\n\nFindings from the knowledge graph:\n{}\n\n\
         Write your analysis of these findings.",
        items.len(),
        items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n"),
        findings
    );

    match generator.generate(role, instructions, &input).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(node_id = role, error = %e, "Report generation failed");
            format!(
                "{} report generation failed: {}\nRaw findings: {}",
                role, e, findings
            )
        }
    }
}
