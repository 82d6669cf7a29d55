use tracing::warn;

use opscout_core::traits::KnowledgeQuery;

use crate::analysis::patent_params;
use crate::trend::{parse_years, YEAR_QUERY};

/// Clusters whose earliest filing is this recent count as nascent.
const NASCENT_WINDOW_YEARS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaturityStage {
    Nascent,
    MidStage,
    /// No usable year data.
    Unknown,
}

impl MaturityStage {
    /// Label passed to the scoring engine.
    pub fn label(&self) -> &'static str {
        match self {
            MaturityStage::Nascent => "nascent",
            MaturityStage::MidStage => "mid-stage",
            MaturityStage::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MaturityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A maturity verdict and the literal text shown in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaturityAssessment {
    pub stage: MaturityStage,
    pub text: String,
}

pub fn classify(years: &[i32], current_year: i32) -> MaturityAssessment {
    let Some(&earliest) = years.iter().min() else {
        return MaturityAssessment {
            stage: MaturityStage::Unknown,
            text: "No year data was found for the selected patents; the maturity stage is unknown."
                .to_string(),
        };
    };

    let stage = if earliest >= current_year - NASCENT_WINDOW_YEARS {
        MaturityStage::Nascent
    } else {
        MaturityStage::MidStage
    };
    MaturityAssessment {
        stage,
        text: format!(
            "The technology maturity of the selected patent cluster is [{}] (earliest filing {}).",
            stage, earliest
        ),
    }
}

/// Query filing years for `items` and classify them.
///
/// Gateway failures fold into an [`MaturityStage::Unknown`] verdict whose text
/// carries the error.
pub async fn assess_maturity(
    knowledge: &dyn KnowledgeQuery,
    items: &[String],
    current_year: i32,
) -> MaturityAssessment {
    if items.is_empty() {
        return MaturityAssessment {
            stage: MaturityStage::Unknown,
            text: "No valid patents were provided; the maturity stage cannot be assessed."
                .to_string(),
        };
    }

    match knowledge.query(YEAR_QUERY, patent_params(items)).await {
        Ok(records) => classify(&parse_years(&records), current_year),
        Err(e) => {
            warn!(error = %e, "Maturity query failed");
            MaturityAssessment {
                stage: MaturityStage::Unknown,
                text: format!("Maturity assessment failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscout_test_utils::{record, MockKnowledgeQuery};
    use serde_json::json;

    #[test]
    fn test_nascent_cluster() {
        let a = classify(&[2025, 2026], 2026);
        assert_eq!(a.stage, MaturityStage::Nascent);
        assert!(a.text.contains("[nascent]"));
        assert_eq!(classify(&[2024], 2026).stage, MaturityStage::Nascent);
    }

    #[test]
    fn test_mid_stage_cluster() {
        let a = classify(&[2023, 2026, 2019], 2026);
        assert_eq!(a.stage, MaturityStage::MidStage);
        assert!(a.text.contains("earliest filing 2019"));
    }

    #[test]
    fn test_no_years_is_unknown() {
        let a = classify(&[], 2026);
        assert_eq!(a.stage, MaturityStage::Unknown);
        assert!(a.text.contains("No year data"));
    }

    #[test]
    fn test_labels_carry_no_mature_marker() {
        for stage in [
            MaturityStage::Nascent,
            MaturityStage::MidStage,
            MaturityStage::Unknown,
        ] {
            assert!(!crate::scoring::has_mature_marker(stage.label()));
        }
    }

    #[tokio::test]
    async fn test_assess_from_graph() {
        let knowledge = MockKnowledgeQuery::new().with_rows(
            "ApplicationDate",
            vec![
                record(json!({"patent": "A", "year": "2017"})),
                record(json!({"patent": "B", "year": "bad"})),
            ],
        );
        let a = assess_maturity(&knowledge, &["A".into(), "B".into()], 2026).await;
        assert_eq!(a.stage, MaturityStage::MidStage);
    }

    #[tokio::test]
    async fn test_query_failure_is_unknown() {
        let knowledge = MockKnowledgeQuery::new().failing_on("ApplicationDate", "timed out");
        let a = assess_maturity(&knowledge, &["A".into()], 2026).await;
        assert_eq!(a.stage, MaturityStage::Unknown);
        assert!(a.text.contains("timed out"));
    }
}
