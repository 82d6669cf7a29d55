//! Multi-criteria opportunity scoring.
//!
//! `score = 100 * (0.3 * hotness + 0.5 * gap + 0.2 * maturity)`, plus a 20
//! point bonus when both hotness and gap exceed 0.8, halved for mature
//! technologies, clamped to `[0, 100]` and rounded to two decimals.

use std::sync::OnceLock;

use regex::Regex;

use opscout_core::error::{OpscoutError, Result};

pub const HOTNESS_WEIGHT: f64 = 0.3;
pub const GAP_WEIGHT: f64 = 0.5;
pub const MATURITY_WEIGHT: f64 = 0.2;

const SYNERGY_THRESHOLD: f64 = 0.8;
const SYNERGY_BONUS: f64 = 20.0;
const MATURE_PENALTY: f64 = 0.5;

/// Chinese label for the mature stage.
const MATURE_STAGE_ZH: &str = "成熟期";

fn mature_word() -> Option<&'static Regex> {
    static MATURE: OnceLock<Option<Regex>> = OnceLock::new();
    MATURE
        .get_or_init(|| Regex::new(r"(?i)\bmature\b").ok())
        .as_ref()
}

/// Whether a stage label names the mature stage.
///
/// Matches the whole word "mature" in any case, so "immature" does not count.
pub fn has_mature_marker(stage: &str) -> bool {
    stage.contains(MATURE_STAGE_ZH) || mature_word().is_some_and(|re| re.is_match(stage))
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OpscoutError::Validation(format!(
            "{} must be within [0.0, 1.0], got {}",
            name, value
        )))
    }
}

pub fn opportunity_score(hotness: f64, gap: f64, maturity: f64, maturity_stage: &str) -> Result<f64> {
    check_unit("hotness", hotness)?;
    check_unit("gap", gap)?;
    check_unit("maturity", maturity)?;

    let mut score =
        100.0 * (HOTNESS_WEIGHT * hotness + GAP_WEIGHT * gap + MATURITY_WEIGHT * maturity);
    if hotness > SYNERGY_THRESHOLD && gap > SYNERGY_THRESHOLD {
        score += SYNERGY_BONUS;
    }
    if has_mature_marker(maturity_stage) {
        score *= MATURE_PENALTY;
    }

    Ok((score.clamp(0.0, 100.0) * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_balanced_inputs() {
        assert!(approx(opportunity_score(0.5, 0.5, 0.5, "growth").unwrap(), 50.0));
    }

    #[test]
    fn test_bonus_is_clamped() {
        assert!(approx(opportunity_score(1.0, 1.0, 1.0, "growth").unwrap(), 100.0));
    }

    #[test]
    fn test_bonus_then_mature_penalty() {
        assert!(approx(
            opportunity_score(0.9, 0.9, 0.5, "mature stage").unwrap(),
            51.0
        ));
    }

    #[test]
    fn test_bonus_requires_strict_threshold() {
        // 100 * (0.24 + 0.4 + 0.2) = 84, no bonus at exactly 0.8.
        assert!(approx(opportunity_score(0.8, 0.8, 1.0, "growth").unwrap(), 84.0));
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        // 100 * 0.3 * 0.1234 = 3.702
        let s = opportunity_score(0.1234, 0.0, 0.0, "nascent").unwrap();
        assert!(approx(s, 3.7));
    }

    #[test]
    fn test_out_of_range_rejected() {
        for (h, g, m) in [(1.5, 0.5, 0.5), (0.5, -0.1, 0.5), (0.5, 0.5, f64::NAN)] {
            let err = opportunity_score(h, g, m, "growth").unwrap_err();
            assert!(matches!(err, OpscoutError::Validation(_)));
        }
    }

    #[test]
    fn test_zero_inputs() {
        assert!(approx(opportunity_score(0.0, 0.0, 0.0, "nascent").unwrap(), 0.0));
    }

    #[test]
    fn test_mature_marker() {
        assert!(has_mature_marker("mature stage"));
        assert!(has_mature_marker("MATURE"));
        assert!(has_mature_marker("技术处于[成熟期]"));
        assert!(!has_mature_marker("immature"));
        assert!(!has_mature_marker("maturity"));
        assert!(!has_mature_marker("growth"));
    }
}
