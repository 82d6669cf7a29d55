use std::collections::BTreeMap;

use opscout_core::error::{OpscoutError, Result};
use opscout_core::types::Record;

/// Minimum number of distinct years before a regression is attempted.
pub const MIN_TREND_YEARS: usize = 4;

/// Filing year of every selected patent that has an application date.
pub const YEAR_QUERY: &str = "MATCH (p:Patent)-[:发明于]->(ad:ApplicationDate)
WHERE p.name IN $patent_list AND ad.name IS NOT NULL
RETURN p.name AS patent, substring(ad.name, 0, 4) AS year";

/// Valid four-digit years from `year` columns; anything else is dropped.
pub fn parse_years(records: &[Record]) -> Vec<i32> {
    records
        .iter()
        .filter_map(|r| match r.get("year")? {
            serde_json::Value::String(s) => {
                let s = s.trim();
                if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
                    s.parse().ok()
                } else {
                    None
                }
            }
            serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            _ => None,
        })
        .collect()
}

pub fn yearly_counts(years: &[i32]) -> BTreeMap<i32, u64> {
    let mut counts = BTreeMap::new();
    for &year in years {
        *counts.entry(year).or_insert(0) += 1;
    }
    counts
}

/// Ordinary least-squares slope of count over year.
///
/// Fails with [`OpscoutError::InsufficientData`] below [`MIN_TREND_YEARS`]
/// distinct years.
pub fn regression_slope(counts: &BTreeMap<i32, u64>) -> Result<f64> {
    if counts.len() < MIN_TREND_YEARS {
        return Err(OpscoutError::InsufficientData(format!(
            "only {} distinct filing year(s); at least {} are needed for a trend",
            counts.len(),
            MIN_TREND_YEARS
        )));
    }

    let n = counts.len() as f64;
    let mean_x = counts.keys().map(|&y| y as f64).sum::<f64>() / n;
    let mean_y = counts.values().map(|&c| c as f64).sum::<f64>() / n;

    let (num, den) = counts.iter().fold((0.0, 0.0), |(num, den), (&year, &count)| {
        let dx = year as f64 - mean_x;
        (num + dx * (count as f64 - mean_y), den + dx * dx)
    });

    Ok(num / den)
}

/// Human-readable trend finding. Never fails: insufficiency is reported as text.
pub fn describe_trend(counts: &BTreeMap<i32, u64>) -> String {
    let distribution = counts
        .iter()
        .map(|(year, count)| format!("{}: {}", year, count))
        .collect::<Vec<_>>()
        .join(", ");

    match regression_slope(counts) {
        Ok(slope) => format!(
            "Filings per year: {}. Regression slope of the overall trend: {:.2}.",
            distribution, slope
        ),
        Err(e) if counts.is_empty() => {
            format!("No valid filing years were found for the selected patents ({}).", e)
        }
        Err(e) => format!(
            "Filings per year: {}. Not enough valid years for a meaningful trend analysis: {}.",
            distribution, e
        ),
    }
}
