//! Retention percentages and their textual forms.
//!
//! The folder name is derived from the turnout retention, so its rounding is
//! part of the output contract: two decimals, the exact binary value rounded
//! half to even (`80.0` -> `80.00`, `2.675` -> `2.67`, `0.125` -> `0.12`).

use crate::error::RetentionError;
use crate::models::{BaselineInfo, ElectionRecordSet, FilterConfig, RetentionReport};

/// `100 * filtered / baseline` turnout.
///
/// Not clamped: filtering only removes rows, so with non-negative turnouts
/// the result is at most 100, but negative upstream counts could exceed it.
pub fn turnout_retention(baseline_turnout: f64, filtered_turnout: f64) -> Result<f64, RetentionError> {
    percentage(filtered_turnout, baseline_turnout, "turnout")
}

/// `100 * kept / baseline` rows.
pub fn row_share(baseline_rows: usize, kept_rows: usize) -> Result<f64, RetentionError> {
    percentage(kept_rows as f64, baseline_rows as f64, "row count")
}

fn percentage(part: f64, whole: f64, measure: &'static str) -> Result<f64, RetentionError> {
    if whole == 0.0 {
        return Err(RetentionError::ZeroBaseline { measure });
    }
    Ok(100.0 * part / whole)
}

/// Name of the output folder for a retention percentage.
pub fn folder_name(pct: f64) -> String {
    let name = format!("{:.2}", pct);
    match name.as_str() {
        "-0.00" => "0.00".to_string(),
        _ => name,
    }
}

/// `"<n> (<pct>%)"`, with pct in shortest round-trip form (`0.0`, `80.0`,
/// `33.333333333333336`).
pub fn row_count_summary(row_count: usize, pct: f64) -> String {
    format!("{} ({:?}%)", row_count, pct)
}

/// Build the report of a finished filter pass.
pub fn build_report(
    config: &FilterConfig,
    baseline: &BaselineInfo,
    filtered: &ElectionRecordSet,
) -> Result<RetentionReport, RetentionError> {
    let turnout_retention_pct = turnout_retention(baseline.turnout, filtered.turnout())?;
    if turnout_retention_pct > 100.0 {
        tracing::warn!(
            pct = turnout_retention_pct,
            "turnout retention above 100%, check for negative turnouts"
        );
    }

    Ok(RetentionReport {
        threshold: config.levenshtein_threshold,
        city_limits: config.city_limits_filter.clone(),
        precisions: config.precision_filter.clone(),
        candidates: config.candidates.clone(),
        row_count: filtered.len(),
        row_count_pct: row_share(baseline.size, filtered.len())?,
        turnout_retention_pct,
    })
}

impl RetentionReport {
    pub fn folder_name(&self) -> String {
        folder_name(self.turnout_retention_pct)
    }

    pub fn row_summary(&self) -> String {
        row_count_summary(self.row_count, self.row_count_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turnout_retention_exact() {
        assert_eq!(turnout_retention(150.0, 120.0), Ok(80.0));
        assert_eq!(turnout_retention(150.0, 0.0), Ok(0.0));
        assert_eq!(turnout_retention(3.0, 1.0), Ok(100.0 * 1.0 / 3.0));
    }

    #[test]
    fn test_zero_baseline_is_division_error() {
        assert_eq!(
            turnout_retention(0.0, 0.0),
            Err(RetentionError::ZeroBaseline { measure: "turnout" })
        );
        assert!(row_share(0, 0).is_err());
    }

    #[test]
    fn test_folder_name_two_decimals() {
        assert_eq!(folder_name(80.0), "80.00");
        assert_eq!(folder_name(87.4321), "87.43");
        assert_eq!(folder_name(100.0 * 2.0 / 3.0), "66.67");
        assert_eq!(folder_name(2.675), "2.67");
        assert_eq!(folder_name(0.125), "0.12");
        assert_eq!(folder_name(-0.0), "0.00");
        assert_eq!(folder_name(100.0), "100.00");
    }

    #[test]
    fn test_row_count_summary() {
        assert_eq!(row_count_summary(0, 0.0), "0 (0.0%)");
        assert_eq!(row_count_summary(3, 60.0), "3 (60.0%)");
        assert_eq!(row_count_summary(1, 100.0 / 3.0), "1 (33.333333333333336%)");
    }
}
