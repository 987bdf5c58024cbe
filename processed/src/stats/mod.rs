//! Baseline statistics of the unfiltered dataset, and how filtering changed
//! each candidate's vote total.

use crate::models::{BaselineInfo, CandidateVotes, Cell, ElectionRecordSet};

/// Compute the pre-filter baseline. Must run before any filtering.
pub fn compute_baseline(records: &ElectionRecordSet) -> BaselineInfo {
    let roles = records.roles();

    BaselineInfo {
        size: records.len(),
        turnout: records.turnout(),
        candidates_votes: candidate_totals(records),
        null_votes: records.column_values(roles.null_votes).map(Cell::as_f64).collect(),
        null_blank: records.column_values(roles.blank_votes).map(Cell::as_f64).collect(),
    }
}

/// Vote sum of every candidate column, in column order.
pub fn candidate_totals(records: &ElectionRecordSet) -> Vec<CandidateVotes> {
    records
        .roles()
        .candidates
        .iter()
        .map(|&index| CandidateVotes {
            column: records.column_name(index).to_string(),
            votes: records.sum(index),
        })
        .collect()
}

/// Share of one candidate's baseline votes still present after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRetention {
    pub column: String,
    pub baseline_votes: f64,
    pub filtered_votes: f64,
    /// `None` when the candidate had no votes to begin with.
    pub retained_pct: Option<f64>,
}

/// Compare filtered candidate totals with the baseline.
pub fn candidate_retention(baseline: &BaselineInfo, filtered: &ElectionRecordSet) -> Vec<CandidateRetention> {
    candidate_totals(filtered)
        .into_iter()
        .map(|current| {
            let baseline_votes = baseline.candidate_votes(&current.column).unwrap_or(0.0);
            CandidateRetention {
                retained_pct: (baseline_votes != 0.0).then(|| 100.0 * current.votes / baseline_votes),
                column: current.column,
                baseline_votes,
                filtered_votes: current.votes,
            }
        })
        .collect()
}
