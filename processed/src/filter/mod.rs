//! Row filtering.
//!
//! Three independent predicates, combined conjunctively:
//!
//! ```text
//! geo-quality  >= levenshtein_threshold   (missing or non-numeric: rejected)
//! city-limits  in city_limits_filter      (empty filter: rejects every row)
//! precision    in precision_filter        (empty filter: rejects every row)
//! ```
//!
//! Because each predicate looks at one row only, the order in which they run
//! cannot change which rows survive.

use std::collections::HashSet;

use crate::models::{Cell, ColumnRoles, ElectionRecordSet, FilterConfig};

/// A single row test.
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    /// Numeric column at or above a threshold (inclusive).
    AtLeast {
        name: &'static str,
        column: usize,
        threshold: f64,
    },
    /// Label column whose value is one of the allowed labels.
    LabelIn {
        name: &'static str,
        column: usize,
        allowed: HashSet<String>,
    },
}

impl RowPredicate {
    pub fn name(&self) -> &'static str {
        match self {
            RowPredicate::AtLeast { name, .. } | RowPredicate::LabelIn { name, .. } => *name,
        }
    }

    pub fn matches(&self, row: &[Cell]) -> bool {
        match self {
            RowPredicate::AtLeast { column, threshold, .. } => {
                row[*column].to_number().is_some_and(|score| score >= *threshold)
            }
            RowPredicate::LabelIn { column, allowed, .. } => row[*column]
                .label()
                .is_some_and(|label| allowed.contains(&*label)),
        }
    }
}

fn label_set(labels: &[String]) -> HashSet<String> {
    labels.iter().cloned().collect()
}

/// Rows rejected by one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejections {
    pub predicate: &'static str,
    pub rows: usize,
}

/// What a filter pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: usize,
    pub removed: usize,
    /// Per predicate; a row failing several predicates counts under each.
    pub rejections: Vec<Rejections>,
}

/// The three stage predicates built for one dataset's columns.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    predicates: Vec<RowPredicate>,
}

impl FilterEngine {
    pub fn new(config: &FilterConfig, roles: &ColumnRoles) -> Self {
        Self {
            predicates: vec![
                RowPredicate::AtLeast {
                    name: "levenshtein threshold",
                    column: roles.geo_quality,
                    threshold: config.levenshtein_threshold,
                },
                RowPredicate::LabelIn {
                    name: "city limits",
                    column: roles.city_limits,
                    allowed: label_set(&config.city_limits_filter),
                },
                RowPredicate::LabelIn {
                    name: "precision",
                    column: roles.precision,
                    allowed: label_set(&config.precision_filter),
                },
            ],
        }
    }

    pub fn predicates(&self) -> &[RowPredicate] {
        &self.predicates
    }

    /// Narrow `records` in place to the rows satisfying every predicate.
    pub fn apply(&self, records: &mut ElectionRecordSet) -> FilterOutcome {
        let before = records.len();
        let mut rejected = vec![0usize; self.predicates.len()];

        records.retain(|row| {
            let mut keep = true;
            for (count, predicate) in rejected.iter_mut().zip(&self.predicates) {
                if !predicate.matches(row) {
                    *count += 1;
                    keep = false;
                }
            }
            keep
        });

        FilterOutcome {
            kept: records.len(),
            removed: before - records.len(),
            rejections: self
                .predicates
                .iter()
                .zip(rejected)
                .map(|(p, rows)| Rejections {
                    predicate: p.name(),
                    rows,
                })
                .collect(),
        }
    }
}
