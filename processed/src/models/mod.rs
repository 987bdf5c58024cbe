//! Domain models for the processed-results stage.
//!
//! - [`DatasetKey`] - (dataset, aggregation level, candidacy position) triple
//! - [`Cell`] / [`Column`] / [`ColumnType`] - typed tabular values
//! - [`ColumnRoles`] - which columns hold turnout, labels, candidates, ...
//! - [`ElectionRecordSet`] - the polling-station table being filtered
//! - [`FilterConfig`] / [`Candidates`] - what the caller asked for
//! - [`BaselineInfo`] - statistics of the unfiltered table
//! - [`RetentionReport`] - what was kept, written once per run

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

// =============================================================================
// Dataset Key
// =============================================================================

/// Identifies one interim dataset folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetKey {
    pub dataset: String,
    pub aggregation_level: String,
    pub candidacy_pos: String,
}

impl DatasetKey {
    pub fn new(
        dataset: impl Into<String>,
        aggregation_level: impl Into<String>,
        candidacy_pos: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            aggregation_level: aggregation_level.into(),
            candidacy_pos: candidacy_pos.into(),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dataset, self.aggregation_level, self.candidacy_pos)
    }
}

// =============================================================================
// Cells and Columns
// =============================================================================

/// Type inferred for a whole column from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Every non-null value is an integer.
    Integer,
    /// Every non-null value is a finite number, at least one non-integer.
    Float,
    /// At least one value is not a number.
    Text,
    /// No values at all.
    Empty,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Text)
    }
}

/// A single table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Cell {
    /// Numeric value of an `Int` or `Float` cell.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(_) | Cell::Null => None,
        }
    }

    /// Like [`Cell::as_f64`] but also reads numbers stored in text cells of
    /// mixed columns.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            other => other.as_f64(),
        }
    }

    /// Textual form used for label comparisons. `None` for nulls.
    pub fn label(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Cell::Null => None,
            other => Some(Cow::Owned(other.to_field())),
        }
    }

    /// Serialized form written to `data.csv`.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Int(i) => i.to_string(),
            // Debug keeps the trailing `.0` on integral floats
            Cell::Float(f) => format!("{:?}", f),
            Cell::Text(s) => s.clone(),
            Cell::Null => String::new(),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

/// Positions of the columns the stage reads, resolved once at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRoles {
    pub geo_quality: usize,
    pub city_limits: usize,
    pub precision: usize,
    pub turnout: usize,
    pub null_votes: usize,
    pub blank_votes: usize,
    /// Candidate vote columns, in column order.
    pub candidates: Vec<usize>,
}

// =============================================================================
// Election Record Set
// =============================================================================

/// Polling-station table with its column roles.
///
/// Rows are only ever removed, never reordered or added.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionRecordSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
    roles: ColumnRoles,
}

impl ElectionRecordSet {
    pub(crate) fn new(columns: Vec<Column>, rows: Vec<Vec<Cell>>, roles: ColumnRoles) -> Self {
        Self { columns, rows, roles }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn roles(&self) -> &ColumnRoles {
        &self.roles
    }

    pub fn column_name(&self, index: usize) -> &str {
        &self.columns[index].name
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Sum of a numeric column. Nulls count as zero.
    pub fn sum(&self, index: usize) -> f64 {
        self.column_values(index).filter_map(Cell::as_f64).sum()
    }

    pub fn turnout(&self) -> f64 {
        self.sum(self.roles.turnout)
    }

    /// Keep only the rows for which `keep` returns true, in their original order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Cell]) -> bool,
    {
        self.rows.retain(|row| keep(row.as_slice()));
    }
}

// =============================================================================
// Filter Configuration
// =============================================================================

/// Candidate identifier(s) copied into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidates {
    One(String),
    Many(Vec<String>),
}

impl From<Vec<String>> for Candidates {
    fn from(mut names: Vec<String>) -> Self {
        if names.len() == 1 {
            Candidates::One(names.remove(0))
        } else {
            Candidates::Many(names)
        }
    }
}

/// Filter parameters for one run.
///
/// Label lists have set semantics for membership; their order is kept only
/// so the report echoes them as given. An empty list lets nothing through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub levenshtein_threshold: f64,
    #[serde(default)]
    pub city_limits_filter: Vec<String>,
    #[serde(default)]
    pub precision_filter: Vec<String>,
    pub candidacy_pos: String,
    pub aggregation_level: String,
    #[serde(default)]
    pub candidates: Option<Candidates>,
}

impl FilterConfig {
    /// Key of the interim dataset this configuration applies to.
    pub fn dataset_key(&self, dataset: &str) -> DatasetKey {
        DatasetKey::new(dataset, &self.aggregation_level, &self.candidacy_pos)
    }
}

// =============================================================================
// Baseline and Report
// =============================================================================

/// Vote total of one candidate column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateVotes {
    pub column: String,
    pub votes: f64,
}

/// Statistics of the unfiltered table.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineInfo {
    pub size: usize,
    pub turnout: f64,
    pub candidates_votes: Vec<CandidateVotes>,
    /// Per-row null votes, unaggregated.
    pub null_votes: Vec<Option<f64>>,
    /// Per-row blank votes, unaggregated.
    pub null_blank: Vec<Option<f64>>,
}

impl BaselineInfo {
    pub fn null_total(&self) -> f64 {
        self.null_votes.iter().flatten().sum()
    }

    pub fn blank_total(&self) -> f64 {
        self.null_blank.iter().flatten().sum()
    }

    pub fn candidate_votes(&self, column: &str) -> Option<f64> {
        self.candidates_votes
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.votes)
    }
}

/// Filter parameters and retention metrics of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionReport {
    pub threshold: f64,
    pub city_limits: Vec<String>,
    pub precisions: Vec<String>,
    /// Reported as `null` when no candidate was configured.
    pub candidates: Option<Candidates>,
    pub row_count: usize,
    pub row_count_pct: f64,
    pub turnout_retention_pct: f64,
}
