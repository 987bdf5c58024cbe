//! Interim dataset loading and column-role resolution.
//!
//! Columns are located by pattern rather than by position, so upstream
//! stages may add or reorder columns freely.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, SchemaError, StageError};
use crate::models::{Cell, Column, ColumnRoles, DatasetKey, ElectionRecordSet};
use crate::parser::{self, TypedTable};
use crate::stage::{ProcessState, StageContext};

/// File name of a dataset inside its key folder, for every pipeline state.
pub const DATA_FILE: &str = "data.csv";

/// Substring (case-insensitive) marking a candidate vote column.
pub const CANDIDATE_PATTERN: &str = "(?i)CANDIDATE";

static CANDIDATE_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(CANDIDATE_PATTERN).expect("valid candidate pattern"));

/// Columns the stage cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    GeoQuality,
    CityLimits,
    Precision,
    Turnout,
    NullVotes,
    BlankVotes,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 6] = [
        ColumnRole::GeoQuality,
        ColumnRole::CityLimits,
        ColumnRole::Precision,
        ColumnRole::Turnout,
        ColumnRole::NullVotes,
        ColumnRole::BlankVotes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColumnRole::GeoQuality => "geo match-quality",
            ColumnRole::CityLimits => "city-limits",
            ColumnRole::Precision => "precision",
            ColumnRole::Turnout => "turnout",
            ColumnRole::NullVotes => "null votes",
            ColumnRole::BlankVotes => "blank votes",
        }
    }

    pub fn pattern(self) -> &'static str {
        match self {
            ColumnRole::GeoQuality => r"(?i)^\[GEO\]_LEVENSHTEIN_SIMILARITY$",
            ColumnRole::CityLimits => r"(?i)^\[GEO\]_CITY_LIMITS$",
            ColumnRole::Precision => r"(?i)^\[GEO\]_PRECISION$",
            ColumnRole::Turnout => r"(?i)^\[ELECTION\]_TURNOUT$",
            ColumnRole::NullVotes => r"(?i)^\[ELECTION\]_NULL$",
            ColumnRole::BlankVotes => r"(?i)^\[ELECTION\]_BLANK$",
        }
    }

    fn regex(self) -> &'static Regex {
        static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
            ColumnRole::ALL
                .iter()
                .map(|role| Regex::new(role.pattern()).expect("valid column pattern"))
                .collect()
        });
        &PATTERNS[self as usize]
    }

    fn find(self, columns: &[Column]) -> Option<usize> {
        columns.iter().position(|c| self.regex().is_match(&c.name))
    }
}

/// Whether a header names a candidate vote column.
pub fn is_candidate_column(name: &str) -> bool {
    CANDIDATE_COLUMN.is_match(name)
}

/// `<interim-root>/<dataset>/<aggregation_level>/<candidacy_pos>/data.csv`
pub fn interim_path(interim_root: &Path, key: &DatasetKey) -> PathBuf {
    interim_root
        .join(&key.dataset)
        .join(&key.aggregation_level)
        .join(&key.candidacy_pos)
        .join(DATA_FILE)
}

/// Load the interim dataset of `key` from the folder the context resolves.
pub fn load_interim<C>(ctx: &C, key: &DatasetKey) -> Result<ElectionRecordSet, StageError>
where
    C: StageContext + ?Sized,
{
    let path = interim_path(&ctx.process_folder(ProcessState::Interim), key);
    ctx.log_info(&format!("Reading {}", path.display()));
    load_file(&path, key)
}

/// Load a dataset file at an explicit path.
pub fn load_file(path: &Path, key: &DatasetKey) -> Result<ElectionRecordSet, StageError> {
    if !path.is_file() {
        return Err(LoadError::NotFound {
            key: key.clone(),
            path: path.to_path_buf(),
        }
        .into());
    }

    let bytes = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let raw = parser::parse_bytes_auto(&bytes).map_err(|e| {
        if e.line <= 1 && e.message.contains("header") {
            LoadError::NoHeaders {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Csv {
                path: path.to_path_buf(),
                line: e.line,
                message: e.message,
            }
        }
    })?;
    tracing::debug!(
        encoding = %raw.encoding,
        delimiter = ?raw.delimiter,
        rows = raw.rows.len(),
        "parsed {}",
        path.display()
    );

    Ok(from_table(key, parser::infer_types(raw))?)
}

/// Build a record set from CSV text already in memory.
pub fn from_csv_str(key: &DatasetKey, content: &str) -> Result<ElectionRecordSet, StageError> {
    let delimiter = parser::detect_delimiter(content);
    let raw = parser::parse_table(content, delimiter, "utf-8".to_string()).map_err(|e| LoadError::Csv {
        path: PathBuf::from("<memory>"),
        line: e.line,
        message: e.message,
    })?;
    Ok(from_table(key, parser::infer_types(raw))?)
}

/// Resolve column roles and check count columns are numeric.
pub fn from_table(key: &DatasetKey, table: TypedTable) -> Result<ElectionRecordSet, SchemaError> {
    let roles = resolve_roles(key, &table.columns)?;

    let count_columns = [roles.turnout, roles.null_votes, roles.blank_votes]
        .into_iter()
        .chain(roles.candidates.iter().copied());
    for index in count_columns {
        if table.columns[index].kind.is_numeric() {
            continue;
        }
        // Mixed columns are typed Text; report the first cell that is not a number.
        let offending = table.rows.iter().enumerate().find_map(|(i, row)| match &row[index] {
            cell @ Cell::Text(s) if cell.to_number().is_none() => Some((i + 1, s.clone())),
            _ => None,
        });
        let Some((row, value)) = offending else {
            continue;
        };
        return Err(SchemaError::NonNumeric {
            key: key.clone(),
            column: table.columns[index].name.clone(),
            row,
            value,
        });
    }

    Ok(ElectionRecordSet::new(table.columns, table.rows, roles))
}

/// Locate every required column; the first header matching a pattern wins.
pub fn resolve_roles(key: &DatasetKey, columns: &[Column]) -> Result<ColumnRoles, SchemaError> {
    let find = |role: ColumnRole| {
        role.find(columns).ok_or_else(|| SchemaError::MissingColumn {
            key: key.clone(),
            role: role.name(),
            pattern: role.pattern(),
        })
    };

    Ok(ColumnRoles {
        geo_quality: find(ColumnRole::GeoQuality)?,
        city_limits: find(ColumnRole::CityLimits)?,
        precision: find(ColumnRole::Precision)?,
        turnout: find(ColumnRole::Turnout)?,
        null_votes: find(ColumnRole::NullVotes)?,
        blank_votes: find(ColumnRole::BlankVotes)?,
        candidates: columns
            .iter()
            .enumerate()
            .filter(|(_, c)| is_candidate_column(&c.name))
            .map(|(i, _)| i)
            .collect(),
    })
}

/// A label and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub rows: usize,
}

/// Distinct non-null labels of a column with row counts, most frequent first
/// and alphabetical among ties.
pub fn distinct_labels(records: &ElectionRecordSet, column: usize) -> Vec<LabelCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for cell in records.column_values(column) {
        if let Some(label) = cell.label() {
            *counts.entry(label.into_owned()).or_default() += 1;
        }
    }

    let mut labels: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, rows)| LabelCount { label, rows })
        .collect();
    labels.sort_by(|a, b| b.rows.cmp(&a.rows).then_with(|| a.label.cmp(&b.label)));
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "ID,[GEO]_LEVENSHTEIN_SIMILARITY,[GEO]_CITY_LIMITS,[GEO]_PRECISION,\
[ELECTION]_TURNOUT,[ELECTION]_NULL,[ELECTION]_BLANK,[CANDIDATE]_A,[CANDIDATE]_B";

    fn key() -> DatasetKey {
        DatasetKey::new("2022", "polling_station", "GOVERNOR")
    }

    #[test]
    fn test_roles_resolved_by_pattern() {
        let csv = format!("{}\n1,90.0,INSIDE,ROOFTOP,10,1,0,6,3", HEADER);
        let records = from_csv_str(&key(), &csv).unwrap();
        let roles = records.roles();

        assert_eq!(roles.geo_quality, 1);
        assert_eq!(roles.turnout, 4);
        assert_eq!(roles.candidates, vec![7, 8]);
    }

    #[test]
    fn test_roles_match_case_insensitively() {
        let csv = "[geo]_levenshtein_similarity,[geo]_city_limits,[geo]_precision,\
[election]_turnout,[election]_null,[election]_blank\n90,IN,P,1,0,0";
        assert!(from_csv_str(&key(), csv).is_ok());
    }

    #[test]
    fn test_missing_column_names_role() {
        let csv = "[GEO]_LEVENSHTEIN_SIMILARITY,[GEO]_CITY_LIMITS,[GEO]_PRECISION,\
[ELECTION]_NULL,[ELECTION]_BLANK\n90,IN,P,0,0";
        let err = from_csv_str(&key(), csv).unwrap_err();
        match err {
            StageError::Schema(SchemaError::MissingColumn { role, .. }) => assert_eq!(role, "turnout"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_in_turnout_is_schema_error() {
        let csv = format!("{}\n1,90,IN,P,10,0,0,5,5\n2,90,IN,P,ten,0,0,5,5", HEADER);
        let err = from_csv_str(&key(), &csv).unwrap_err();
        match err {
            StageError::Schema(SchemaError::NonNumeric { column, row, value, .. }) => {
                assert_eq!(column, "[ELECTION]_TURNOUT");
                assert_eq!(row, 2);
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_error_skips_numeric_text() {
        let csv = format!(
            "{}\n1,90,IN,P,10,0,0,5,5\n2,90,IN,P,12,0,0,5,5\n3,90,IN,P,ten,0,0,5,5",
            HEADER
        );
        let err = from_csv_str(&key(), &csv).unwrap_err();
        match err {
            StageError::Schema(SchemaError::NonNumeric { row, value, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_in_geo_quality_is_allowed() {
        let csv = format!("{}\n1,n/a?,IN,P,10,0,0,5,5", HEADER);
        assert!(from_csv_str(&key(), &csv).is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = interim_path(dir.path(), &key());
        let err = load_file(&path, &key()).unwrap_err();

        assert!(matches!(err, StageError::Load(LoadError::NotFound { .. })));
        assert!(err.to_string().contains("2022/polling_station/GOVERNOR"));
    }

    #[test]
    fn test_load_semicolon_latin1_file() {
        let dir = tempdir().unwrap();
        let path = interim_path(dir.path(), &key());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut bytes = HEADER.replace(',', ";").into_bytes();
        bytes.extend_from_slice(b"\n1;95.5;Munic\xEDpio;ROOFTOP;10;1;0;6;3\n");
        std::fs::write(&path, bytes).unwrap();

        let records = load_file(&path, &key()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.turnout(), 10.0);
    }

    #[test]
    fn test_interim_path_keeps_case() {
        let path = interim_path(Path::new("/data/interim"), &key());
        assert_eq!(path, PathBuf::from("/data/interim/2022/polling_station/GOVERNOR/data.csv"));
    }

    #[test]
    fn test_distinct_labels_sorted_by_frequency() {
        let csv = format!(
            "{}\n1,90,OUT,P,1,0,0,1,0\n2,90,IN,P,1,0,0,1,0\n3,90,IN,P,1,0,0,1,0\n4,90,,P,1,0,0,1,0",
            HEADER
        );
        let records = from_csv_str(&key(), &csv).unwrap();
        let labels = distinct_labels(&records, records.roles().city_limits);

        assert_eq!(
            labels,
            vec![
                LabelCount { label: "IN".into(), rows: 2 },
                LabelCount { label: "OUT".into(), rows: 1 },
            ]
        );
    }
}
