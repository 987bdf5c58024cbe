//! Error types for the processed-results stage.
//!
//! One enum per component, plus the top-level [`StageError`]:
//!
//! - [`LoadError`] - the interim dataset cannot be found or read
//! - [`SchemaError`] - a required column is absent or unparseable
//! - [`RetentionError`] - a percentage would divide by a zero baseline
//! - [`OutputError`] - the processed folder cannot be created or written
//! - [`ConfigError`] - the filter configuration is unusable
//! - [`StageError`] - what [`crate::stage::run`] returns
//!
//! Conversions into [`StageError`] are automatic via `From`, so `?` works
//! across component boundaries.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::DatasetKey;

// =============================================================================
// Loading Errors
// =============================================================================

/// Errors while reading the interim `data.csv`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No file at the derived interim path.
    #[error("Interim dataset for {key} not found at {}", .path.display())]
    NotFound { key: DatasetKey, path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content is not a well-formed delimited table.
    #[error("Invalid CSV in {} (line {line}): {message}", .path.display())]
    Csv {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// Header row missing.
    #[error("No header row in {}", .path.display())]
    NoHeaders { path: PathBuf },
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors raised when the loaded table does not have the expected columns.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No header matched the pattern of a required column role.
    #[error("{key}: missing {role} column (expected a header matching `{pattern}`)")]
    MissingColumn {
        key: DatasetKey,
        role: &'static str,
        pattern: &'static str,
    },

    /// A count column holds a value that is not a number.
    #[error("{key}: column '{column}' must be numeric, found '{value}' at row {row}")]
    NonNumeric {
        key: DatasetKey,
        column: String,
        row: usize,
        value: String,
    },
}

// =============================================================================
// Retention Errors
// =============================================================================

/// Errors computing a retention percentage.
#[derive(Debug, Error, PartialEq)]
pub enum RetentionError {
    /// The denominator is zero, which means the upstream data is defective.
    #[error("Cannot compute {measure} retention: baseline {measure} is zero")]
    ZeroBaseline { measure: &'static str },
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors persisting the filtered dataset and report.
#[derive(Debug, Error)]
pub enum OutputError {
    /// A directory could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staged folder could not replace the final one.
    #[error("Failed to move staged output into {}: {source}", .path.display())]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors building the stage configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable.
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not a valid filter configuration.
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required setting was given neither on the command line nor in the file.
    #[error("Missing setting: {0}")]
    Missing(&'static str),

    /// Threshold is NaN or infinite.
    #[error("Levenshtein threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),
}

// =============================================================================
// Stage Errors (top-level)
// =============================================================================

/// Top-level error of a stage run.
///
/// Every variant is fatal: the stage halts and writes nothing.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Division by a zero baseline, reported with the dataset it came from.
    #[error("Division error for {key}: {source}")]
    Division {
        key: DatasetKey,
        #[source]
        source: RetentionError,
    },

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for a stage run.
pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DatasetKey {
        DatasetKey::new("2022_general", "polling_station", "GOVERNOR")
    }

    #[test]
    fn test_error_conversion_chain() {
        let schema_err = SchemaError::MissingColumn {
            key: key(),
            role: "turnout",
            pattern: r"^\[ELECTION\]_TURNOUT$",
        };
        let stage_err: StageError = schema_err.into();
        let msg = stage_err.to_string();
        assert!(msg.contains("turnout"));
        assert!(msg.contains("2022_general/polling_station/GOVERNOR"));

        let output_err = OutputError::CreateDir {
            path: PathBuf::from("/nope/80.00"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let stage_err: StageError = output_err.into();
        assert!(stage_err.to_string().contains("/nope/80.00"));
    }

    #[test]
    fn test_non_numeric_error_format() {
        let err = SchemaError::NonNumeric {
            key: key(),
            column: "[ELECTION]_TURNOUT".into(),
            row: 7,
            value: "abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("[ELECTION]_TURNOUT"));
        assert!(msg.contains("row 7"));
        assert!(msg.contains("'abc'"));
    }

    #[test]
    fn test_division_error_names_dataset() {
        let err = StageError::Division {
            key: key(),
            source: RetentionError::ZeroBaseline { measure: "turnout" },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Division error"));
        assert!(msg.contains("baseline turnout is zero"));
    }
}
