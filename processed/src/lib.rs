//! # Processed - filtering and provenance stage for electoral results
//!
//! Takes the interim, polling-station-level dataset of an election and
//! produces a quality-filtered dataset plus a `parameters.json` report of
//! what was kept.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │   Loader    │──▶│  Baseline   │──▶│   Filter    │──▶│  Retention  │──▶│   Output    │
//! │ interim csv │   │ sums/series │   │ 3 predicates│   │  turnout %  │   │ csv + json  │
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use processed::{run, FsStage, FilterConfig, Candidates};
//!
//! let config = FilterConfig {
//!     levenshtein_threshold: 80.0,
//!     city_limits_filter: vec!["INSIDE".into()],
//!     precision_filter: vec!["ROOFTOP".into(), "STREET".into()],
//!     candidacy_pos: "GOVERNOR".into(),
//!     aggregation_level: "polling_station".into(),
//!     candidates: Candidates::One("ALL".into()),
//! };
//! let outcome = run(&FsStage::new("data"), "2022_general", &config).unwrap();
//! println!("Kept {}% of turnout", outcome.report.folder_name());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per component
//! - [`models`] - Record set, filter config, baseline and report
//! - [`parser`] - CSV decoding and column type inference
//! - [`dataset`] - Interim loading and column roles
//! - [`stats`] - Baseline statistics
//! - [`filter`] - Row predicates
//! - [`retention`] - Percentages and their formatting
//! - [`output`] - `data.csv` and `parameters.json`
//! - [`stage`] - Stage context and run pipeline
//! - [`config`] - Settings from file and flags

// Core modules
pub mod error;
pub mod models;

// Input
pub mod parser;
pub mod dataset;

// Computation
pub mod stats;
pub mod filter;
pub mod retention;

// Output
pub mod output;

// Orchestration
pub mod stage;
pub mod config;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    LoadError,
    OutputError,
    RetentionError,
    SchemaError,
    StageError,
    StageResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    BaselineInfo,
    Candidates,
    Cell,
    DatasetKey,
    ElectionRecordSet,
    FilterConfig,
    RetentionReport,
};

// =============================================================================
// Re-exports - Components
// =============================================================================

pub use dataset::{distinct_labels, load_file, load_interim, LabelCount};
pub use filter::{FilterEngine, FilterOutcome, RowPredicate};
pub use output::{OutputWriter, ParametersDocument};
pub use retention::{folder_name, row_count_summary, turnout_retention};
pub use stats::{compute_baseline, CandidateRetention};

// =============================================================================
// Re-exports - Stage
// =============================================================================

pub use config::{FilterSettings, StageConfig};
pub use stage::{run, FsStage, ProcessState, StageContext, StageOutcome, StageState};
