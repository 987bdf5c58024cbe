//! Stage configuration.
//!
//! Filter settings come from a JSON file, command-line flags, or both (flags
//! win). The data root comes from `--data-root` or `RESULTS_DATA_ROOT`, which
//! may be set in a `.env` file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{Candidates, FilterConfig};

/// Environment variable holding the pipeline data root.
pub const DATA_ROOT_ENV: &str = "RESULTS_DATA_ROOT";

/// Data root used when nothing else is configured.
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Partially specified settings, from one source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSettings {
    pub dataset: Option<String>,
    pub levenshtein_threshold: Option<f64>,
    pub city_limits_filter: Option<Vec<String>>,
    pub precision_filter: Option<Vec<String>>,
    pub candidacy_pos: Option<String>,
    pub aggregation_level: Option<String>,
    pub candidates: Option<Candidates>,
}

impl FilterSettings {
    /// Read settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill every unset field of `self` from `fallback`.
    pub fn or(self, fallback: FilterSettings) -> Self {
        Self {
            dataset: self.dataset.or(fallback.dataset),
            levenshtein_threshold: self.levenshtein_threshold.or(fallback.levenshtein_threshold),
            city_limits_filter: self.city_limits_filter.or(fallback.city_limits_filter),
            precision_filter: self.precision_filter.or(fallback.precision_filter),
            candidacy_pos: self.candidacy_pos.or(fallback.candidacy_pos),
            aggregation_level: self.aggregation_level.or(fallback.aggregation_level),
            candidates: self.candidates.or(fallback.candidates),
        }
    }
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub data_root: PathBuf,
    pub dataset: String,
    pub filter: FilterConfig,
}

impl StageConfig {
    /// Build a validated configuration. Label filters must be given
    /// explicitly: an empty list keeps no rows, so it is never a default.
    pub fn build(data_root: PathBuf, settings: FilterSettings) -> Result<Self, ConfigError> {
        let filter = FilterConfig {
            levenshtein_threshold: settings
                .levenshtein_threshold
                .ok_or(ConfigError::Missing("levenshtein_threshold"))?,
            city_limits_filter: settings
                .city_limits_filter
                .ok_or(ConfigError::Missing("city_limits_filter"))?,
            precision_filter: settings
                .precision_filter
                .ok_or(ConfigError::Missing("precision_filter"))?,
            candidacy_pos: settings.candidacy_pos.ok_or(ConfigError::Missing("candidacy_pos"))?,
            aggregation_level: settings
                .aggregation_level
                .ok_or(ConfigError::Missing("aggregation_level"))?,
            candidates: settings.candidates,
        };
        validate(&filter)?;

        Ok(Self {
            data_root,
            dataset: settings.dataset.ok_or(ConfigError::Missing("dataset"))?,
            filter,
        })
    }
}

/// Reject configurations the filter cannot evaluate meaningfully.
pub fn validate(filter: &FilterConfig) -> Result<(), ConfigError> {
    if !filter.levenshtein_threshold.is_finite() {
        return Err(ConfigError::InvalidThreshold(filter.levenshtein_threshold));
    }
    Ok(())
}
