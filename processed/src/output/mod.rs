//! Persistence of the filtered dataset and its `parameters.json` report.
//!
//! Layout:
//!
//! ```text
//! <processed-root>/<dataset>/<aggregation_level>/<candidacy_pos_lower>/<retention_pct>/
//!     data.csv
//!     parameters.json
//! ```
//!
//! Both files are written into a hidden staging folder next to the target,
//! which is then renamed into place. A previous folder of the same name is
//! replaced as a whole, and a failed write leaves it untouched.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::DATA_FILE;
use crate::error::{OutputError, OutputResult};
use crate::models::{Candidates, Cell, DatasetKey, ElectionRecordSet, RetentionReport};
use crate::stage::StageContext;

/// File name of the provenance report.
pub const REPORT_FILE: &str = "parameters.json";

/// The report as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametersDocument {
    #[serde(rename = "Levenshtein Threshold")]
    pub threshold: String,
    #[serde(rename = "City Limits")]
    pub city_limits: Vec<String>,
    #[serde(rename = "Precisions")]
    pub precisions: Vec<String>,
    #[serde(rename = "Candidates")]
    pub candidates: Option<Candidates>,
    #[serde(rename = "#Rows")]
    pub rows: String,
}

impl From<&RetentionReport> for ParametersDocument {
    fn from(report: &RetentionReport) -> Self {
        Self {
            threshold: format!("{:?}", report.threshold),
            city_limits: report.city_limits.clone(),
            precisions: report.precisions.clone(),
            candidates: report.candidates.clone(),
            rows: report.row_summary(),
        }
    }
}

/// `<processed-root>/<dataset>/<aggregation_level>/<candidacy_pos_lower>`
pub fn processed_dir(processed_root: &Path, key: &DatasetKey) -> PathBuf {
    processed_root
        .join(&key.dataset)
        .join(&key.aggregation_level)
        .join(key.candidacy_pos.to_lowercase())
}

/// Writes one run's output through a stage context.
pub struct OutputWriter<'a, C: ?Sized> {
    ctx: &'a C,
}

impl<'a, C> OutputWriter<'a, C>
where
    C: StageContext + ?Sized,
{
    pub fn new(ctx: &'a C) -> Self {
        Self { ctx }
    }

    /// Persist `records` and `report`, returning the final folder.
    pub fn write(
        &self,
        key: &DatasetKey,
        records: &ElectionRecordSet,
        report: &RetentionReport,
    ) -> OutputResult<PathBuf> {
        let parent = processed_dir(&self.ctx.process_folder(self.ctx.state()), key);
        let name = report.folder_name();
        let target = parent.join(&name);

        let stamp = chrono::Utc::now().timestamp_millis();
        let staging = parent.join(format!(".{}.staging-{}", name, stamp));
        self.create_dir(&staging)?;

        let written = write_csv(&staging.join(DATA_FILE), records)
            .and_then(|_| write_report(&staging.join(REPORT_FILE), report));
        if let Err(err) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        replace_dir(&staging, &target, &parent.join(format!(".{}.previous-{}", name, stamp)))?;
        Ok(target)
    }

    fn create_dir(&self, path: &Path) -> OutputResult<()> {
        self.ctx.create_dir(path).map_err(|source| OutputError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Move `staging` onto `target`, parking any existing target at `backup`
/// until the swap succeeded.
fn replace_dir(staging: &Path, target: &Path, backup: &Path) -> OutputResult<()> {
    let replace_err = |source: std::io::Error| OutputError::Replace {
        path: target.to_path_buf(),
        source,
    };

    let had_previous = target.exists();
    if had_previous {
        if let Err(source) = fs::rename(target, backup) {
            let _ = fs::remove_dir_all(staging);
            return Err(replace_err(source));
        }
    }

    if let Err(source) = fs::rename(staging, target) {
        if had_previous {
            let _ = fs::rename(backup, target);
        }
        let _ = fs::remove_dir_all(staging);
        return Err(replace_err(source));
    }

    if had_previous {
        if let Err(err) = fs::remove_dir_all(backup) {
            tracing::warn!("could not remove previous output {}: {}", backup.display(), err);
        }
    }
    Ok(())
}

/// Write the table with a header row and no index column.
pub fn write_csv(path: &Path, records: &ElectionRecordSet) -> OutputResult<()> {
    let write_err = |source: std::io::Error| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(|e| write_err(e.into()))?;
    writer
        .write_record(records.headers())
        .map_err(|e| write_err(e.into()))?;
    for row in records.rows() {
        writer
            .write_record(row.iter().map(Cell::to_field))
            .map_err(|e| write_err(e.into()))?;
    }
    writer.flush().map_err(write_err)
}

/// Write the report as 4-space-indented JSON.
pub fn write_report(path: &Path, report: &RetentionReport) -> OutputResult<()> {
    let content = render_report(report)?;
    fs::write(path, content).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Render the report document.
pub fn render_report(report: &RetentionReport) -> OutputResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    ParametersDocument::from(report).serialize(&mut serializer)?;
    Ok(buf)
}
