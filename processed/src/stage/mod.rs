//! Stage lifecycle: the collaborator contract and the run pipeline.
//!
//! ```text
//! INITIALIZED -> LOADED -> BASELINE_COMPUTED -> FILTERED -> RETENTION_COMPUTED -> PERSISTED
//! ```
//!
//! Each arrow is one component finishing successfully. A failure halts the
//! run with the originating error; since retention is computed before any
//! directory is created, a failed run leaves no output folder behind.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::dataset;
use crate::error::{StageError, StageResult};
use crate::filter::{FilterEngine, FilterOutcome};
use crate::models::{BaselineInfo, DatasetKey, FilterConfig, RetentionReport};
use crate::output::OutputWriter;
use crate::retention;
use crate::stats::{self, CandidateRetention};

/// Logger name this stage reports under.
pub const LOGGER_NAME: &str = "Results (Processed)";

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Pipeline states, each with its own data folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Raw,
    Interim,
    Processed,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Raw => "raw",
            ProcessState::Interim => "interim",
            ProcessState::Processed => "processed",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the stage needs from the surrounding pipeline.
pub trait StageContext {
    /// State this stage produces.
    fn state(&self) -> ProcessState;

    /// Root data folder of a pipeline state. Must be deterministic.
    fn process_folder(&self, state: ProcessState) -> PathBuf;

    /// Create a directory and its missing parents.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Informational log sink.
    fn log_info(&self, message: &str);
}

/// Filesystem context: `<data_root>/<state>/...`, logging through `tracing`.
#[derive(Debug, Clone)]
pub struct FsStage {
    data_root: PathBuf,
    logger_name: String,
}

impl FsStage {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            logger_name: LOGGER_NAME.to_string(),
        }
    }
}

impl StageContext for FsStage {
    fn state(&self) -> ProcessState {
        ProcessState::Processed
    }

    fn process_folder(&self, state: ProcessState) -> PathBuf {
        self.data_root.join(state.as_str())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn log_info(&self, message: &str) {
        tracing::info!(logger = %self.logger_name, "{}", message);
    }
}

// =============================================================================
// Run
// =============================================================================

/// Progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageState {
    Initialized,
    Loaded,
    BaselineComputed,
    Filtered,
    RetentionComputed,
    Persisted,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Initialized => "INITIALIZED",
            StageState::Loaded => "LOADED",
            StageState::BaselineComputed => "BASELINE_COMPUTED",
            StageState::Filtered => "FILTERED",
            StageState::RetentionComputed => "RETENTION_COMPUTED",
            StageState::Persisted => "PERSISTED",
        };
        f.write_str(name)
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub key: DatasetKey,
    pub state: StageState,
    pub baseline: BaselineInfo,
    pub filter: FilterOutcome,
    pub candidates: Vec<CandidateRetention>,
    pub report: RetentionReport,
    pub output_dir: PathBuf,
}

/// Run the stage for one dataset.
pub fn run<C>(ctx: &C, dataset: &str, config: &FilterConfig) -> StageResult<StageOutcome>
where
    C: StageContext + ?Sized,
{
    let key = config.dataset_key(dataset);
    let mut state = StageState::Initialized;

    match run_stages(ctx, &key, config, &mut state) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            tracing::error!(key = %key, state = %state, "stage halted: {}", err);
            Err(err)
        }
    }
}

fn advance(state: &mut StageState, next: StageState) {
    tracing::debug!(from = %state, to = %next, "stage transition");
    *state = next;
}

fn run_stages<C>(
    ctx: &C,
    key: &DatasetKey,
    config: &FilterConfig,
    state: &mut StageState,
) -> StageResult<StageOutcome>
where
    C: StageContext + ?Sized,
{
    ctx.log_info(&format!("Generating {} data for {}.", ctx.state(), key));

    let mut records = dataset::load_interim(ctx, key)?;
    advance(state, StageState::Loaded);
    ctx.log_info(&format!(
        "Loaded {} rows, {} columns ({} candidates)",
        records.len(),
        records.columns().len(),
        records.roles().candidates.len()
    ));

    let baseline = stats::compute_baseline(&records);
    advance(state, StageState::BaselineComputed);
    ctx.log_info(&format!(
        "Baseline turnout {}, null votes {}, blank votes {}",
        baseline.turnout,
        baseline.null_total(),
        baseline.blank_total()
    ));

    let engine = FilterEngine::new(config, records.roles());
    let filter = engine.apply(&mut records);
    advance(state, StageState::Filtered);
    ctx.log_info(&format!("Kept {} of {} rows", filter.kept, baseline.size));
    for rejection in &filter.rejections {
        ctx.log_info(&format!("{} rejected {} rows", rejection.predicate, rejection.rows));
    }

    let report = retention::build_report(config, &baseline, &records).map_err(|source| StageError::Division {
        key: key.clone(),
        source,
    })?;
    advance(state, StageState::RetentionComputed);
    ctx.log_info(&format!(
        "Turnout retention {}%, rows {}",
        report.folder_name(),
        report.row_summary()
    ));

    let candidates = stats::candidate_retention(&baseline, &records);
    for candidate in &candidates {
        if let Some(pct) = candidate.retained_pct {
            tracing::debug!(column = %candidate.column, pct, "candidate votes retained");
        }
    }

    let output_dir = OutputWriter::new(ctx).write(key, &records, &report)?;
    advance(state, StageState::Persisted);
    ctx.log_info(&format!("Saved to {}", output_dir.display()));

    Ok(StageOutcome {
        key: key.clone(),
        state: *state,
        baseline,
        filter,
        candidates,
        report,
        output_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, OutputError, RetentionError};
    use crate::models::Candidates;
    use std::cell::RefCell;
    use tempfile::tempdir;

    const HEADER: &str = "ID,[GEO]_LEVENSHTEIN_SIMILARITY,[GEO]_CITY_LIMITS,[GEO]_PRECISION,\
[ELECTION]_TURNOUT,[ELECTION]_NULL,[ELECTION]_BLANK,CANDIDATE_10,CANDIDATE_20";

    /// Filesystem context that also records what it was asked to log.
    struct RecordingStage {
        inner: FsStage,
        messages: RefCell<Vec<String>>,
    }

    impl RecordingStage {
        fn new(root: &Path) -> Self {
            Self {
                inner: FsStage::new(root),
                messages: RefCell::new(Vec::new()),
            }
        }
    }

    impl StageContext for RecordingStage {
        fn state(&self) -> ProcessState {
            self.inner.state()
        }

        fn process_folder(&self, state: ProcessState) -> PathBuf {
            self.inner.process_folder(state)
        }

        fn create_dir(&self, path: &Path) -> io::Result<()> {
            self.inner.create_dir(path)
        }

        fn log_info(&self, message: &str) {
            self.messages.borrow_mut().push(message.to_string());
        }
    }

    fn config(threshold: f64, city: &[&str]) -> FilterConfig {
        FilterConfig {
            levenshtein_threshold: threshold,
            city_limits_filter: city.iter().map(|s| s.to_string()).collect(),
            precision_filter: vec!["ROOFTOP".into(), "STREET".into()],
            candidacy_pos: "Governor".into(),
            aggregation_level: "polling_station".into(),
            candidates: Some(Candidates::One("ALL".into())),
        }
    }

    fn write_interim(root: &Path, rows: &[&str]) {
        let key = DatasetKey::new("2022", "polling_station", "Governor");
        let path = dataset::interim_path(&root.join("interim"), &key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        std::fs::write(path, content).unwrap();
    }

    /// Turnouts 10..50, the first two below an 80.0 threshold.
    fn five_rows(root: &Path) {
        write_interim(
            root,
            &[
                "1,70.0,INSIDE,ROOFTOP,10,1,0,6,4",
                "2,79.5,INSIDE,ROOFTOP,20,0,1,10,10",
                "3,80.0,INSIDE,ROOFTOP,30,2,0,20,10",
                "4,91.2,INSIDE,STREET,40,0,0,25,15",
                "5,100.0,OUTSIDE,ROOFTOP,50,1,1,30,20",
            ],
        );
    }

    fn processed_root(root: &Path) -> PathBuf {
        root.join("processed/2022/polling_station/governor")
    }

    #[test]
    fn test_retention_eighty_percent() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let outcome = run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();

        assert_eq!(outcome.state, StageState::Persisted);
        assert_eq!(outcome.baseline.turnout, 150.0);
        assert_eq!(outcome.report.turnout_retention_pct, 80.0);
        assert_eq!(outcome.output_dir, processed_root(dir.path()).join("80.00"));
        assert!(outcome.output_dir.join("data.csv").is_file());
        assert!(outcome.output_dir.join("parameters.json").is_file());
    }

    #[test]
    fn test_boundary_score_retained() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let outcome = run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();
        let written = dataset::load_file(&outcome.output_dir.join("data.csv"), &outcome.key).unwrap();
        let ids: Vec<String> = written.column_values(0).map(|c| c.to_field()).collect();

        assert_eq!(ids, vec!["3", "4", "5"]);
    }

    #[test]
    fn test_empty_city_limits_reports_zero_rows() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let outcome = run(&ctx, "2022", &config(0.0, &[])).unwrap();

        assert_eq!(outcome.filter.kept, 0);
        assert_eq!(outcome.report.row_summary(), "0 (0.0%)");
        assert_eq!(outcome.output_dir, processed_root(dir.path()).join("0.00"));

        let written = std::fs::read_to_string(outcome.output_dir.join("data.csv")).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.starts_with("ID,"));
    }

    #[test]
    fn test_zero_turnout_is_division_error_without_output() {
        let dir = tempdir().unwrap();
        write_interim(
            dir.path(),
            &["1,90.0,INSIDE,ROOFTOP,0,0,0,0,0", "2,95.0,INSIDE,ROOFTOP,0,0,0,0,0"],
        );
        let ctx = FsStage::new(dir.path());

        let err = run(&ctx, "2022", &config(80.0, &["INSIDE"])).unwrap_err();

        match err {
            StageError::Division { key, source } => {
                assert_eq!(key.candidacy_pos, "Governor");
                assert_eq!(source, RetentionError::ZeroBaseline { measure: "turnout" });
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("processed").exists());
    }

    #[test]
    fn test_missing_interim_is_load_error() {
        let dir = tempdir().unwrap();
        let ctx = FsStage::new(dir.path());

        let err = run(&ctx, "2022", &config(80.0, &["INSIDE"])).unwrap_err();

        assert!(matches!(err, StageError::Load(LoadError::NotFound { .. })));
        assert!(!dir.path().join("processed").exists());
    }

    #[test]
    fn test_unwritable_output_is_output_error() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        std::fs::write(dir.path().join("processed"), "not a directory").unwrap();
        let ctx = FsStage::new(dir.path());

        let err = run(&ctx, "2022", &config(80.0, &["INSIDE"])).unwrap_err();

        assert!(matches!(err, StageError::Output(OutputError::CreateDir { .. })));
    }

    #[test]
    fn test_report_matches_persisted_file() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let outcome = run(&ctx, "2022", &config(75.0, &["INSIDE"])).unwrap();

        let written = dataset::load_file(&outcome.output_dir.join("data.csv"), &outcome.key).unwrap();
        let pct = 100.0 * written.len() as f64 / outcome.baseline.size as f64;
        let expected_rows = retention::row_count_summary(written.len(), pct);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(outcome.output_dir.join("parameters.json")).unwrap())
                .unwrap();
        assert_eq!(report["#Rows"], expected_rows.as_str());
        assert_eq!(report["#Rows"], "3 (60.0%)");

        let turnout_pct = 100.0 * written.turnout() / outcome.baseline.turnout;
        assert_eq!(retention::folder_name(turnout_pct), "60.00");
        assert_eq!(outcome.output_dir.file_name().unwrap(), "60.00");
    }

    #[test]
    fn test_rerun_overwrites_same_folder() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let first = run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();
        std::fs::write(first.output_dir.join("stale.txt"), "old").unwrap();
        let second = run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();

        assert_eq!(first.output_dir, second.output_dir);
        assert!(!second.output_dir.join("stale.txt").exists());

        let siblings = std::fs::read_dir(processed_root(dir.path())).unwrap().count();
        assert_eq!(siblings, 1);
    }

    #[test]
    fn test_progress_goes_through_log_sink() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = RecordingStage::new(dir.path());

        run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();

        let messages = ctx.messages.borrow();
        assert!(messages[0].starts_with("Generating processed data"));
        assert!(messages.iter().any(|m| m == "Kept 3 of 5 rows"));
        assert!(messages.iter().any(|m| m.starts_with("Saved to")));
    }

    #[test]
    fn test_candidate_retention_in_outcome() {
        let dir = tempdir().unwrap();
        five_rows(dir.path());
        let ctx = FsStage::new(dir.path());

        let outcome = run(&ctx, "2022", &config(80.0, &["INSIDE", "OUTSIDE"])).unwrap();

        assert_eq!(outcome.candidates[0].column, "CANDIDATE_10");
        assert_eq!(outcome.candidates[0].baseline_votes, 91.0);
        assert_eq!(outcome.candidates[0].filtered_votes, 75.0);
    }
}
