//! Processed CLI - filter interim election results
//!
//! # Commands
//!
//! ```bash
//! processed run --config filter.json                 # Filter and write data.csv + parameters.json
//! processed run --dataset 2022 --aggregation-level polling_station --candidacy-pos GOVERNOR \
//!     --threshold 80 --city-limits INSIDE --precisions ROOFTOP,STREET
//! processed inspect --dataset 2022 --aggregation-level polling_station --candidacy-pos GOVERNOR
//! processed labels  --dataset 2022 --aggregation-level polling_station --candidacy-pos GOVERNOR
//! ```

use clap::{Args, Parser, Subcommand};
use processed::config::{DATA_ROOT_ENV, DEFAULT_DATA_ROOT};
use processed::{
    compute_baseline, distinct_labels, load_interim, run, DatasetKey, FilterSettings, FsStage,
    StageConfig,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "processed")]
#[command(about = "Filter interim election results and report what was kept", long_about = None)]
struct Cli {
    /// Pipeline data root, holding the interim/ and processed/ folders
    #[arg(long, global = true, env = DATA_ROOT_ENV, default_value = DEFAULT_DATA_ROOT)]
    data_root: PathBuf,

    /// Logging filter, e.g. `info` or `processed=debug`
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a dataset and write the processed output
    Run {
        /// JSON file with filter settings (flags override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset name
        #[arg(long)]
        dataset: Option<String>,

        /// Aggregation level, e.g. polling_station
        #[arg(long)]
        aggregation_level: Option<String>,

        /// Candidacy position, e.g. GOVERNOR
        #[arg(long)]
        candidacy_pos: Option<String>,

        /// Minimum geo match-quality score (inclusive)
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f64>,

        /// Allowed city-limits labels; pass the flag alone to allow none
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        city_limits: Option<Vec<String>>,

        /// Allowed precision labels; pass the flag alone to allow none
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        precisions: Option<Vec<String>>,

        /// Candidate identifier(s) recorded in the report
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        candidates: Option<Vec<String>>,
    },

    /// Print baseline statistics of an interim dataset
    Inspect(DatasetArgs),

    /// List city-limits and precision labels of an interim dataset
    Labels(DatasetArgs),
}

#[derive(Args)]
struct DatasetArgs {
    /// Dataset name
    #[arg(long)]
    dataset: String,

    /// Aggregation level
    #[arg(long)]
    aggregation_level: String,

    /// Candidacy position
    #[arg(long)]
    candidacy_pos: String,
}

impl DatasetArgs {
    fn key(&self) -> DatasetKey {
        DatasetKey::new(&self.dataset, &self.aggregation_level, &self.candidacy_pos)
    }
}

fn main() {
    // Load .env file (if present) before clap reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log) {
        eprintln!("❌ Invalid log filter '{}': {}", cli.log, e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run {
            config,
            dataset,
            aggregation_level,
            candidacy_pos,
            threshold,
            city_limits,
            precisions,
            candidates,
        } => {
            let flags = FilterSettings {
                dataset,
                levenshtein_threshold: threshold,
                city_limits_filter: city_limits,
                precision_filter: precisions,
                candidacy_pos,
                aggregation_level,
                candidates: candidates.map(Into::into),
            };
            cmd_run(&cli.data_root, config.as_deref(), flags)
        }

        Commands::Inspect(args) => cmd_inspect(&cli.data_root, &args.key()),

        Commands::Labels(args) => cmd_labels(&cli.data_root, &args.key()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(directive: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn cmd_run(
    data_root: &Path,
    config_path: Option<&Path>,
    flags: FilterSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match config_path {
        Some(path) => flags.or(FilterSettings::from_file(path)?),
        None => flags,
    };
    let config = StageConfig::build(data_root.to_path_buf(), settings)?;

    let ctx = FsStage::new(&config.data_root);
    let outcome = run(&ctx, &config.dataset, &config.filter)?;

    eprintln!("📊 {}", outcome.key);
    eprintln!("   Rows: {}", outcome.report.row_summary());
    eprintln!("   Turnout retained: {}%", outcome.report.folder_name());
    for rejection in &outcome.filter.rejections {
        eprintln!("   Rejected by {}: {}", rejection.predicate, rejection.rows);
    }
    for candidate in &outcome.candidates {
        match candidate.retained_pct {
            Some(pct) => eprintln!("   {}: {:.2}% of votes kept", candidate.column, pct),
            None => eprintln!("   {}: no baseline votes", candidate.column),
        }
    }
    eprintln!("💾 Output written to: {}", outcome.output_dir.display());

    Ok(())
}

fn cmd_inspect(data_root: &Path, key: &DatasetKey) -> Result<(), Box<dyn std::error::Error>> {
    let records = load_interim(&FsStage::new(data_root), key)?;
    let baseline = compute_baseline(&records);

    println!("📄 {}", key);
    println!("   Rows: {}", baseline.size);
    println!("   Turnout: {}", baseline.turnout);
    println!("   Null votes: {}", baseline.null_total());
    println!("   Blank votes: {}", baseline.blank_total());
    println!("   Columns:");
    for (i, column) in records.columns().iter().enumerate() {
        println!("   [{:2}] {} ({:?})", i + 1, column.name, column.kind);
    }
    println!("   Candidates:");
    for candidate in &baseline.candidates_votes {
        println!("     {}: {}", candidate.column, candidate.votes);
    }

    Ok(())
}

fn cmd_labels(data_root: &Path, key: &DatasetKey) -> Result<(), Box<dyn std::error::Error>> {
    let records = load_interim(&FsStage::new(data_root), key)?;
    let roles = records.roles();

    for (title, column) in [("City limits", roles.city_limits), ("Precisions", roles.precision)] {
        println!("🏷️  {} ({}):", title, records.column_name(column));
        for label in distinct_labels(&records, column) {
            println!("   {} ({} rows)", label.label, label.rows);
        }
    }

    Ok(())
}
