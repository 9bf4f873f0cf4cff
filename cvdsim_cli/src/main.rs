use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use cvdsim_core::cardiovascular;
use cvdsim_core::snapshot::{load_cohort, load_snapshot, save_snapshot};
use cvdsim_core::summary::{cleanup_processed_traces, count_by_kind, trace_to_csv_and_archive};
use cvdsim_core::trace::TraceRecord;
use cvdsim_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cvdsim")]
#[command(about = "Cardiovascular disease progression simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a cohort day by day and write the event trace
    Simulate {
        /// JSON array of entities
        #[arg(long, required_unless_present = "resume", conflicts_with = "resume")]
        cohort: Option<PathBuf>,

        /// Continue from the snapshot left in the data directory
        #[arg(long)]
        resume: bool,

        /// Number of days to simulate
        #[arg(long)]
        days: u32,

        /// Seed for the random draws
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// First simulated day (YYYY-MM-DD, default today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Replacement risk tables (JSON)
        #[arg(long)]
        tables: Option<PathBuf>,
    },

    /// Roll up the event trace to CSV
    Rollup {
        /// Clean up processed traces after rollup
        #[arg(long)]
        cleanup: bool,
    },

    /// Validate risk tables and print their coverage
    Tables {
        /// Tables to check instead of the built-in ones
        #[arg(long)]
        tables: Option<PathBuf>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

struct DataPaths {
    trace_dir: PathBuf,
    trace: PathBuf,
    csv: PathBuf,
    snapshot: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        let trace_dir = data_dir.join("trace");
        Self {
            trace: trace_dir.join("events.jsonl"),
            trace_dir,
            csv: data_dir.join("events.csv"),
            snapshot: data_dir.join("snapshot.json"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    cvdsim_core::logging::init_with_level(cvdsim_core::logging::level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Simulate {
            cohort,
            days,
            seed,
            start,
            tables,
            resume,
        } => {
            let (config, paths) = load_context(&cli.config, &cli.data_dir)?;
            let source = match (cohort, resume) {
                (Some(path), false) => CohortSource::File(path),
                _ => CohortSource::Snapshot,
            };
            cmd_simulate(config, &paths, source, days, seed, start, tables.as_deref())
        }
        Commands::Rollup { cleanup } => {
            let (_, paths) = load_context(&cli.config, &cli.data_dir)?;
            cmd_rollup(&paths, cleanup)
        }
        Commands::Tables { tables } => cmd_tables(tables.as_deref()),
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), force),
    }
}

fn load_context(
    config_path: &Option<PathBuf>,
    data_dir: &Option<PathBuf>,
) -> Result<(Config, DataPaths)> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let paths = DataPaths::new(&data_dir);
    Ok((config, paths))
}

enum CohortSource {
    File(PathBuf),
    Snapshot,
}

fn load_tables(path: Option<&Path>) -> Result<RiskTables> {
    match path {
        Some(path) => RiskTables::load_from(path),
        None => Ok(framingham_tables().clone()),
    }
}

fn start_time(start: Option<NaiveDate>) -> DateTime<Utc> {
    let date = start.unwrap_or_else(|| Utc::now().date_naive());
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn cmd_simulate(
    config: Config,
    paths: &DataPaths,
    source: CohortSource,
    days: u32,
    seed: u64,
    start: Option<NaiveDate>,
    tables_path: Option<&Path>,
) -> Result<()> {
    let tables = load_tables(tables_path)?;
    let model = Arc::new(CardioModel::new(config, tables)?);
    let schedule = cardiovascular::schedule(model)?;

    let cohort = match source {
        CohortSource::File(path) => load_cohort(&path)?,
        CohortSource::Snapshot => load_snapshot(&paths.snapshot)?,
    };
    let options = RunOptions {
        start: start_time(start),
        days,
        seed,
    };
    let outcomes = run_cohort(&schedule, cohort, &options)?;

    let records: Vec<TraceRecord> = outcomes
        .iter()
        .flat_map(|o| TraceRecord::for_events(o.entity.id, o.new_events()))
        .collect();
    let mut sink = JsonlEventSink::new(&paths.trace);
    sink.append(&records)?;

    let entities: Vec<Entity> = outcomes.iter().map(|o| o.entity.clone()).collect();
    save_snapshot(&paths.snapshot, &entities)?;

    let deaths = entities.iter().filter(|e| !e.is_alive()).count();
    let visits: usize = outcomes.iter().map(|o| o.care.emergency_visits()).sum();
    let person_days: u64 = outcomes.iter().map(|o| u64::from(o.days_alive)).sum();

    println!(
        "✓ Simulated {} entities for {} days (seed {})",
        entities.len(),
        days,
        seed
    );
    println!("  Person-days: {}", person_days);
    println!("  Deaths: {}", deaths);
    println!("  Emergency visits: {}", visits);
    println!("  Events: {}", records.len());
    for (kind, count) in count_by_kind(&records) {
        println!("    {}: {}", kind, count);
    }
    println!("  Trace: {}", paths.trace.display());
    println!("  Snapshot: {}", paths.snapshot.display());

    Ok(())
}

fn cmd_rollup(paths: &DataPaths, cleanup: bool) -> Result<()> {
    if !paths.trace.exists() {
        println!("No trace file found - nothing to roll up.");
        return Ok(());
    }

    let count = trace_to_csv_and_archive(&paths.trace, &paths.csv)?;

    println!("✓ Rolled up {} events to CSV", count);
    println!("  CSV: {}", paths.csv.display());

    if cleanup {
        let cleaned = cleanup_processed_traces(&paths.trace_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed traces", cleaned);
        }
    }

    Ok(())
}

fn cmd_tables(path: Option<&Path>) -> Result<()> {
    let tables = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str::<RiskTables>(&contents)?
        }
        None => framingham_tables().clone(),
    };

    let errors = tables.validate();
    if !errors.is_empty() {
        eprintln!("Risk table validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::TableDomain(format!("{} problems", errors.len())));
    }

    for gender in [Gender::M, Gender::F] {
        let coronary = tables.coronary(gender);
        let stroke = tables.stroke(gender);
        println!("{:?}:", gender);
        println!(
            "  CHD scores {}..={} -> risk keys {}..={}",
            coronary.low,
            coronary.high,
            coronary.risk.first_key,
            coronary.risk.last_key()
        );
        println!(
            "  Stroke scores 0..={} -> risk keys {}..={}",
            stroke.max_score().unwrap_or_default(),
            stroke.risk.first_key,
            stroke.risk.last_key()
        );
    }
    println!("✓ Risk tables valid");
    Ok(())
}

fn cmd_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_config_path);
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    Config::default().save_to(&path)?;
    println!("✓ Wrote default config to {}", path.display());
    Ok(())
}
