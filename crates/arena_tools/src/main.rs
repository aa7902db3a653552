//! Arena Combat - Development Tools

use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use arena_core::reconstruct::SnapshotPolicy;
use arena_tools::error::{Result, ToolError};
use arena_tools::{run, validate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "arena-tools")]
#[command(about = "Development tools for Arena Combat")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Mid-stream snapshots overwrite reconstructed state
    Overwrite,
    /// Mid-stream snapshots are compared, never applied
    Verify,
}

impl From<Policy> for SnapshotPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Overwrite => SnapshotPolicy::Overwrite,
            Policy::Verify => SnapshotPolicy::Verify,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its events as NDJSON
    Simulate {
        /// Scenario file
        scenario: PathBuf,
        /// Template file or directory
        #[arg(short, long, default_value = "assets/data")]
        templates: PathBuf,
        /// Override the scenario's seed
        #[arg(short, long)]
        seed: Option<u64>,
        /// Write events here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also save a combat record (bincode)
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Reconstruct state from an NDJSON log and report divergences
    Verify {
        /// NDJSON file; stdin when absent
        input: Option<PathBuf>,
        /// How mid-stream snapshots are treated
        #[arg(long, value_enum, default_value = "verify")]
        policy: Policy,
    },
    /// Rerun and reconstruct a saved combat record
    CheckRecord {
        /// Record file
        record: PathBuf,
    },
    /// Validate data files
    Validate {
        /// Template file or directory
        #[arg(default_value = "assets/data")]
        path: PathBuf,
        /// Scenario directory to check against the templates
        #[arg(long)]
        scenarios: Option<PathBuf>,
    },
    /// Run a scenario over many seeds and report win rates
    Batch {
        /// Scenario file
        scenario: PathBuf,
        /// Template file or directory
        #[arg(short, long, default_value = "assets/data")]
        templates: PathBuf,
        /// Number of seeds
        #[arg(short = 'n', long, default_value_t = 100)]
        count: u64,
        /// First seed
        #[arg(long, default_value_t = 0)]
        first_seed: u64,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default)
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn execute(command: Commands) -> Result<bool> {
    match command {
        Commands::Simulate {
            scenario,
            templates,
            seed,
            output,
            record,
        } => {
            let registry = validate::load_templates(&templates)?;
            let scenario = validate::load_scenario(&scenario)?;
            let combat = run::simulate_scenario(&registry, &scenario, seed)?;
            match output {
                Some(path) => {
                    let file = File::create(&path).map_err(|e| ToolError::io(&path, e))?;
                    run::write_events(&combat, BufWriter::new(file))?;
                }
                None => run::write_events(&combat, io::stdout().lock())?,
            }
            if let Some(path) = record {
                run::save_record(&combat, &path)?;
            }
            tracing::info!("{}", run::describe(&combat.result));
            Ok(true)
        }
        Commands::Verify { input, policy } => {
            let text = match input {
                Some(path) => std::fs::read_to_string(&path).map_err(|e| ToolError::io(&path, e))?,
                None => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    text
                }
            };
            let report = run::verify_ndjson(&text, policy.into())?;
            tracing::info!(
                events = report.events,
                divergences = report.divergences.len(),
                final_snapshot_matches = report.final_snapshot_matches,
                "Reconstruction finished"
            );
            Ok(report.is_clean())
        }
        Commands::CheckRecord { record } => {
            let record = run::load_record(&record)?;
            let report = run::check_record(&record)?;
            if let Some(line) = report.rerun_mismatch {
                tracing::error!(line, "Rerun diverged from the record");
            }
            if let Some(error) = &report.reconstruction_error {
                tracing::error!("Reconstruction failed: {error}");
            }
            tracing::info!(events = report.events, "Record checked");
            Ok(report.rerun_mismatch.is_none() && report.reconstruction_error.is_none())
        }
        Commands::Validate { path, scenarios } => {
            tracing::info!("Validating data files in: {}", path.display());
            validate::validate_data_directory(&path, scenarios.as_deref())?;
            tracing::info!("Validation passed");
            Ok(true)
        }
        Commands::Batch {
            scenario,
            templates,
            count,
            first_seed,
            json,
        } => {
            let registry = validate::load_templates(&templates)?;
            let scenario = validate::load_scenario(&scenario)?;
            let report = run::run_batch(&registry, &scenario, first_seed, count)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", run::describe_batch(&report));
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
