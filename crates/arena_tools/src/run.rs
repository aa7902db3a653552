//! Running scenarios, checking event logs and batch statistics.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use arena_core::data::{Scenario, TemplateRegistry};
use arena_core::events::parse_ndjson;
use arena_core::reconstruct::{Divergence, Reconstructor, SnapshotPolicy};
use arena_core::replay::CombatRecord;
use arena_core::simulation::CombatResult;
use arena_core::snapshot::CombatSnapshot;
use arena_test_utils::balance::{run_battle, BattleResult, BattleStats};

use crate::error::{Result, ToolError};

/// Run a scenario, optionally with a different seed, and record it.
///
/// # Errors
///
/// Returns an error if the teams cannot be built or the run fails.
pub fn simulate_scenario(registry: &TemplateRegistry, scenario: &Scenario, seed: Option<u64>) -> Result<CombatRecord> {
    let (team_a, team_b) = scenario.build_teams(registry)?;
    let mut config = scenario.config.clone();
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    tracing::info!(scenario = %scenario.name, seed = config.seed, "Simulating");
    Ok(CombatRecord::record(&config, team_a, team_b)?)
}

/// Write a record's events as NDJSON.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(record: &CombatRecord, mut out: W) -> Result<()> {
    out.write_all(record.to_ndjson().as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Save a record as bincode.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_record(record: &CombatRecord, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| ToolError::io(path, e))?;
    record.save(BufWriter::new(file))?;
    Ok(())
}

/// Load a bincode record.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a record.
pub fn load_record(path: &Path) -> Result<CombatRecord> {
    let file = File::open(path).map_err(|e| ToolError::io(path, e))?;
    Ok(CombatRecord::load(BufReader::new(file))?)
}

/// One-line summary of a result.
#[must_use]
pub fn describe(result: &CombatResult) -> String {
    format!(
        "{} after {:.1}s ({} vs {} survivors)",
        result.winner,
        result.duration.to_num::<f64>(),
        result.team_a_survivors,
        result.team_b_survivors
    )
}

/// Outcome of replaying an NDJSON log.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Events processed.
    pub events: usize,
    /// Values the stream disagreed with.
    pub divergences: Vec<Divergence>,
    /// Whether the reconstruction matched the last snapshot in the log.
    pub final_snapshot_matches: bool,
}

impl VerifyReport {
    /// No divergences and a matching final snapshot.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty() && self.final_snapshot_matches
    }
}

/// Reconstruct state from an NDJSON log.
///
/// # Errors
///
/// Returns an error if the log does not parse or the stream is unusable
/// (no initial snapshot, unknown units).
pub fn verify_ndjson(input: &str, policy: SnapshotPolicy) -> Result<VerifyReport> {
    let events = parse_ndjson(input)?;
    let reconstructor = Reconstructor::replay(policy, &events)?;
    let final_snapshot_matches = match events.iter().filter_map(CombatSnapshot::from_event).max_by_key(|s| s.seq) {
        Some(snapshot) => match reconstructor.verify_against(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Final snapshot mismatch: {e}");
                false
            }
        },
        None => false,
    };
    for divergence in reconstructor.divergences() {
        tracing::warn!(
            seq = ?divergence.seq,
            event = divergence.event_type,
            unit = %format!("{}:{}", divergence.side, divergence.unit),
            field = divergence.field,
            expected = %divergence.expected,
            actual = %divergence.actual,
            "Divergence"
        );
    }
    Ok(VerifyReport {
        events: reconstructor.processed(),
        divergences: reconstructor.divergences().to_vec(),
        final_snapshot_matches,
    })
}

/// Outcome of checking a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    /// Stored events.
    pub events: usize,
    /// First line where a rerun differed, if any.
    pub rerun_mismatch: Option<usize>,
    /// Reconstruction error, if any.
    pub reconstruction_error: Option<String>,
}

/// Rerun a record and reconstruct its stream.
///
/// # Errors
///
/// Returns an error if the fight cannot be rerun.
pub fn check_record(record: &CombatRecord) -> Result<RecordReport> {
    let rerun_mismatch = record.rerun()?;
    let reconstruction_error = record.reconstruct().err().map(|e| e.to_string());
    Ok(RecordReport {
        events: record.event_count(),
        rerun_mismatch,
        reconstruction_error,
    })
}

/// Batch results with their summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Scenario name.
    pub scenario: String,
    /// Aggregated statistics.
    pub stats: BattleStats,
    /// Per-seed results in seed order.
    pub results: Vec<BattleResult>,
}

/// Run a scenario once per seed in `first_seed..first_seed + count`, in
/// parallel. Each run owns its own teams and random source.
///
/// # Errors
///
/// Returns the first error in seed order.
pub fn run_batch(registry: &TemplateRegistry, scenario: &Scenario, first_seed: u64, count: u64) -> Result<BatchReport> {
    let results = (first_seed..first_seed + count)
        .into_par_iter()
        .map(|seed| -> Result<BattleResult> {
            let (team_a, team_b) = scenario.build_teams(registry)?;
            Ok(run_battle(&scenario.config, seed, team_a, team_b)?)
        })
        .collect::<Result<Vec<_>>>()?;
    let stats = BattleStats::from_results(&results);
    tracing::info!(
        scenario = %scenario.name,
        battles = stats.total_battles,
        win_rate_a = stats.win_rate_a(),
        win_rate_b = stats.win_rate_b(),
        "Batch finished"
    );
    Ok(BatchReport {
        scenario: scenario.name.clone(),
        stats,
        results,
    })
}

/// Human-readable batch summary.
#[must_use]
pub fn describe_batch(report: &BatchReport) -> String {
    let stats = &report.stats;
    format!(
        "{}: {} battles, team_a {:.1}% / team_b {:.1}% / draw {:.1}%, avg {:.2}s",
        report.scenario,
        stats.total_battles,
        stats.win_rate_a() * 100.0,
        stats.win_rate_b() * 100.0,
        if stats.total_battles == 0 {
            0.0
        } else {
            f64::from(stats.draws) / f64::from(stats.total_battles) * 100.0
        },
        stats.avg_duration
    )
}
