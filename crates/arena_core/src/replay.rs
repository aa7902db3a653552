//! Combat records for storing and replaying fights.
//!
//! A record keeps the config and the initial teams next to the NDJSON event
//! stream and the result. The stream can be checked two ways: by running
//! the fight again and comparing lines, or by reconstructing state from the
//! events alone and checking it against the final snapshot.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::components::{Teams, UnitState};
use crate::dispatcher::EventLog;
use crate::error::{ArenaError, Result};
use crate::events::{parse_ndjson, CombatEvent};
use crate::reconstruct::{Reconstructor, SnapshotPolicy};
use crate::simulation::{CombatResult, CombatSimulator, SimConfig};
use crate::snapshot::CombatSnapshot;

/// Record format version for compatibility.
pub const RECORD_VERSION: u32 = 1;

/// A finished fight with everything needed to check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatRecord {
    /// Record format version.
    pub version: u32,
    /// Config the fight ran with.
    pub config: SimConfig,
    /// Teams before the first tick.
    pub teams: Teams,
    /// Events as NDJSON lines in delivery order.
    pub event_lines: Vec<String>,
    /// Final result.
    pub result: CombatResult,
}

impl CombatRecord {
    /// Run a fight and record it.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs are invalid or an event cannot be
    /// serialized.
    pub fn record(config: &SimConfig, team_a: Vec<UnitState>, team_b: Vec<UnitState>) -> Result<Self> {
        let teams = Teams::new(team_a, team_b);
        let (result, event_lines) = Self::simulate(config, &teams)?;
        Ok(Self {
            version: RECORD_VERSION,
            config: config.clone(),
            teams,
            event_lines,
            result,
        })
    }

    fn simulate(config: &SimConfig, teams: &Teams) -> Result<(CombatResult, Vec<String>)> {
        let mut sim = CombatSimulator::new(
            config.clone(),
            teams.player.clone(),
            teams.opponent.clone(),
            EventLog::new(),
        )?;
        let result = sim.run()?;
        let lines = sim.into_sink().to_ndjson_lines()?;
        Ok((result, lines))
    }

    /// Write the record as bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)
            .map_err(|e| ArenaError::Record(format!("Failed to write combat record: {e}")))
    }

    /// Read a bincode record.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the version does not match.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let record: Self = bincode::deserialize_from(reader)
            .map_err(|e| ArenaError::Record(format!("Failed to read combat record: {e}")))?;

        if record.version != RECORD_VERSION {
            return Err(ArenaError::Record(format!(
                "Record version mismatch: expected {}, got {}",
                RECORD_VERSION, record.version
            )));
        }
        Ok(record)
    }

    /// Parse the stored events.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored line is not a valid event.
    pub fn events(&self) -> Result<Vec<CombatEvent>> {
        parse_ndjson(&self.event_lines.join("\n"))
    }

    /// The stream as one NDJSON document.
    #[must_use]
    pub fn to_ndjson(&self) -> String {
        let mut out = String::new();
        for line in &self.event_lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Number of stored events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.event_lines.len()
    }

    /// Run the fight again from the stored teams and config and compare
    /// the streams line by line.
    ///
    /// Returns the index of the first differing line, or `None` when the
    /// streams are identical.
    ///
    /// # Errors
    ///
    /// Returns an error if the fight cannot be run.
    pub fn rerun(&self) -> Result<Option<usize>> {
        let (result, lines) = Self::simulate(&self.config, &self.teams)?;
        let mismatch = first_mismatch(&self.event_lines, &lines);
        if mismatch.is_none() && result != self.result {
            tracing::warn!("Event streams match but results differ");
            return Ok(Some(lines.len()));
        }
        if let Some(index) = mismatch {
            tracing::warn!(line = index, "Rerun diverged from the record");
        }
        Ok(mismatch)
    }

    /// Reconstruct state from the stored events, verifying every snapshot,
    /// and check it against the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::DesyncDetected`] for the first divergence, or
    /// any reconstruction fault.
    pub fn reconstruct(&self) -> Result<Reconstructor> {
        let events = self.events()?;
        let reconstructor = Reconstructor::replay(SnapshotPolicy::Verify, &events)?;
        if let Some(first) = reconstructor.divergences().first() {
            return Err(first.clone().into());
        }
        let final_snapshot = events
            .iter()
            .rev()
            .find_map(CombatSnapshot::from_event)
            .ok_or(ArenaError::MissingSnapshot)?;
        reconstructor.verify_against(&final_snapshot)?;
        Ok(reconstructor)
    }
}

/// Index of the first position where two line lists differ.
#[must_use]
pub fn first_mismatch(expected: &[String], actual: &[String]) -> Option<usize> {
    let common = expected.len().min(actual.len());
    (0..common)
        .find(|&i| expected[i] != actual[i])
        .or_else(|| (expected.len() != actual.len()).then_some(common))
}
