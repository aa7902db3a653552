//! # Arena Core
//!
//! Deterministic combat core for an auto-battler.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No file IO
//! - No unseeded randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! Two teams fight automatically on a fixed timestep. Every state change
//! is delivered as a sequenced [`events::CombatEvent`], and the
//! [`reconstruct::Reconstructor`] rebuilds the fight from those events
//! alone. This separation enables:
//! - Replays and UI playback from the event stream
//! - Determinism testing (same seed, same stream)
//! - Verification of the stream against the simulator's own state
//!
//! ## Crate Structure
//!
//! - [`components`] - Unit state, stats and active effects
//! - [`effects`] - Skill and effect definitions
//! - [`combat`] - Damage formula, targeting and star scaling
//! - [`emit`] - Canonical mutation and event emitters
//! - [`dispatcher`] - Event sequencing and scheduled delivery
//! - [`simulation`] - Core simulation loop
//! - [`reconstruct`] - Event-sourced state reconstruction
//! - [`replay`] - Combat records
//! - [`data`] - RON unit templates and scenarios
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod components;
pub mod data;
pub mod dispatcher;
pub mod effects;
pub mod emit;
pub mod error;
pub mod events;
pub mod math;
pub mod reconstruct;
pub mod replay;
pub mod simulation;
pub mod snapshot;
mod systems;
mod vitals;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::data::{BoardSlot, Scenario, TemplateRegistry, UnitTemplate};
    pub use crate::dispatcher::{EventLog, EventSink};
    pub use crate::effects::{DamageType, EffectSpec, EffectTarget, Skill, ValueType};
    pub use crate::error::{ArenaError, Result};
    pub use crate::events::{CombatEvent, EventPayload};
    pub use crate::math::Fixed;
    pub use crate::reconstruct::{Reconstructor, SnapshotPolicy};
    pub use crate::replay::CombatRecord;
    pub use crate::simulation::{simulate, CombatResult, CombatSimulator, SimConfig, Winner};
    pub use crate::snapshot::CombatSnapshot;
}
