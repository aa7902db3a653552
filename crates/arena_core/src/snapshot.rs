//! Point-in-time captures of both teams.
//!
//! Snapshots are emitted periodically as `state_snapshot` events for UI
//! sync and serve as reconstruction checkpoints. A snapshot is a full dump,
//! never a delta.

use serde::{Deserialize, Serialize};

use crate::components::{EffectView, Position, Side, UnitId, UnitState};
use crate::events::{CombatEvent, EventPayload};
use crate::math::{fixed_float, Fixed, SimTime};

/// One unit as listed in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotUnit {
    /// Unit identifier within its side.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Current HP.
    pub hp: i32,
    /// Maximum HP.
    pub max_hp: i32,
    /// Current attack.
    pub attack: i32,
    /// Current defense.
    pub defense: i32,
    /// Current attacks per second.
    #[serde(with = "fixed_float")]
    pub attack_speed: Fixed,
    /// Current mana regeneration per second.
    #[serde(default)]
    pub mana_regen: i32,
    /// Current mana.
    pub current_mana: i32,
    /// Mana needed to cast.
    pub max_mana: i32,
    /// Total shield.
    pub shield: i32,
    /// Active effects in application order.
    #[serde(default)]
    pub effects: Vec<EffectView>,
    /// Board row.
    pub position: Position,
    /// Terminal death flag.
    #[serde(default)]
    pub is_dead: bool,
}

impl SnapshotUnit {
    /// Capture a unit.
    #[must_use]
    pub fn from_unit(unit: &UnitState) -> Self {
        Self {
            id: unit.id,
            name: unit.name.clone(),
            hp: unit.hp,
            max_hp: unit.max_hp,
            attack: unit.stats.attack,
            defense: unit.stats.defense,
            attack_speed: unit.stats.attack_speed,
            mana_regen: unit.stats.mana_regen,
            current_mana: unit.mana,
            max_mana: unit.max_mana,
            shield: unit.shield,
            effects: unit.effect_views(),
            position: unit.position,
            is_dead: unit.is_dead,
        }
    }

    /// Fields that differ from `expected`, as `(field, expected, actual)`.
    #[must_use]
    pub fn diff(&self, expected: &SnapshotUnit) -> Vec<(&'static str, String, String)> {
        let mut out = Vec::new();
        let mut check = |field: &'static str, want: String, got: String| {
            if want != got {
                out.push((field, want, got));
            }
        };
        check("hp", expected.hp.to_string(), self.hp.to_string());
        check("max_hp", expected.max_hp.to_string(), self.max_hp.to_string());
        check(
            "current_mana",
            expected.current_mana.to_string(),
            self.current_mana.to_string(),
        );
        check(
            "max_mana",
            expected.max_mana.to_string(),
            self.max_mana.to_string(),
        );
        check("shield", expected.shield.to_string(), self.shield.to_string());
        check("attack", expected.attack.to_string(), self.attack.to_string());
        check(
            "defense",
            expected.defense.to_string(),
            self.defense.to_string(),
        );
        check(
            "attack_speed",
            expected.attack_speed.to_string(),
            self.attack_speed.to_string(),
        );
        check(
            "mana_regen",
            expected.mana_regen.to_string(),
            self.mana_regen.to_string(),
        );
        check(
            "is_dead",
            expected.is_dead.to_string(),
            self.is_dead.to_string(),
        );
        if self.effects != expected.effects {
            check(
                "effects",
                format!("{:?}", expected.effects),
                format!("{:?}", self.effects),
            );
        }
        out
    }
}

/// Immutable capture of both teams at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    /// Team A units in team order.
    pub player_units: Vec<SnapshotUnit>,
    /// Team B units in team order.
    pub opponent_units: Vec<SnapshotUnit>,
    /// Sequence number of the snapshot event, when it was delivered.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Simulated seconds since combat start.
    #[serde(with = "fixed_float")]
    pub timestamp: SimTime,
}

impl CombatSnapshot {
    /// Capture two teams at `timestamp`.
    #[must_use]
    pub fn capture(player: &[UnitState], opponent: &[UnitState], timestamp: SimTime) -> Self {
        Self {
            player_units: player.iter().map(SnapshotUnit::from_unit).collect(),
            opponent_units: opponent.iter().map(SnapshotUnit::from_unit).collect(),
            seq: None,
            timestamp,
        }
    }

    /// Extract the snapshot carried by a `state_snapshot` event.
    #[must_use]
    pub fn from_event(event: &CombatEvent) -> Option<Self> {
        match &event.payload {
            EventPayload::StateSnapshot(payload) => Some(Self {
                player_units: payload.player_units.clone(),
                opponent_units: payload.opponent_units.clone(),
                seq: event.seq,
                timestamp: event.timestamp,
            }),
            _ => None,
        }
    }

    /// Units of one side.
    #[must_use]
    pub fn units(&self, side: Side) -> &[SnapshotUnit] {
        match side {
            Side::Player => &self.player_units,
            Side::Opponent => &self.opponent_units,
        }
    }

    /// Find a unit by side and id.
    #[must_use]
    pub fn unit(&self, side: Side, id: UnitId) -> Option<&SnapshotUnit> {
        self.units(side).iter().find(|u| u.id == id)
    }
}
