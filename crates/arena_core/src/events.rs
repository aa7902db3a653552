//! Combat events and their wire format.
//!
//! Every state change in a fight is described by exactly one
//! [`CombatEvent`]. Events travel as newline-delimited JSON objects of the
//! shape `{type, seq, event_id, timestamp, ...payload}`.
//!
//! Some payloads repeat a value under several historical field names
//! (`damage` / `applied_damage`, `unit_hp` / `target_hp` / `new_hp`, ...).
//! In memory each value has one canonical field; the aliases are produced
//! on serialization and only read back as fallbacks when the canonical
//! name is missing.

use serde::{Deserialize, Serialize};

use crate::components::{EffectId, Side, StatKind, UnitId};
use crate::effects::{DamageType, ValueType};
use crate::error::{ArenaError, Result};
use crate::math::{fixed_float, option_fixed_float, Fixed, SimTime};
use crate::simulation::Winner;
use crate::snapshot::SnapshotUnit;

// ============================================================================
// Envelope
// ============================================================================

/// One event of a combat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEvent {
    /// Delivery order. Assigned by the dispatcher on successful delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Unique identifier for idempotent client handling.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_id: String,
    /// Simulated time at which the event logically happens.
    #[serde(with = "fixed_float")]
    pub timestamp: SimTime,
    /// Type tag and type-specific fields.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl CombatEvent {
    /// Create an undelivered event.
    #[must_use]
    pub fn new(timestamp: SimTime, payload: EventPayload) -> Self {
        Self {
            seq: None,
            event_id: String::new(),
            timestamp,
            payload,
        }
    }

    /// Wire name of the event type.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.payload.type_name()
    }

    /// Whether this is a `state_snapshot` event.
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        matches!(self.payload, EventPayload::StateSnapshot(_))
    }
}

/// Type-specific part of an event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A basic attack or skill damage landed.
    UnitAttack(DamagePayload),
    /// A damage-over-time effect was attached.
    DamageOverTimeApplied(DotAppliedPayload),
    /// A damage-over-time effect ticked.
    DamageOverTimeTick(DamagePayload),
    /// A damage-over-time effect ran out of ticks.
    DamageOverTimeExpired(EffectExpiredPayload),
    /// HP was restored.
    UnitHeal(HealPayload),
    /// A shield layer was added.
    ShieldApplied(ShieldPayload),
    /// A stat was buffed or debuffed.
    StatBuff(StatBuffPayload),
    /// A unit started casting its skill.
    SkillCast(SkillCastPayload),
    /// A unit was stunned.
    UnitStunned(StunPayload),
    /// A unit died.
    UnitDied(DeathPayload),
    /// Mana was set to a new value.
    ManaUpdate(ManaPayload),
    /// Per-second mana regeneration.
    RegenGain(RegenPayload),
    /// A status marker or trigger was attached.
    EffectApplied(EffectAppliedPayload),
    /// A timed effect ended.
    EffectExpired(EffectExpiredPayload),
    /// A visual windup started.
    AnimationStart(AnimationPayload),
    /// Full state checkpoint.
    StateSnapshot(SnapshotPayload),
    /// The fight is over.
    CombatEnd(CombatEndPayload),
}

impl EventPayload {
    /// Wire name of the event type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            EventPayload::UnitAttack(_) => "unit_attack",
            EventPayload::DamageOverTimeApplied(_) => "damage_over_time_applied",
            EventPayload::DamageOverTimeTick(_) => "damage_over_time_tick",
            EventPayload::DamageOverTimeExpired(_) => "damage_over_time_expired",
            EventPayload::UnitHeal(_) => "unit_heal",
            EventPayload::ShieldApplied(_) => "shield_applied",
            EventPayload::StatBuff(_) => "stat_buff",
            EventPayload::SkillCast(_) => "skill_cast",
            EventPayload::UnitStunned(_) => "unit_stunned",
            EventPayload::UnitDied(_) => "unit_died",
            EventPayload::ManaUpdate(_) => "mana_update",
            EventPayload::RegenGain(_) => "regen_gain",
            EventPayload::EffectApplied(_) => "effect_applied",
            EventPayload::EffectExpired(_) => "effect_expired",
            EventPayload::AnimationStart(_) => "animation_start",
            EventPayload::StateSnapshot(_) => "state_snapshot",
            EventPayload::CombatEnd(_) => "combat_end",
        }
    }
}

// ============================================================================
// Damage
// ============================================================================

/// What caused a damage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DamageCause {
    /// Basic attack.
    #[default]
    Attack,
    /// Skill or trigger effect.
    Skill,
    /// Damage-over-time tick.
    DamageOverTime,
}

/// Damage applied to one unit. Shield absorbs first, then HP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "DamageWire", try_from = "DamageWire")]
pub struct DamagePayload {
    /// Attacking unit; absent for damage over time.
    pub attacker_id: Option<UnitId>,
    /// Attacker display name.
    pub attacker_name: Option<String>,
    /// Attacker side.
    pub attacker_side: Option<Side>,
    /// Damaged unit.
    pub target_id: UnitId,
    /// Damaged unit display name.
    pub target_name: String,
    /// Damaged unit side.
    pub side: Side,
    /// Incoming damage before shield absorption.
    pub damage: i32,
    /// Portion absorbed by shield.
    pub shield_absorbed: i32,
    /// HP before the hit.
    pub pre_hp: i32,
    /// HP after the hit.
    pub post_hp: i32,
    /// Shield before the hit.
    pub pre_shield: i32,
    /// Shield after the hit.
    pub post_shield: i32,
    /// Max HP of the target.
    pub max_hp: i32,
    /// Damage classification.
    pub damage_type: DamageType,
    /// What produced the damage.
    pub cause: DamageCause,
    /// Whether the damage came from a skill.
    pub is_skill: bool,
    /// Whether the hit dropped the target to 0 HP.
    pub is_kill: bool,
    /// Damage-over-time effect that ticked.
    pub effect_id: Option<EffectId>,
    /// Ticks left on that effect after this one.
    pub remaining_ticks: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct DamageWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attacker_id: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attacker_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attacker_side: Option<Side>,
    target_id: UnitId,
    #[serde(default)]
    target_name: String,
    side: Side,
    #[serde(default)]
    damage: Option<i32>,
    #[serde(default)]
    applied_damage: Option<i32>,
    #[serde(default)]
    shield_absorbed: i32,
    pre_hp: i32,
    #[serde(default)]
    post_hp: Option<i32>,
    #[serde(default)]
    unit_hp: Option<i32>,
    #[serde(default)]
    target_hp: Option<i32>,
    #[serde(default)]
    new_hp: Option<i32>,
    #[serde(default)]
    pre_shield: i32,
    #[serde(default)]
    post_shield: i32,
    max_hp: i32,
    #[serde(default)]
    damage_type: DamageType,
    #[serde(default)]
    cause: DamageCause,
    #[serde(default)]
    is_skill: bool,
    #[serde(default)]
    is_kill: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    effect_id: Option<EffectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remaining_ticks: Option<u32>,
}

/// First populated value among a canonical field and its aliases.
fn first_of<const N: usize>(field: &str, values: [Option<i32>; N]) -> std::result::Result<i32, String> {
    values
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| format!("missing field `{field}` and all of its aliases"))
}

impl From<DamagePayload> for DamageWire {
    fn from(p: DamagePayload) -> Self {
        Self {
            attacker_id: p.attacker_id,
            attacker_name: p.attacker_name,
            attacker_side: p.attacker_side,
            target_id: p.target_id,
            target_name: p.target_name,
            side: p.side,
            damage: Some(p.damage),
            applied_damage: Some(p.damage),
            shield_absorbed: p.shield_absorbed,
            pre_hp: p.pre_hp,
            post_hp: Some(p.post_hp),
            unit_hp: Some(p.post_hp),
            target_hp: Some(p.post_hp),
            new_hp: Some(p.post_hp),
            pre_shield: p.pre_shield,
            post_shield: p.post_shield,
            max_hp: p.max_hp,
            damage_type: p.damage_type,
            cause: p.cause,
            is_skill: p.is_skill,
            is_kill: p.is_kill,
            effect_id: p.effect_id,
            remaining_ticks: p.remaining_ticks,
        }
    }
}

impl TryFrom<DamageWire> for DamagePayload {
    type Error = String;

    fn try_from(w: DamageWire) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            attacker_id: w.attacker_id,
            attacker_name: w.attacker_name,
            attacker_side: w.attacker_side,
            target_id: w.target_id,
            target_name: w.target_name,
            side: w.side,
            damage: first_of("damage", [w.damage, w.applied_damage])?,
            shield_absorbed: w.shield_absorbed,
            pre_hp: w.pre_hp,
            post_hp: first_of("post_hp", [w.post_hp, w.unit_hp, w.target_hp, w.new_hp])?,
            pre_shield: w.pre_shield,
            post_shield: w.post_shield,
            max_hp: w.max_hp,
            damage_type: w.damage_type,
            cause: w.cause,
            is_skill: w.is_skill,
            is_kill: w.is_kill,
            effect_id: w.effect_id,
            remaining_ticks: w.remaining_ticks,
        })
    }
}

/// A damage-over-time effect was attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotAppliedPayload {
    /// New effect.
    pub effect_id: EffectId,
    /// Affected unit.
    pub unit_id: UnitId,
    /// Affected unit name.
    pub unit_name: String,
    /// Affected unit side.
    pub side: Side,
    /// Applying unit.
    #[serde(default)]
    pub source_id: Option<UnitId>,
    /// Applying unit name.
    #[serde(default)]
    pub source_name: Option<String>,
    /// Damage per tick.
    pub damage: i32,
    /// Number of ticks.
    pub ticks: u32,
    /// Seconds between ticks.
    #[serde(with = "fixed_float")]
    pub interval: Fixed,
    /// Time of the first tick.
    #[serde(with = "fixed_float")]
    pub next_tick_at: SimTime,
}

// ============================================================================
// Heal, shield, stats
// ============================================================================

/// HP restored, clamped at max HP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "HealWire", try_from = "HealWire")]
pub struct HealPayload {
    /// Healed unit.
    pub unit_id: UnitId,
    /// Healed unit name.
    pub unit_name: String,
    /// Healed unit side.
    pub side: Side,
    /// Healing unit.
    pub source_id: Option<UnitId>,
    /// Healing unit name.
    pub source_name: Option<String>,
    /// HP actually restored.
    pub amount: i32,
    /// HP before healing.
    pub pre_hp: i32,
    /// HP after healing.
    pub post_hp: i32,
    /// Max HP of the unit.
    pub max_hp: i32,
}

#[derive(Serialize, Deserialize)]
struct HealWire {
    unit_id: UnitId,
    #[serde(default)]
    unit_name: String,
    side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_id: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_name: Option<String>,
    #[serde(default)]
    amount: Option<i32>,
    #[serde(default)]
    heal_amount: Option<i32>,
    pre_hp: i32,
    #[serde(default)]
    post_hp: Option<i32>,
    #[serde(default)]
    unit_hp: Option<i32>,
    #[serde(default)]
    new_hp: Option<i32>,
    max_hp: i32,
}

impl From<HealPayload> for HealWire {
    fn from(p: HealPayload) -> Self {
        Self {
            unit_id: p.unit_id,
            unit_name: p.unit_name,
            side: p.side,
            source_id: p.source_id,
            source_name: p.source_name,
            amount: Some(p.amount),
            heal_amount: Some(p.amount),
            pre_hp: p.pre_hp,
            post_hp: Some(p.post_hp),
            unit_hp: Some(p.post_hp),
            new_hp: Some(p.post_hp),
            max_hp: p.max_hp,
        }
    }
}

impl TryFrom<HealWire> for HealPayload {
    type Error = String;

    fn try_from(w: HealWire) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            unit_id: w.unit_id,
            unit_name: w.unit_name,
            side: w.side,
            source_id: w.source_id,
            source_name: w.source_name,
            amount: first_of("amount", [w.amount, w.heal_amount])?,
            pre_hp: w.pre_hp,
            post_hp: first_of("post_hp", [w.post_hp, w.unit_hp, w.new_hp])?,
            max_hp: w.max_hp,
        })
    }
}

/// A timed shield layer was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldPayload {
    /// New shield layer.
    pub effect_id: EffectId,
    /// Shielded unit.
    pub unit_id: UnitId,
    /// Shielded unit name.
    pub unit_name: String,
    /// Shielded unit side.
    pub side: Side,
    /// Applying unit.
    #[serde(default)]
    pub source_id: Option<UnitId>,
    /// Shield points added.
    pub amount: i32,
    /// Shield before.
    pub pre_shield: i32,
    /// Shield after.
    pub post_shield: i32,
    /// Layer expiry.
    #[serde(with = "fixed_float")]
    pub expires_at: SimTime,
}

/// A stat changed. `delta` is the applied change, amplification and
/// rounding included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBuffPayload {
    /// Effect record created for this change.
    pub effect_id: EffectId,
    /// Affected unit.
    pub unit_id: UnitId,
    /// Affected unit name.
    pub unit_name: String,
    /// Affected unit side.
    pub side: Side,
    /// Applying unit.
    #[serde(default)]
    pub source_id: Option<UnitId>,
    /// Applying unit name.
    #[serde(default)]
    pub source_name: Option<String>,
    /// Changed stat.
    pub stat: StatKind,
    /// Nominal configured value.
    #[serde(with = "fixed_float")]
    pub value: Fixed,
    /// Flat or percentage.
    pub value_type: ValueType,
    /// Amplifier that was applied to the delta.
    #[serde(with = "fixed_float")]
    pub amplifier: Fixed,
    /// Applied change.
    #[serde(with = "fixed_float")]
    pub delta: Fixed,
    /// Stat value after the change.
    #[serde(with = "fixed_float")]
    pub new_value: Fixed,
    /// Whether this lowers the stat.
    pub is_debuff: bool,
    /// When the change is reverted; permanent when absent.
    #[serde(default, with = "option_fixed_float", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SimTime>,
    /// HP after the change, for `max_hp` changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hp: Option<i32>,
}

/// A status marker or trigger was attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectAppliedPayload {
    /// New effect.
    pub effect_id: EffectId,
    /// Affected unit.
    pub unit_id: UnitId,
    /// Affected unit name.
    pub unit_name: String,
    /// Affected unit side.
    pub side: Side,
    /// Applying unit.
    #[serde(default)]
    pub source_id: Option<UnitId>,
    /// Effect kind tag.
    pub effect_type: String,
    /// Related stat, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<StatKind>,
    /// Kind-specific magnitude.
    #[serde(with = "fixed_float")]
    pub value: Fixed,
    /// Expiry time, if timed.
    #[serde(default, with = "option_fixed_float", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SimTime>,
}

/// A timed effect ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectExpiredPayload {
    /// Removed effect.
    pub effect_id: EffectId,
    /// Affected unit.
    pub unit_id: UnitId,
    /// Affected unit name.
    pub unit_name: String,
    /// Affected unit side.
    pub side: Side,
    /// Effect kind tag.
    pub effect_type: String,
    /// Reverted stat, for buffs and debuffs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<StatKind>,
    /// Change undone on the stat.
    #[serde(default, with = "option_fixed_float", skip_serializing_if = "Option::is_none")]
    pub reverted_delta: Option<Fixed>,
    /// Stat value after the revert.
    #[serde(default, with = "option_fixed_float", skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Fixed>,
    /// Shield points removed with an expiring layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shield_removed: Option<i32>,
    /// Shield after removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_shield: Option<i32>,
    /// HP after a `max_hp` revert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hp: Option<i32>,
}

// ============================================================================
// Mana
// ============================================================================

/// Why mana changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManaCause {
    /// Gained by landing an attack.
    #[default]
    Attack,
    /// Spent on a skill cast.
    SkillCast,
    /// Granted by an effect.
    Effect,
}

/// Mana was set to a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ManaWire", try_from = "ManaWire")]
pub struct ManaPayload {
    /// Affected unit.
    pub unit_id: UnitId,
    /// Affected unit name.
    pub unit_name: String,
    /// Affected unit side.
    pub side: Side,
    /// Mana after the change.
    pub mana: i32,
    /// Mana before the change.
    pub previous_mana: i32,
    /// `mana - previous_mana`.
    pub delta: i32,
    /// Mana pool size.
    pub max_mana: i32,
    /// What changed it.
    pub cause: ManaCause,
}

#[derive(Serialize, Deserialize)]
struct ManaWire {
    unit_id: UnitId,
    #[serde(default)]
    unit_name: String,
    side: Side,
    #[serde(default)]
    mana: Option<i32>,
    #[serde(default)]
    current_mana: Option<i32>,
    #[serde(default)]
    new_mana: Option<i32>,
    #[serde(default)]
    previous_mana: i32,
    #[serde(default)]
    delta: i32,
    max_mana: i32,
    #[serde(default)]
    cause: ManaCause,
}

impl From<ManaPayload> for ManaWire {
    fn from(p: ManaPayload) -> Self {
        Self {
            unit_id: p.unit_id,
            unit_name: p.unit_name,
            side: p.side,
            mana: Some(p.mana),
            current_mana: Some(p.mana),
            new_mana: Some(p.mana),
            previous_mana: p.previous_mana,
            delta: p.delta,
            max_mana: p.max_mana,
            cause: p.cause,
        }
    }
}

impl TryFrom<ManaWire> for ManaPayload {
    type Error = String;

    fn try_from(w: ManaWire) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            unit_id: w.unit_id,
            unit_name: w.unit_name,
            side: w.side,
            mana: first_of("mana", [w.mana, w.current_mana, w.new_mana])?,
            previous_mana: w.previous_mana,
            delta: w.delta,
            max_mana: w.max_mana,
            cause: w.cause,
        })
    }
}

/// Per-second mana regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenPayload {
    /// Regenerating unit.
    pub unit_id: UnitId,
    /// Regenerating unit name.
    pub unit_name: String,
    /// Regenerating unit side.
    pub side: Side,
    /// Mana actually gained.
    pub mana_gained: i32,
    /// Mana before.
    pub pre_mana: i32,
    /// Mana after.
    pub new_mana: i32,
    /// Mana pool size.
    pub max_mana: i32,
}

// ============================================================================
// Actions and lifecycle
// ============================================================================

/// A unit started casting its skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCastPayload {
    /// Casting unit.
    pub caster_id: UnitId,
    /// Caster name.
    pub caster_name: String,
    /// Caster side.
    pub side: Side,
    /// Skill name.
    pub skill_name: String,
    /// Current target, if any.
    #[serde(default)]
    pub target_id: Option<UnitId>,
    /// Current target name.
    #[serde(default)]
    pub target_name: Option<String>,
    /// Mana consumed by the cast.
    pub mana_spent: i32,
}

/// A unit was stunned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StunPayload {
    /// Stun effect.
    pub effect_id: EffectId,
    /// Stunned unit.
    pub unit_id: UnitId,
    /// Stunned unit name.
    pub unit_name: String,
    /// Stunned unit side.
    pub side: Side,
    /// Stunning unit.
    #[serde(default)]
    pub source_id: Option<UnitId>,
    /// Stun length.
    #[serde(with = "fixed_float")]
    pub duration: Fixed,
    /// Stun end.
    #[serde(with = "fixed_float")]
    pub expires_at: SimTime,
}

/// A unit died. Emitted exactly once per unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathPayload {
    /// Dead unit.
    pub unit_id: UnitId,
    /// Dead unit name.
    pub unit_name: String,
    /// Dead unit side.
    pub side: Side,
    /// Unit that dealt the killing blow.
    #[serde(default)]
    pub killer_id: Option<UnitId>,
    /// Killer name.
    #[serde(default)]
    pub killer_name: Option<String>,
    /// Killer side.
    #[serde(default)]
    pub killer_side: Option<Side>,
}

/// Kind of windup announced by `animation_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    /// Basic attack windup.
    Attack,
    /// Skill cast.
    Skill,
    /// A delayed skill effect is about to resolve.
    DelayedEffect,
}

/// A visual windup started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationPayload {
    /// Animated unit.
    pub unit_id: UnitId,
    /// Animated unit name.
    pub unit_name: String,
    /// Animated unit side.
    pub side: Side,
    /// Windup kind.
    pub animation: AnimationKind,
    /// Intended target.
    #[serde(default)]
    pub target_id: Option<UnitId>,
    /// Intended target side.
    #[serde(default)]
    pub target_side: Option<Side>,
    /// Windup length.
    #[serde(with = "fixed_float")]
    pub duration: Fixed,
    /// When the announced effect lands.
    #[serde(with = "fixed_float")]
    pub impact_at: SimTime,
}

/// Full state checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Team A units.
    pub player_units: Vec<SnapshotUnit>,
    /// Team B units.
    pub opponent_units: Vec<SnapshotUnit>,
}

/// The fight is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEndPayload {
    /// Winning team or draw.
    pub winner: Winner,
    /// Simulated length of the fight.
    #[serde(with = "fixed_float")]
    pub duration: SimTime,
    /// Alive units in team A.
    pub team_a_survivors: usize,
    /// Alive units in team B.
    pub team_b_survivors: usize,
}

// ============================================================================
// NDJSON
// ============================================================================

/// Serialize one event as a single JSON line (no trailing newline).
///
/// # Errors
///
/// Returns [`ArenaError::DataParseError`] if the event cannot be encoded.
pub fn to_ndjson_line(event: &CombatEvent) -> Result<String> {
    serde_json::to_string(event).map_err(|e| ArenaError::DataParseError {
        origin: format!("{} event", event.event_type()),
        message: e.to_string(),
    })
}

/// Parse newline-delimited JSON events. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`ArenaError::DataParseError`] naming the first bad line.
pub fn parse_ndjson(input: &str) -> Result<Vec<CombatEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| ArenaError::DataParseError {
                origin: format!("line {}", index + 1),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn damage() -> DamagePayload {
        DamagePayload {
            attacker_id: Some(1),
            attacker_name: Some("Knight".to_string()),
            attacker_side: Some(Side::Player),
            target_id: 2,
            target_name: "Orc".to_string(),
            side: Side::Opponent,
            damage: 25,
            shield_absorbed: 10,
            pre_hp: 100,
            post_hp: 85,
            pre_shield: 10,
            post_shield: 0,
            max_hp: 100,
            damage_type: DamageType::Physical,
            cause: DamageCause::Attack,
            is_skill: false,
            is_kill: false,
            effect_id: None,
            remaining_ticks: None,
        }
    }

    #[test]
    fn test_damage_aliases_are_mirrored() {
        let mut event = CombatEvent::new(Fixed::from_num(1.5), EventPayload::UnitAttack(damage()));
        event.seq = Some(4);
        event.event_id = "0000000000000000-00000004".to_string();

        let json: serde_json::Value = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["type"], "unit_attack");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["timestamp"], 1.5);
        assert_eq!(json["damage"], 25);
        assert_eq!(json["applied_damage"], 25);
        for alias in ["post_hp", "unit_hp", "target_hp", "new_hp"] {
            assert_eq!(json[alias], 85, "{alias}");
        }
    }

    #[test]
    fn test_ndjson_round_trip() {
        let mut event = CombatEvent::new(Fixed::ONE, EventPayload::UnitAttack(damage()));
        event.seq = Some(1);
        let line = to_ndjson_line(&event).expect("encodes");
        assert!(!line.contains('\n'));
        let parsed = parse_ndjson(&format!("{line}\n\n{line}\n")).expect("parses");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], event);
    }

    #[test]
    fn test_alias_fallback_on_parse() {
        let line = r#"{"type":"unit_heal","seq":3,"timestamp":2.0,"unit_id":1,"side":"player","heal_amount":7,"pre_hp":10,"new_hp":17,"max_hp":50}"#;
        let events = parse_ndjson(line).expect("parses");
        match &events[0].payload {
            EventPayload::UnitHeal(heal) => {
                assert_eq!(heal.amount, 7);
                assert_eq!(heal.post_hp, 17);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_canonical_name_wins_over_alias() {
        let line = r#"{"type":"mana_update","timestamp":0.0,"unit_id":1,"side":"opponent","mana":40,"new_mana":99,"max_mana":100}"#;
        let events = parse_ndjson(line).expect("parses");
        match &events[0].payload {
            EventPayload::ManaUpdate(mana) => assert_eq!(mana.mana, 40),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(events[0].seq, None);
    }

    #[test]
    fn test_missing_value_is_a_parse_error() {
        let line = r#"{"type":"unit_attack","timestamp":0.0,"target_id":1,"side":"player","pre_hp":10,"post_hp":5,"max_hp":10}"#;
        let err = parse_ndjson(line).unwrap_err();
        assert!(matches!(err, ArenaError::DataParseError { ref origin, .. } if origin == "line 1"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let line = r#"{"type":"gold_reward","timestamp":0.0,"amount":5}"#;
        assert!(parse_ndjson(line).is_err());
    }
}
