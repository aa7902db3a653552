//! Combat unit state.
//!
//! A [`UnitState`] is created once per simulation run (from a template plus
//! star-level scaling, or directly by a caller) and is then owned by that
//! run. After construction, only the canonical emitters in [`crate::emit`]
//! mutate HP, shield, mana, stats and effects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effects::{EffectSpec, Skill, ValueType};
use crate::error::{ArenaError, Result};
use crate::math::{fixed_float, option_fixed_float, Fixed, SimTime};
use crate::vitals::StatSlots;

/// Identifier of a unit, stable across simulation and reconstruction.
pub type UnitId = u32;

/// Identifier of an active effect, unique within one simulation run.
pub type EffectId = u64;

// ============================================================================
// Identity
// ============================================================================

/// Which team a unit fights for.
///
/// `Player` is team A, `Opponent` is team B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Team A.
    Player,
    /// Team B.
    Opponent,
}

impl Side {
    /// The other team.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }

    /// Wire name of the side.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Player => "player",
            Side::Opponent => "opponent",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board row of a unit. Affects default targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Front row, targeted first by default.
    #[default]
    Front,
    /// Back row, preferred by `target_backline` units.
    Back,
}

/// Fully qualified unit reference: ids are only unique within a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Team of the unit.
    pub side: Side,
    /// Identifier within the team.
    pub id: UnitId,
}

impl UnitKey {
    /// Create a new unit key.
    #[must_use]
    pub const fn new(side: Side, id: UnitId) -> Self {
        Self { side, id }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.side, self.id)
    }
}

/// Identity of a unit as it appears in event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Unit key.
    pub key: UnitKey,
    /// Human-readable name.
    pub name: String,
}

// ============================================================================
// Stats
// ============================================================================

/// A stat that buffs and debuffs can modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Damage dealt per attack before defense.
    Attack,
    /// Flat damage reduction.
    Defense,
    /// Attacks per second.
    AttackSpeed,
    /// Maximum HP. Raising it also heals by the same amount.
    MaxHp,
    /// Mana gained per second.
    ManaRegen,
}

impl StatKind {
    /// Wire name of the stat.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StatKind::Attack => "attack",
            StatKind::Defense => "defense",
            StatKind::AttackSpeed => "attack_speed",
            StatKind::MaxHp => "max_hp",
            StatKind::ManaRegen => "mana_regen",
        }
    }

    /// Whether the stat is stored as a whole number.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        !matches!(self, StatKind::AttackSpeed)
    }
}

/// Combat statistics of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stats {
    /// Damage per attack before defense.
    pub attack: i32,
    /// Flat damage reduction.
    pub defense: i32,
    /// Attacks per second.
    #[serde(with = "fixed_float")]
    pub attack_speed: Fixed,
    /// Mana gained by the attacker on each landed attack.
    #[serde(default)]
    pub mana_on_attack: i32,
    /// Mana gained every simulated second.
    #[serde(default)]
    pub mana_regen: i32,
}

impl Stats {
    /// Create stats with no mana gain.
    #[must_use]
    pub fn new(attack: i32, defense: i32, attack_speed: Fixed) -> Self {
        Self {
            attack,
            defense,
            attack_speed,
            mana_on_attack: 0,
            mana_regen: 0,
        }
    }

    /// Builder method to set mana gains.
    #[must_use]
    pub const fn with_mana_gain(mut self, on_attack: i32, regen: i32) -> Self {
        self.mana_on_attack = on_attack;
        self.mana_regen = regen;
        self
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(10, 0, Fixed::ONE)
    }
}

// ============================================================================
// Active effects
// ============================================================================

/// Runtime status effect attached to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Stable identifier used by events and snapshots.
    pub effect_id: EffectId,
    /// What the effect does.
    pub kind: ActiveEffectKind,
    /// Simulated time at which the effect ends, if timed.
    #[serde(with = "option_fixed_float")]
    pub expires_at: Option<SimTime>,
    /// Unit that applied the effect.
    pub source: Option<UnitKey>,
}

/// Closed set of runtime effect kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActiveEffectKind {
    /// Buff or debuff already applied to a stat; reverted on expiry.
    StatModifier {
        /// Modified stat.
        stat: StatKind,
        /// Applied delta (after amplification and rounding).
        #[serde(with = "fixed_float")]
        delta: Fixed,
        /// Whether this came from a debuff.
        is_debuff: bool,
    },
    /// Shield layer; damage consumes the oldest layer first.
    Shield {
        /// Shield points left in this layer.
        remaining: i32,
    },
    /// Periodic damage.
    DamageOverTime {
        /// Damage per tick.
        damage: i32,
        /// Ticks left to deal.
        remaining_ticks: u32,
        /// Seconds between ticks.
        #[serde(with = "fixed_float")]
        interval: Fixed,
        /// Time of the next tick.
        #[serde(with = "fixed_float")]
        next_tick_at: SimTime,
    },
    /// Prevents the unit from acting.
    Stun,
    /// Grants a stat buff every second while active.
    PerSecondBuff {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value per second.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        value_type: ValueType,
    },
    /// Attacks prefer back-row targets.
    TargetBackline,
    /// Multiplies positive stat buffs received by the unit.
    BuffAmplifier {
        /// Multiplier applied to buff deltas.
        #[serde(with = "fixed_float")]
        multiplier: Fixed,
    },
    /// Resolves effects when an enemy dies.
    OnEnemyDeath {
        /// Effects resolved with this unit as caster.
        effects: Vec<EffectSpec>,
    },
    /// Resolves effects when an ally dies.
    OnAllyDeath {
        /// Effects resolved with this unit as caster.
        effects: Vec<EffectSpec>,
    },
    /// Buffs this unit whenever it lands a killing blow.
    KillBuff {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value per kill.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        value_type: ValueType,
    },
}

impl ActiveEffectKind {
    /// Wire name used in snapshots and `effect_applied` events.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            ActiveEffectKind::StatModifier {
                is_debuff: false, ..
            } => "buff",
            ActiveEffectKind::StatModifier { is_debuff: true, .. } => "debuff",
            ActiveEffectKind::Shield { .. } => "shield",
            ActiveEffectKind::DamageOverTime { .. } => "damage_over_time",
            ActiveEffectKind::Stun => "stun",
            ActiveEffectKind::PerSecondBuff { .. } => "per_second_buff",
            ActiveEffectKind::TargetBackline => "target_backline",
            ActiveEffectKind::BuffAmplifier { .. } => "buff_amplifier",
            ActiveEffectKind::OnEnemyDeath { .. } => "on_enemy_death",
            ActiveEffectKind::OnAllyDeath { .. } => "on_ally_death",
            ActiveEffectKind::KillBuff { .. } => "kill_buff",
        }
    }
}

/// Snapshot view of an active effect.
///
/// Both the simulator and the reconstructor produce these, so two views are
/// compared field by field during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectView {
    /// Effect identifier.
    pub effect_id: EffectId,
    /// Effect kind tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Affected stat, for stat effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<StatKind>,
    /// Kind-specific magnitude: stat delta, shield left, DoT damage, multiplier.
    #[serde(with = "fixed_float")]
    pub value: Fixed,
    /// Ticks left for damage over time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_ticks: Option<u32>,
    /// Expiry time, if timed.
    #[serde(default, with = "option_fixed_float")]
    pub expires_at: Option<SimTime>,
}

impl ActiveEffect {
    /// Build the snapshot view of this effect.
    #[must_use]
    pub fn view(&self) -> EffectView {
        let (stat, value, remaining_ticks) = match &self.kind {
            ActiveEffectKind::StatModifier { stat, delta, .. } => (Some(*stat), *delta, None),
            ActiveEffectKind::Shield { remaining } => (None, Fixed::from_num(*remaining), None),
            ActiveEffectKind::DamageOverTime {
                damage,
                remaining_ticks,
                ..
            } => (None, Fixed::from_num(*damage), Some(*remaining_ticks)),
            ActiveEffectKind::PerSecondBuff { stat, value, .. }
            | ActiveEffectKind::KillBuff { stat, value, .. } => (Some(*stat), *value, None),
            ActiveEffectKind::BuffAmplifier { multiplier } => (None, *multiplier, None),
            ActiveEffectKind::Stun
            | ActiveEffectKind::TargetBackline
            | ActiveEffectKind::OnEnemyDeath { .. }
            | ActiveEffectKind::OnAllyDeath { .. } => (None, Fixed::ZERO, None),
        };
        EffectView {
            effect_id: self.effect_id,
            kind: self.kind.tag().to_string(),
            stat,
            value,
            remaining_ticks,
            expires_at: self.expires_at,
        }
    }
}

// ============================================================================
// Unit state
// ============================================================================

/// Mutable combat record of one unit for the lifetime of a simulation run.
///
/// Invariants (checked by [`UnitState::validate`]):
/// - `0 <= hp <= max_hp`, `max_hp >= 1`
/// - `shield >= 0`
/// - `0 <= mana <= max_mana`
/// - `is_dead` is sticky: once set it is never cleared within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    /// Stable identifier within the unit's side.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Team.
    pub side: Side,
    /// Board row.
    pub position: Position,
    /// Template this unit was built from, if any.
    #[serde(default)]
    pub template_id: Option<String>,
    /// Star level (1-3).
    #[serde(default = "default_star_level")]
    pub star_level: u8,
    /// Current HP.
    pub hp: i32,
    /// Maximum HP.
    pub max_hp: i32,
    /// Total shield across all shield layers.
    pub shield: i32,
    /// Current mana.
    pub mana: i32,
    /// Mana needed to cast the skill.
    pub max_mana: i32,
    /// Stats before any buff.
    pub base: Stats,
    /// Current stats, buffs included.
    pub stats: Stats,
    /// Active status effects in application order.
    #[serde(default)]
    pub effects: Vec<ActiveEffect>,
    /// Terminal death flag.
    #[serde(default)]
    pub is_dead: bool,
    /// End of the current stun, if stunned.
    #[serde(default, with = "option_fixed_float")]
    pub stunned_until: Option<SimTime>,
    /// Skill cast when mana is full.
    #[serde(default)]
    pub skill: Option<Skill>,
    /// Effects applied at combat start with this unit as caster.
    #[serde(default)]
    pub passives: Vec<EffectSpec>,
}

const fn default_star_level() -> u8 {
    1
}

/// Default mana pool for units without an explicit one.
pub const DEFAULT_MAX_MANA: i32 = 100;

impl UnitState {
    /// Create a full-HP unit with no shield, no mana and no effects.
    #[must_use]
    pub fn new(id: UnitId, name: impl Into<String>, side: Side, max_hp: i32, stats: Stats) -> Self {
        Self {
            id,
            name: name.into(),
            side,
            position: Position::Front,
            template_id: None,
            star_level: 1,
            hp: max_hp,
            max_hp,
            shield: 0,
            mana: 0,
            max_mana: DEFAULT_MAX_MANA,
            base: stats,
            stats,
            effects: Vec::new(),
            is_dead: false,
            stunned_until: None,
            skill: None,
            passives: Vec::new(),
        }
    }

    /// Builder method to set the board row.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Builder method to set starting and maximum mana.
    #[must_use]
    pub fn with_mana(mut self, mana: i32, max_mana: i32) -> Self {
        self.mana = mana;
        self.max_mana = max_mana;
        self
    }

    /// Builder method to set a starting shield.
    ///
    /// A starting shield is untimed and not backed by a shield effect.
    #[must_use]
    pub fn with_shield(mut self, shield: i32) -> Self {
        self.shield = shield;
        self
    }

    /// Builder method to set the skill.
    #[must_use]
    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skill = Some(skill);
        self
    }

    /// Builder method to add a passive effect.
    #[must_use]
    pub fn with_passive(mut self, effect: EffectSpec) -> Self {
        self.passives.push(effect);
        self
    }

    /// Builder method to record the originating template.
    #[must_use]
    pub fn with_template(mut self, template_id: impl Into<String>, star_level: u8) -> Self {
        self.template_id = Some(template_id.into());
        self.star_level = star_level;
        self
    }

    /// Check construction invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidUnit`] describing the first violated
    /// invariant, or [`ArenaError::InvalidEffect`] for a bad skill/passive.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(ArenaError::InvalidUnit {
                unit: format!("{} ({})", self.name, UnitKey::new(self.side, self.id)),
                reason,
            })
        };

        if self.max_hp < 1 {
            return fail(format!("max_hp must be at least 1, got {}", self.max_hp));
        }
        if self.hp < 0 || self.hp > self.max_hp {
            return fail(format!("hp {} outside 0..={}", self.hp, self.max_hp));
        }
        if self.shield < 0 {
            return fail(format!("negative shield {}", self.shield));
        }
        if self.max_mana < 0 || self.mana < 0 || self.mana > self.max_mana {
            return fail(format!("mana {} outside 0..={}", self.mana, self.max_mana));
        }
        if self.stats.attack_speed < Fixed::ZERO {
            return fail("negative attack_speed".to_string());
        }
        if self.is_dead && self.hp > 0 {
            return fail("flagged dead with positive hp".to_string());
        }

        if let Some(skill) = &self.skill {
            skill.validate()?;
        }
        for passive in &self.passives {
            passive.validate(&self.name)?;
        }
        Ok(())
    }

    /// Fully qualified key of this unit.
    #[must_use]
    pub const fn key(&self) -> UnitKey {
        UnitKey::new(self.side, self.id)
    }

    /// Identity used in event payloads.
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor {
            key: self.key(),
            name: self.name.clone(),
        }
    }

    /// Whether the unit can still act and be targeted.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.is_dead && self.hp > 0
    }

    /// Whether the unit is stunned at `now`.
    #[must_use]
    pub fn is_stunned(&self, now: SimTime) -> bool {
        self.stunned_until.is_some_and(|until| until > now)
    }

    /// Whether any active effect matches `predicate`.
    #[must_use]
    pub fn has_effect(&self, predicate: impl Fn(&ActiveEffectKind) -> bool) -> bool {
        self.effects.iter().any(|e| predicate(&e.kind))
    }

    /// Whether the unit prefers back-row targets.
    #[must_use]
    pub fn targets_backline(&self) -> bool {
        self.has_effect(|k| matches!(k, ActiveEffectKind::TargetBackline))
    }

    /// Product of all active buff amplifiers (1 when none).
    #[must_use]
    pub fn buff_amplification(&self) -> Fixed {
        self.effects
            .iter()
            .filter_map(|e| match e.kind {
                ActiveEffectKind::BuffAmplifier { multiplier } => Some(multiplier),
                _ => None,
            })
            .fold(Fixed::ONE, |acc, m| acc.saturating_mul(m))
    }

    /// Current value of a stat.
    #[must_use]
    pub fn stat_value(&self, stat: StatKind) -> Fixed {
        match stat {
            StatKind::Attack => Fixed::from_num(self.stats.attack),
            StatKind::Defense => Fixed::from_num(self.stats.defense),
            StatKind::AttackSpeed => self.stats.attack_speed,
            StatKind::MaxHp => Fixed::from_num(self.max_hp),
            StatKind::ManaRegen => Fixed::from_num(self.stats.mana_regen),
        }
    }

    /// Add `delta` to a stat and return `(applied_delta, new_value)`.
    /// Only emitters call this.
    pub(crate) fn shift_stat(&mut self, stat: StatKind, delta: Fixed) -> (Fixed, Fixed) {
        StatSlots {
            hp: &mut self.hp,
            max_hp: &mut self.max_hp,
            attack: &mut self.stats.attack,
            defense: &mut self.stats.defense,
            attack_speed: &mut self.stats.attack_speed,
            mana_regen: &mut self.stats.mana_regen,
        }
        .shift(stat, delta)
    }

    /// Views of all active effects, in application order.
    #[must_use]
    pub fn effect_views(&self) -> Vec<EffectView> {
        self.effects.iter().map(ActiveEffect::view).collect()
    }
}

// ============================================================================
// Teams
// ============================================================================

/// Both rosters of one fight, in team order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Teams {
    /// Team A.
    pub player: Vec<UnitState>,
    /// Team B.
    pub opponent: Vec<UnitState>,
}

impl Teams {
    /// Create a roster pair. Each unit's `side` is forced to match its team.
    #[must_use]
    pub fn new(mut player: Vec<UnitState>, mut opponent: Vec<UnitState>) -> Self {
        for unit in &mut player {
            unit.side = Side::Player;
        }
        for unit in &mut opponent {
            unit.side = Side::Opponent;
        }
        Self { player, opponent }
    }

    /// Validate every unit and reject duplicate ids within a side.
    ///
    /// # Errors
    ///
    /// Returns the first unit validation error found.
    pub fn validate(&self) -> Result<()> {
        for team in [&self.player, &self.opponent] {
            for (index, unit) in team.iter().enumerate() {
                unit.validate()?;
                if team[..index].iter().any(|u| u.id == unit.id) {
                    return Err(ArenaError::InvalidUnit {
                        unit: unit.key().to_string(),
                        reason: "duplicate unit id".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Units of one side.
    #[must_use]
    pub fn side(&self, side: Side) -> &[UnitState] {
        match side {
            Side::Player => &self.player,
            Side::Opponent => &self.opponent,
        }
    }

    /// Mutable units of one side.
    pub fn side_mut(&mut self, side: Side) -> &mut [UnitState] {
        match side {
            Side::Player => &mut self.player,
            Side::Opponent => &mut self.opponent,
        }
    }

    /// Look up a unit.
    #[must_use]
    pub fn get(&self, key: UnitKey) -> Option<&UnitState> {
        self.side(key.side).iter().find(|u| u.id == key.id)
    }

    /// Look up a unit mutably.
    pub fn get_mut(&mut self, key: UnitKey) -> Option<&mut UnitState> {
        self.side_mut(key.side).iter_mut().find(|u| u.id == key.id)
    }

    /// Every unit key, team A in order then team B in order.
    #[must_use]
    pub fn keys(&self) -> Vec<UnitKey> {
        self.player
            .iter()
            .chain(&self.opponent)
            .map(UnitState::key)
            .collect()
    }

    /// Alive units on one side.
    #[must_use]
    pub fn alive_count(&self, side: Side) -> usize {
        self.side(side).iter().filter(|u| u.is_alive()).count()
    }

    /// All units, team A first.
    pub fn iter(&self) -> impl Iterator<Item = &UnitState> {
        self.player.iter().chain(&self.opponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> UnitState {
        UnitState::new(1, "Knight", Side::Player, 100, Stats::new(10, 2, Fixed::ONE))
    }

    #[test]
    fn test_new_unit_is_full_hp() {
        let u = unit();
        assert_eq!(u.hp, 100);
        assert_eq!(u.max_hp, 100);
        assert!(u.is_alive());
        assert!(u.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_mana() {
        let u = unit().with_mana(150, 100);
        assert!(matches!(u.validate(), Err(ArenaError::InvalidUnit { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_max_hp() {
        let u = UnitState::new(1, "Ghost", Side::Player, 0, Stats::default());
        assert!(u.validate().is_err());
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Player.opposite(), Side::Opponent);
        assert_eq!(Side::Opponent.opposite(), Side::Player);
    }

    #[test]
    fn test_stun_window() {
        let mut u = unit();
        u.stunned_until = Some(Fixed::from_num(2));
        assert!(u.is_stunned(Fixed::from_num(1)));
        assert!(!u.is_stunned(Fixed::from_num(2)));
    }

    #[test]
    fn test_shift_stat_rounds_integral_stats() {
        let mut u = unit();
        let (applied, new_value) = u.shift_stat(StatKind::Attack, Fixed::from_num(2.5));
        assert_eq!(applied, Fixed::from_num(3));
        assert_eq!(new_value, Fixed::from_num(13));
        assert_eq!(u.stats.attack, 13);
    }

    #[test]
    fn test_shift_max_hp_heals_and_clamps() {
        let mut u = unit();
        u.hp = 50;
        u.shift_stat(StatKind::MaxHp, Fixed::from_num(20));
        assert_eq!((u.hp, u.max_hp), (70, 120));

        let (applied, _) = u.shift_stat(StatKind::MaxHp, Fixed::from_num(-500));
        assert_eq!(u.max_hp, 1);
        assert_eq!(applied, Fixed::from_num(-119));
        assert_eq!(u.hp, 1);
    }

    #[test]
    fn test_buff_amplification_multiplies() {
        let mut u = unit();
        assert_eq!(u.buff_amplification(), Fixed::ONE);
        for (id, m) in [(1, 2), (2, 3)] {
            u.effects.push(ActiveEffect {
                effect_id: id,
                kind: ActiveEffectKind::BuffAmplifier {
                    multiplier: Fixed::from_num(m),
                },
                expires_at: None,
                source: None,
            });
        }
        assert_eq!(u.buff_amplification(), Fixed::from_num(6));
    }

    #[test]
    fn test_teams_force_sides_and_reject_duplicates() {
        let a = UnitState::new(1, "A", Side::Opponent, 10, Stats::default());
        let teams = Teams::new(vec![a.clone()], vec![a.clone()]);
        assert_eq!(teams.player[0].side, Side::Player);
        assert!(teams.validate().is_ok());
        assert_eq!(teams.keys().len(), 2);

        let dup = Teams::new(vec![a.clone(), a], Vec::new());
        assert!(matches!(dup.validate(), Err(ArenaError::InvalidUnit { .. })));
    }

    #[test]
    fn test_effect_view_tags() {
        let effect = ActiveEffect {
            effect_id: 7,
            kind: ActiveEffectKind::StatModifier {
                stat: StatKind::Defense,
                delta: Fixed::from_num(-3),
                is_debuff: true,
            },
            expires_at: Some(Fixed::from_num(4)),
            source: None,
        };
        let view = effect.view();
        assert_eq!(view.kind, "debuff");
        assert_eq!(view.stat, Some(StatKind::Defense));
        assert_eq!(view.value, Fixed::from_num(-3));
    }
}
