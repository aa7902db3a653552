//! Effect and skill definitions.
//!
//! Skills, passives and triggers are described with [`EffectSpec`], a closed
//! set of effect kinds. Unknown kinds are rejected when the data is parsed,
//! and [`EffectSpec::validate`] rejects malformed values before any
//! simulation starts.

use serde::{Deserialize, Serialize};

use crate::components::StatKind;
use crate::error::{ArenaError, Result};
use crate::math::{fixed_float, option_fixed_float, Fixed};

/// Longest duration, delay or tick interval an effect may declare, in
/// seconds.
pub const MAX_EFFECT_SECONDS: Fixed = Fixed::const_from_int(3600);

/// How a stat effect's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Added as-is.
    #[default]
    Flat,
    /// Percent of the stat's current value.
    Percentage,
}

impl ValueType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueType::Flat => "flat",
            ValueType::Percentage => "percentage",
        }
    }
}

/// Damage classification carried by damage events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    /// Basic attacks; reduced by defense.
    #[default]
    Physical,
    /// Skill damage; ignores defense.
    Magic,
    /// Damage over time; ignores defense.
    True,
}

/// Who an effect lands on, relative to the caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    /// The caster itself.
    #[serde(rename = "self")]
    Caster,
    /// The caster's current attack target.
    #[default]
    CurrentTarget,
    /// Every alive ally, caster included.
    AllAllies,
    /// Every alive enemy.
    AllEnemies,
    /// The alive ally with the lowest HP (first in team order on ties).
    LowestHpAlly,
    /// One alive enemy chosen with the run's random source.
    RandomEnemy,
    /// First alive back-row enemy, else the first alive enemy.
    BacklineEnemy,
}

impl EffectTarget {
    /// Serde default for self-targeted effects.
    #[must_use]
    pub const fn caster() -> Self {
        EffectTarget::Caster
    }

    /// Serde default for enemy-targeted effects.
    #[must_use]
    pub const fn current_target() -> Self {
        EffectTarget::CurrentTarget
    }
}

/// One effect of a skill, passive or trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSpec {
    /// Direct magic damage.
    Damage {
        /// Damage dealt.
        amount: i32,
        /// Recipients.
        #[serde(default = "EffectTarget::current_target")]
        target: EffectTarget,
    },
    /// Restore HP, clamped at max HP.
    Heal {
        /// HP restored.
        amount: i32,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Add a timed shield layer.
    Shield {
        /// Shield points.
        amount: i32,
        /// Seconds until the layer expires.
        #[serde(with = "fixed_float")]
        duration: Fixed,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Raise a stat.
    Buff {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        #[serde(default)]
        value_type: ValueType,
        /// Seconds until reverted; permanent for the fight when absent.
        #[serde(default, with = "option_fixed_float")]
        duration: Option<Fixed>,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Lower a stat. Never amplified.
    Debuff {
        /// Debuffed stat.
        stat: StatKind,
        /// Nominal value (positive; subtracted).
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        #[serde(default)]
        value_type: ValueType,
        /// Seconds until reverted; permanent for the fight when absent.
        #[serde(default, with = "option_fixed_float")]
        duration: Option<Fixed>,
        /// Recipients.
        #[serde(default = "EffectTarget::current_target")]
        target: EffectTarget,
    },
    /// Grant a permanent stat buff every second while active.
    PerSecondBuff {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value per second.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        #[serde(default)]
        value_type: ValueType,
        /// Seconds the effect stays active; whole fight when absent.
        #[serde(default, with = "option_fixed_float")]
        duration: Option<Fixed>,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Periodic true damage.
    DamageOverTime {
        /// Damage per tick.
        damage: i32,
        /// Number of ticks.
        ticks: u32,
        /// Seconds between ticks; the first tick lands one interval after
        /// application.
        #[serde(with = "fixed_float")]
        interval: Fixed,
        /// Recipients.
        #[serde(default = "EffectTarget::current_target")]
        target: EffectTarget,
    },
    /// Prevent acting for a while.
    Stun {
        /// Stun length in seconds.
        #[serde(with = "fixed_float")]
        duration: Fixed,
        /// Recipients.
        #[serde(default = "EffectTarget::current_target")]
        target: EffectTarget,
    },
    /// Resolve nested effects later.
    Delay {
        /// Seconds to wait.
        #[serde(with = "fixed_float")]
        seconds: Fixed,
        /// Effects resolved after the delay.
        effects: Vec<EffectSpec>,
    },
    /// Caster's attacks prefer back-row targets.
    TargetBackline {
        /// Seconds active; whole fight when absent.
        #[serde(default, with = "option_fixed_float")]
        duration: Option<Fixed>,
    },
    /// Multiply positive stat buffs received by the recipients.
    BuffAmplifier {
        /// Multiplier.
        #[serde(with = "fixed_float")]
        multiplier: Fixed,
        /// Seconds active; whole fight when absent.
        #[serde(default, with = "option_fixed_float")]
        duration: Option<Fixed>,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Add mana, clamped at max mana.
    ManaGain {
        /// Mana added.
        amount: i32,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
    /// Register a trigger on the caster: resolve effects when an enemy dies.
    OnEnemyDeath {
        /// Effects resolved with the caster as caster.
        effects: Vec<EffectSpec>,
    },
    /// Register a trigger on the caster: resolve effects when an ally dies.
    OnAllyDeath {
        /// Effects resolved with the caster as caster.
        effects: Vec<EffectSpec>,
    },
    /// Register a trigger on the caster: buff itself on every kill.
    KillBuff {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value per kill.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        #[serde(default)]
        value_type: ValueType,
    },
    /// Buff scaled by the number of dead enemies at resolution time.
    DynamicScaling {
        /// Buffed stat.
        stat: StatKind,
        /// Nominal value per dead enemy.
        #[serde(with = "fixed_float")]
        value: Fixed,
        /// Flat or percentage.
        #[serde(default)]
        value_type: ValueType,
        /// Recipients.
        #[serde(default = "EffectTarget::caster")]
        target: EffectTarget,
    },
}

/// Where an effect is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectContext {
    /// Passive applied at combat start.
    Passive,
    /// Part of a skill cast.
    Skill,
    /// Resolved by a death trigger.
    Trigger,
    /// Resolved after a `delay`.
    Delayed,
}

/// Result of resolving one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The effect landed on this many units.
    Applied {
        /// Number of recipients affected.
        recipients: usize,
    },
    /// No alive recipient was available.
    NoTarget,
    /// The effect cannot be used in this context.
    Unsupported {
        /// Why the effect was skipped.
        reason: &'static str,
    },
}

impl EffectSpec {
    /// Wire name of the effect kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            EffectSpec::Damage { .. } => "damage",
            EffectSpec::Heal { .. } => "heal",
            EffectSpec::Shield { .. } => "shield",
            EffectSpec::Buff { .. } => "buff",
            EffectSpec::Debuff { .. } => "debuff",
            EffectSpec::PerSecondBuff { .. } => "per_second_buff",
            EffectSpec::DamageOverTime { .. } => "damage_over_time",
            EffectSpec::Stun { .. } => "stun",
            EffectSpec::Delay { .. } => "delay",
            EffectSpec::TargetBackline { .. } => "target_backline",
            EffectSpec::BuffAmplifier { .. } => "buff_amplifier",
            EffectSpec::ManaGain { .. } => "mana_gain",
            EffectSpec::OnEnemyDeath { .. } => "on_enemy_death",
            EffectSpec::OnAllyDeath { .. } => "on_ally_death",
            EffectSpec::KillBuff { .. } => "kill_buff",
            EffectSpec::DynamicScaling { .. } => "dynamic_scaling",
        }
    }

    /// Recipient selector, for effects that land on other units.
    ///
    /// `delay`, `target_backline` and trigger registrations always act on
    /// the caster and return `None`.
    #[must_use]
    pub const fn target(&self) -> Option<EffectTarget> {
        match self {
            EffectSpec::Damage { target, .. }
            | EffectSpec::Heal { target, .. }
            | EffectSpec::Shield { target, .. }
            | EffectSpec::Buff { target, .. }
            | EffectSpec::Debuff { target, .. }
            | EffectSpec::PerSecondBuff { target, .. }
            | EffectSpec::DamageOverTime { target, .. }
            | EffectSpec::Stun { target, .. }
            | EffectSpec::BuffAmplifier { target, .. }
            | EffectSpec::ManaGain { target, .. }
            | EffectSpec::DynamicScaling { target, .. } => Some(*target),
            EffectSpec::Delay { .. }
            | EffectSpec::TargetBackline { .. }
            | EffectSpec::OnEnemyDeath { .. }
            | EffectSpec::OnAllyDeath { .. }
            | EffectSpec::KillBuff { .. } => None,
        }
    }

    /// Whether resolving this effect registers a death trigger.
    #[must_use]
    pub const fn registers_trigger(&self) -> bool {
        matches!(
            self,
            EffectSpec::OnEnemyDeath { .. }
                | EffectSpec::OnAllyDeath { .. }
                | EffectSpec::KillBuff { .. }
        )
    }

    /// Check that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidEffect`] naming `context` and the problem.
    pub fn validate(&self, context: &str) -> Result<()> {
        let fail = |reason: String| {
            Err(ArenaError::InvalidEffect {
                context: context.to_string(),
                reason: format!("{}: {reason}", self.kind_name()),
            })
        };
        let in_range = |d: Fixed| d > Fixed::ZERO && d <= MAX_EFFECT_SECONDS;
        let positive_duration = |d: Option<Fixed>| d.map_or(true, in_range);

        match self {
            EffectSpec::Damage { amount, .. }
            | EffectSpec::Heal { amount, .. }
            | EffectSpec::ManaGain { amount, .. } => {
                if *amount <= 0 {
                    return fail(format!("amount must be positive, got {amount}"));
                }
            }
            EffectSpec::Shield {
                amount, duration, ..
            } => {
                if *amount <= 0 || !in_range(*duration) {
                    return fail(format!("amount and duration must be positive, duration at most {MAX_EFFECT_SECONDS}"));
                }
            }
            EffectSpec::Buff {
                value, duration, ..
            }
            | EffectSpec::Debuff {
                value, duration, ..
            }
            | EffectSpec::PerSecondBuff {
                value, duration, ..
            } => {
                if *value <= Fixed::ZERO {
                    return fail(format!("value must be positive, got {value}"));
                }
                if !positive_duration(*duration) {
                    return fail(format!("duration must be in (0, {MAX_EFFECT_SECONDS}]"));
                }
            }
            EffectSpec::KillBuff { value, .. } | EffectSpec::DynamicScaling { value, .. } => {
                if *value <= Fixed::ZERO {
                    return fail(format!("value must be positive, got {value}"));
                }
            }
            EffectSpec::DamageOverTime {
                damage,
                ticks,
                interval,
                ..
            } => {
                if *damage <= 0 || *ticks == 0 || !in_range(*interval) {
                    return fail(format!("damage, ticks and interval must be positive, interval at most {MAX_EFFECT_SECONDS}"));
                }
            }
            EffectSpec::Stun { duration, .. } => {
                if !in_range(*duration) {
                    return fail(format!("duration must be in (0, {MAX_EFFECT_SECONDS}]"));
                }
            }
            EffectSpec::TargetBackline { duration } => {
                if !positive_duration(*duration) {
                    return fail(format!("duration must be in (0, {MAX_EFFECT_SECONDS}]"));
                }
            }
            EffectSpec::BuffAmplifier {
                multiplier,
                duration,
                ..
            } => {
                if *multiplier <= Fixed::ZERO || !positive_duration(*duration) {
                    return fail(format!("multiplier must be positive, duration in (0, {MAX_EFFECT_SECONDS}]"));
                }
            }
            EffectSpec::Delay { seconds, effects } => {
                if !in_range(*seconds) {
                    return fail(format!("delay must be in (0, {MAX_EFFECT_SECONDS}]"));
                }
                if effects.is_empty() {
                    return fail("no nested effects".to_string());
                }
                for nested in effects {
                    nested.validate(context)?;
                }
            }
            EffectSpec::OnEnemyDeath { effects } | EffectSpec::OnAllyDeath { effects } => {
                if effects.is_empty() {
                    return fail("no nested effects".to_string());
                }
                for nested in effects {
                    if nested.registers_trigger() {
                        return fail("triggers cannot register further triggers".to_string());
                    }
                    nested.validate(context)?;
                }
            }
        }
        Ok(())
    }
}

/// Active ability cast when the unit's mana is full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Display name.
    pub name: String,
    /// Effects resolved in order.
    pub effects: Vec<EffectSpec>,
}

impl Skill {
    /// Create a skill.
    #[must_use]
    pub fn new(name: impl Into<String>, effects: Vec<EffectSpec>) -> Self {
        Self {
            name: name.into(),
            effects,
        }
    }

    /// Validate the skill and all of its effects.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidEffect`] for an empty or malformed skill.
    pub fn validate(&self) -> Result<()> {
        if self.effects.is_empty() {
            return Err(ArenaError::InvalidEffect {
                context: self.name.clone(),
                reason: "skill has no effects".to_string(),
            });
        }
        for effect in &self.effects {
            effect.validate(&self.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ron_skill() {
        let src = r#"Skill(
            name: "Firestorm",
            effects: [
                damage(amount: 30, target: all_enemies),
                damage_over_time(damage: 4, ticks: 3, interval: 1.0),
                delay(seconds: 0.5, effects: [stun(duration: 1.5)]),
            ],
        )"#;
        let skill: Skill = ron::from_str(src).expect("skill should parse");
        assert_eq!(skill.effects.len(), 3);
        assert!(matches!(
            skill.effects[0],
            EffectSpec::Damage {
                amount: 30,
                target: EffectTarget::AllEnemies
            }
        ));
        assert!(skill.validate().is_ok());
    }

    #[test]
    fn test_unknown_effect_kind_fails_to_parse() {
        let src = r#"Skill(name: "Oops", effects: [teleport(distance: 3)])"#;
        assert!(ron::from_str::<Skill>(src).is_err());
    }

    #[test]
    fn test_self_target_spelling() {
        let src = r#"heal(amount: 5, target: self)"#;
        let effect: EffectSpec = ron::from_str(src).expect("heal should parse");
        assert_eq!(
            effect,
            EffectSpec::Heal {
                amount: 5,
                target: EffectTarget::Caster
            }
        );
    }

    #[test]
    fn test_validate_rejects_zero_ticks() {
        let effect = EffectSpec::DamageOverTime {
            damage: 5,
            ticks: 0,
            interval: Fixed::ONE,
            target: EffectTarget::CurrentTarget,
        };
        assert!(matches!(
            effect.validate("test"),
            Err(ArenaError::InvalidEffect { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nested_triggers() {
        let effect = EffectSpec::OnEnemyDeath {
            effects: vec![EffectSpec::OnAllyDeath {
                effects: vec![EffectSpec::Heal {
                    amount: 1,
                    target: EffectTarget::Caster,
                }],
            }],
        };
        assert!(effect.validate("test").is_err());
    }

    #[test]
    fn test_validate_bounds_durations() {
        let stun = |seconds: f64| EffectSpec::Stun {
            duration: Fixed::from_num(seconds),
            target: EffectTarget::CurrentTarget,
        };
        assert!(stun(3600.0).validate("test").is_ok());
        assert!(stun(3600.5).validate("test").is_err());

        let delay = EffectSpec::Delay {
            seconds: Fixed::MAX,
            effects: vec![EffectSpec::Heal {
                amount: i32::MAX,
                target: EffectTarget::Caster,
            }],
        };
        assert!(delay.validate("test").is_err());
    }

    #[test]
    fn test_empty_skill_is_invalid() {
        assert!(Skill::new("Nothing", vec![]).validate().is_err());
    }
}
