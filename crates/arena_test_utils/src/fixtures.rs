//! Test fixtures and helpers.
//!
//! Pre-built units, teams and templates for consistent testing.

use arena_core::components::{Position, Side, StatKind, Stats, UnitId, UnitState};
use arena_core::data::TemplateRegistry;
use arena_core::dispatcher::EventLog;
use arena_core::effects::{EffectSpec, EffectTarget, Skill, ValueType};
use arena_core::events::CombatEvent;
use arena_core::simulation::{simulate, CombatResult, SimConfig};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A plain attacker with no mana, skill or passives.
#[must_use]
pub fn unit(id: UnitId, side: Side, hp: i32, attack: i32, defense: i32, attack_speed: f64) -> UnitState {
    UnitState::new(
        id,
        format!("{}{id}", side_prefix(side)),
        side,
        hp,
        Stats::new(attack, defense, fixed_f(attack_speed)),
    )
}

fn side_prefix(side: Side) -> &'static str {
    match side {
        Side::Player => "Ally",
        Side::Opponent => "Enemy",
    }
}

/// The basic duelist: 100 HP, 10 attack, no defense, one attack per second.
#[must_use]
pub fn duelist(id: UnitId, side: Side) -> UnitState {
    unit(id, side, 100, 10, 0, 1.0)
}

/// Attacker that ends a fight against [`weak_defender`] within a few ticks.
#[must_use]
pub fn heavy_hitter(id: UnitId) -> UnitState {
    unit(id, Side::Player, 120, 80, 0, 2.0)
}

/// Defender with 10 HP, 1 attack and 1 defense.
#[must_use]
pub fn weak_defender(id: UnitId) -> UnitState {
    unit(id, Side::Opponent, 10, 1, 1, 1.0)
}

/// Mage whose skill hits every enemy and leaves a damage-over-time effect.
#[must_use]
pub fn fire_mage(id: UnitId, side: Side) -> UnitState {
    let skill = Skill::new(
        "Fire Rain",
        vec![
            EffectSpec::Damage {
                amount: 18,
                target: EffectTarget::AllEnemies,
            },
            EffectSpec::DamageOverTime {
                damage: 3,
                ticks: 3,
                interval: fixed(1),
                target: EffectTarget::RandomEnemy,
            },
        ],
    );
    let mut mage = unit(id, side, 70, 8, 0, 0.8).with_position(Position::Back).with_skill(skill);
    mage.stats.mana_on_attack = 35;
    mage.base.mana_on_attack = 35;
    mage
}

/// Front-liner that shields itself on cast and grows on every kill.
#[must_use]
pub fn guardian(id: UnitId, side: Side) -> UnitState {
    let skill = Skill::new(
        "Bulwark",
        vec![
            EffectSpec::Shield {
                amount: 30,
                duration: fixed(3),
                target: EffectTarget::Caster,
            },
            EffectSpec::Stun {
                duration: fixed_f(0.5),
                target: EffectTarget::CurrentTarget,
            },
        ],
    );
    unit(id, side, 150, 9, 3, 0.9)
        .with_mana(40, 100)
        .with_skill(skill)
        .with_passive(EffectSpec::KillBuff {
            stat: StatKind::Attack,
            value: fixed(3),
            value_type: ValueType::Flat,
        })
}

/// Back-row healer that restores the weakest ally and mourns fallen ones.
#[must_use]
pub fn cleric(id: UnitId, side: Side) -> UnitState {
    let skill = Skill::new(
        "Mend",
        vec![EffectSpec::Heal {
            amount: 25,
            target: EffectTarget::LowestHpAlly,
        }],
    );
    let mut cleric = unit(id, side, 80, 6, 1, 1.0)
        .with_position(Position::Back)
        .with_skill(skill)
        .with_passive(EffectSpec::OnAllyDeath {
            effects: vec![EffectSpec::Buff {
                stat: StatKind::Defense,
                value: fixed(2),
                value_type: ValueType::Flat,
                duration: None,
                target: EffectTarget::AllAllies,
            }],
        });
    cleric.stats.mana_regen = 15;
    cleric.base.mana_regen = 15;
    cleric
}

/// Assassin that dives the back row and schedules a delayed strike.
#[must_use]
pub fn assassin(id: UnitId, side: Side) -> UnitState {
    let skill = Skill::new(
        "Shadow Mark",
        vec![EffectSpec::Delay {
            seconds: fixed_f(0.5),
            effects: vec![EffectSpec::Damage {
                amount: 30,
                target: EffectTarget::BacklineEnemy,
            }],
        }],
    );
    let mut assassin = unit(id, side, 75, 12, 0, 1.2)
        .with_skill(skill)
        .with_passive(EffectSpec::TargetBackline { duration: None });
    assassin.stats.mana_on_attack = 25;
    assassin.base.mana_on_attack = 25;
    assassin
}

/// A four-unit team using skills, passives and triggers.
#[must_use]
pub fn mixed_team(side: Side) -> Vec<UnitState> {
    vec![guardian(1, side), assassin(2, side), fire_mage(3, side), cleric(4, side)]
}

/// `n` duelists on one side.
#[must_use]
pub fn duelists(side: Side, n: u32) -> Vec<UnitState> {
    (1..=n).map(|id| duelist(id, side)).collect()
}

/// Templates covering the effect kinds exercised by the CLI scenarios.
pub const SAMPLE_TEMPLATES: &str = r#"[
    UnitTemplate(
        id: "squire",
        name: "Squire",
        max_hp: 110,
        attack: 10,
        defense: 2,
        attack_speed: 1.0,
        mana_on_attack: 20,
        skill: Some(Skill(
            name: "Shield Wall",
            effects: [shield(amount: 25, duration: 3.0)],
        )),
        tags: ["tank"],
    ),
    UnitTemplate(
        id: "ember_mage",
        name: "Ember Mage",
        max_hp: 70,
        attack: 8,
        attack_speed: 0.8,
        mana_on_attack: 30,
        position: back,
        skill: Some(Skill(
            name: "Fire Rain",
            effects: [
                damage(amount: 18, target: all_enemies),
                damage_over_time(damage: 3, ticks: 3, interval: 1.0, target: random_enemy),
            ],
        )),
        passives: [kill_buff(stat: attack, value: 2.0)],
        tags: ["mage"],
    ),
    UnitTemplate(
        id: "war_drummer",
        name: "War Drummer",
        max_hp: 90,
        attack: 7,
        attack_speed: 1.0,
        mana_regen: 10,
        position: back,
        skill: Some(Skill(
            name: "Battle Hymn",
            effects: [buff(stat: attack_speed, value: 20.0, value_type: percentage, duration: Some(4.0), target: all_allies)],
        )),
        passives: [buff_amplifier(multiplier: 1.5)],
    ),
    UnitTemplate(
        id: "stalker",
        name: "Stalker",
        max_hp: 80,
        attack: 12,
        attack_speed: 1.2,
        mana_on_attack: 25,
        skill: Some(Skill(
            name: "Ambush",
            effects: [delay(seconds: 0.5, effects: [damage(amount: 30, target: backline_enemy)])],
        )),
        passives: [target_backline(duration: None)],
    ),
]"#;

/// Parse [`SAMPLE_TEMPLATES`].
///
/// # Panics
///
/// Panics if the sample data no longer parses.
#[must_use]
pub fn sample_registry() -> TemplateRegistry {
    TemplateRegistry::from_ron_str(SAMPLE_TEMPLATES, "sample templates").expect("sample templates parse")
}

/// Run a fight into an [`EventLog`] and return the result with every event.
///
/// # Panics
///
/// Panics if the run fails.
#[must_use]
pub fn run_recorded(config: &SimConfig, team_a: Vec<UnitState>, team_b: Vec<UnitState>) -> (CombatResult, Vec<CombatEvent>) {
    let (result, log) = simulate(team_a, team_b, EventLog::new(), config).expect("simulation runs");
    (result, log.into_events())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_units_validate() {
        for unit in mixed_team(Side::Player).iter().chain(&duelists(Side::Opponent, 3)) {
            unit.validate().unwrap();
        }
        heavy_hitter(1).validate().unwrap();
        weak_defender(1).validate().unwrap();
    }

    #[test]
    fn test_sample_registry_parses() {
        let registry = sample_registry();
        assert_eq!(registry.len(), 4);
        assert!(registry.get("squire").unwrap().has_tag("tank"));
    }

    #[test]
    fn test_run_recorded_collects_events() {
        let (result, events) = run_recorded(
            &SimConfig::default().with_seed(3),
            vec![heavy_hitter(1)],
            vec![weak_defender(1)],
        );
        assert_eq!(result.team_b_survivors, 0);
        assert!(events.len() > 3);
    }
}
