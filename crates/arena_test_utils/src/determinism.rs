//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a combat run produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays and reconstruction only work if a run is 100% reproducible.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`arena_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Units are always visited in team order.
//!
//! - **System randomness**: Every random draw comes from the run's seeded
//!   ChaCha source.
//!
//! # Test Levels
//!
//! 1. **Repeat runs**: the same config and teams produce the same stream
//! 2. **Property tests**: random teams and seeds still produce identical streams
//! 3. **Parallel runs**: N runs on separate threads all match
//! 4. **Divergence search**: find the first tick or event where two runs differ

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use arena_core::components::UnitState;
use arena_core::dispatcher::EventLog;
use arena_core::error::Result;
use arena_core::events::CombatEvent;
use arena_core::simulation::{CombatResult, CombatSimulator, SimConfig};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Combat is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Everything one finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The simulator's result.
    pub result: CombatResult,
    /// Delivered events in seq order.
    pub events: Vec<CombatEvent>,
    /// The same events as NDJSON lines.
    pub lines: Vec<String>,
    /// Final authoritative unit state.
    pub final_teams: (Vec<UnitState>, Vec<UnitState>),
    /// Ticks simulated.
    pub ticks: u64,
}

impl RunOutput {
    /// Hash of the NDJSON stream, combined with the final state hash.
    #[must_use]
    pub fn stream_hash(&self) -> u64 {
        compute_hash(&(&self.lines, self.result.final_hash))
    }
}

/// Run a fight to completion, keeping every event.
///
/// # Errors
///
/// Returns an error if the inputs are invalid or an event cannot be encoded.
pub fn run_combat(config: &SimConfig, team_a: Vec<UnitState>, team_b: Vec<UnitState>) -> Result<RunOutput> {
    let mut sim = CombatSimulator::new(config.clone(), team_a, team_b, EventLog::new())?;
    let result = sim.run()?;
    let ticks = sim.tick();
    let final_teams = (sim.teams().player.clone(), sim.teams().opponent.clone());
    let log = sim.into_sink();
    let lines = log.to_ndjson_lines()?;
    Ok(RunOutput {
        result,
        events: log.into_events(),
        lines,
        final_teams,
        ticks,
    })
}

/// Run the same fight `runs` times and compare the event streams.
///
/// # Panics
///
/// Panics if a run fails.
///
/// # Example
///
/// ```ignore
/// use arena_test_utils::determinism::verify_combat_determinism;
/// use arena_test_utils::fixtures::mixed_team;
///
/// let result = verify_combat_determinism(&SimConfig::default().with_seed(9), || {
///     (mixed_team(Side::Player), mixed_team(Side::Opponent))
/// }, 3);
/// result.assert_deterministic();
/// ```
pub fn verify_combat_determinism<F>(config: &SimConfig, teams: F, runs: usize) -> DeterminismResult
where
    F: Fn() -> (Vec<UnitState>, Vec<UnitState>),
{
    let mut hashes = Vec::with_capacity(runs);
    let mut ticks = 0;
    for _ in 0..runs {
        let (team_a, team_b) = teams();
        let output = run_combat(config, team_a, team_b).expect("combat runs");
        ticks = output.ticks;
        hashes.push(output.stream_hash());
    }
    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// Result of parallel runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Stream hash from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks each run took.
    pub ticks: Vec<u64>,
    /// Number of runs.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all runs produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel runs diverged!\n\
                 Runs: {}\n\
                 Ticks: {:?}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run the same fight on `num_sims` scoped threads and collect stream hashes.
///
/// Each thread owns its own teams, dispatcher and random source.
///
/// # Panics
///
/// Panics if a run fails or a thread panics.
pub fn run_parallel_combats<F>(config: &SimConfig, teams: F, num_sims: usize) -> ParallelSimResult
where
    F: Fn() -> (Vec<UnitState>, Vec<UnitState>) + Sync,
{
    let outputs: Vec<(u64, u64)> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let (team_a, team_b) = teams();
                    let output = run_combat(config, team_a, team_b).expect("combat runs");
                    (output.stream_hash(), output.ticks)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes: outputs.iter().map(|(hash, _)| *hash).collect(),
        ticks: outputs.iter().map(|(_, ticks)| *ticks).collect(),
        num_sims,
    }
}

/// Step two runs side by side, finding the first tick whose state differs.
///
/// Tick 0 is the state after `start`. Returns `None` if both runs stay
/// identical until they finish or `max_ticks` is reached.
///
/// # Panics
///
/// Panics if a run fails.
pub fn find_first_divergence<F>(setup_fn: F, max_ticks: u64) -> Option<u64>
where
    F: Fn() -> CombatSimulator<EventLog>,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();
    sim1.start().expect("combat starts");
    sim2.start().expect("combat starts");

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=max_ticks {
        let done1 = sim1.step().expect("combat steps").is_some();
        let done2 = sim2.step().expect("combat steps").is_some();

        if sim1.state_hash() != sim2.state_hash() || done1 != done2 {
            return Some(tick);
        }
        if done1 {
            break;
        }
    }

    None
}

/// Index of the first event that differs between two streams.
///
/// Events are compared field by field, so a matching seq with a different
/// payload is reported. A shorter stream diverges at its end.
#[must_use]
pub fn first_event_divergence(expected: &[CombatEvent], actual: &[CombatEvent]) -> Option<usize> {
    let common = expected.len().min(actual.len());
    (0..common)
        .find(|&i| expected[i] != actual[i])
        .or_else(|| (expected.len() != actual.len()).then_some(common))
}

/// Hash any hashable value with the std hasher.
fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible teams for
/// property-based testing of the simulator and the reconstructor.
pub mod strategies {
    use arena_core::components::{Position, Side, StatKind, Stats, UnitId, UnitState};
    use arena_core::effects::{EffectSpec, EffectTarget, Skill, ValueType};
    use arena_core::math::Fixed;
    use proptest::prelude::*;

    /// Attack speed between 0.5 and 2.0 attacks per second, in 0.1 steps.
    pub fn arb_attack_speed() -> impl Strategy<Value = Fixed> {
        (5i32..=20).prop_map(|tenths| Fixed::from_num(tenths) / Fixed::from_num(10))
    }

    /// Seed for the run's random source.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Who an effect lands on.
    pub fn arb_target() -> impl Strategy<Value = EffectTarget> {
        prop_oneof![
            Just(EffectTarget::Caster),
            Just(EffectTarget::CurrentTarget),
            Just(EffectTarget::AllAllies),
            Just(EffectTarget::AllEnemies),
            Just(EffectTarget::LowestHpAlly),
            Just(EffectTarget::RandomEnemy),
            Just(EffectTarget::BacklineEnemy),
        ]
    }

    /// A stat buffs may touch.
    pub fn arb_stat() -> impl Strategy<Value = StatKind> {
        prop_oneof![
            Just(StatKind::Attack),
            Just(StatKind::Defense),
            Just(StatKind::AttackSpeed),
            Just(StatKind::MaxHp),
            Just(StatKind::ManaRegen),
        ]
    }

    fn arb_value_type() -> impl Strategy<Value = ValueType> {
        prop_oneof![Just(ValueType::Flat), Just(ValueType::Percentage)]
    }

    fn arb_duration() -> impl Strategy<Value = Option<Fixed>> {
        proptest::option::of((1i32..=4).prop_map(Fixed::from_num))
    }

    /// An effect that resolves immediately (no nesting).
    pub fn arb_simple_effect() -> impl Strategy<Value = EffectSpec> {
        prop_oneof![
            (5i32..40, arb_target()).prop_map(|(amount, target)| EffectSpec::Damage { amount, target }),
            (5i32..40, arb_target()).prop_map(|(amount, target)| EffectSpec::Heal { amount, target }),
            (5i32..40, 1i32..4, arb_target()).prop_map(|(amount, secs, target)| EffectSpec::Shield {
                amount,
                duration: Fixed::from_num(secs),
                target,
            }),
            (arb_stat(), 1i32..20, arb_value_type(), arb_duration(), arb_target()).prop_map(
                |(stat, value, value_type, duration, target)| EffectSpec::Buff {
                    stat,
                    value: Fixed::from_num(value),
                    value_type,
                    duration,
                    target,
                }
            ),
            (arb_stat(), 1i32..10, arb_value_type(), arb_duration(), arb_target()).prop_map(
                |(stat, value, value_type, duration, target)| EffectSpec::Debuff {
                    stat,
                    value: Fixed::from_num(value),
                    value_type,
                    duration,
                    target,
                }
            ),
            (1i32..8, 1u32..4, arb_target()).prop_map(|(damage, ticks, target)| EffectSpec::DamageOverTime {
                damage,
                ticks,
                interval: Fixed::ONE,
                target,
            }),
            (1i32..3, arb_target()).prop_map(|(halves, target)| EffectSpec::Stun {
                duration: Fixed::from_num(halves) / Fixed::from_num(2),
                target,
            }),
            (5i32..50, arb_target()).prop_map(|(amount, target)| EffectSpec::ManaGain { amount, target }),
            (arb_stat(), 1i32..5).prop_map(|(stat, value)| EffectSpec::DynamicScaling {
                stat,
                value: Fixed::from_num(value),
                value_type: ValueType::Flat,
                target: EffectTarget::Caster,
            }),
        ]
    }

    /// Valid effects at the edge of the numeric range: `i32::MAX` amounts
    /// and percentage buffs that compound every second.
    pub fn arb_extreme_effect() -> impl Strategy<Value = EffectSpec> {
        prop_oneof![
            arb_target().prop_map(|target| EffectSpec::Damage {
                amount: i32::MAX,
                target,
            }),
            arb_target().prop_map(|target| EffectSpec::Heal {
                amount: i32::MAX,
                target,
            }),
            arb_target().prop_map(|target| EffectSpec::Shield {
                amount: i32::MAX,
                duration: Fixed::from_num(3),
                target,
            }),
            (arb_stat(), 100i32..=300).prop_map(|(stat, percent)| EffectSpec::PerSecondBuff {
                stat,
                value: Fixed::from_num(percent),
                value_type: ValueType::Percentage,
                duration: None,
                target: EffectTarget::Caster,
            }),
        ]
    }

    /// Any effect, including delays and triggers wrapping simple effects.
    pub fn arb_effect() -> impl Strategy<Value = EffectSpec> {
        prop_oneof![
            6 => arb_simple_effect(),
            1 => arb_extreme_effect(),
            1 => (1i32..=5, proptest::collection::vec(arb_simple_effect(), 1..3)).prop_map(|(tenths, effects)| {
                EffectSpec::Delay {
                    seconds: Fixed::from_num(tenths) / Fixed::from_num(10),
                    effects,
                }
            }),
            1 => Just(EffectSpec::TargetBackline { duration: None }),
            1 => (2i32..=4).prop_map(|halves| EffectSpec::BuffAmplifier {
                multiplier: Fixed::from_num(halves) / Fixed::from_num(2),
                duration: None,
                target: EffectTarget::Caster,
            }),
            1 => proptest::collection::vec(arb_simple_effect(), 1..3)
                .prop_map(|effects| EffectSpec::OnEnemyDeath { effects }),
            1 => proptest::collection::vec(arb_simple_effect(), 1..3)
                .prop_map(|effects| EffectSpec::OnAllyDeath { effects }),
            1 => (arb_stat(), 1i32..5).prop_map(|(stat, value)| EffectSpec::KillBuff {
                stat,
                value: Fixed::from_num(value),
                value_type: ValueType::Flat,
            }),
        ]
    }

    /// A skill with one to three effects.
    pub fn arb_skill() -> impl Strategy<Value = Skill> {
        proptest::collection::vec(arb_effect(), 1..4).prop_map(|effects| Skill::new("Arcane", effects))
    }

    /// One unit with random stats, mana, skill and passives.
    pub fn arb_unit(side: Side, id: UnitId) -> impl Strategy<Value = UnitState> {
        (
            (40i32..200, 1i32..30, 0i32..8, arb_attack_speed()),
            (0i32..40, 0i32..20, 0i32..100),
            any::<bool>(),
            proptest::option::of(arb_skill()),
            proptest::collection::vec(arb_effect(), 0..3),
        )
            .prop_map(
                move |((hp, attack, defense, speed), (on_attack, regen, mana), back, skill, passives)| {
                    let stats = Stats::new(attack, defense, speed).with_mana_gain(on_attack, regen);
                    let mut unit = UnitState::new(id, format!("{}{id}", side.as_str()), side, hp, stats)
                        .with_mana(mana, 100)
                        .with_position(if back { Position::Back } else { Position::Front });
                    unit.skill = skill;
                    unit.passives = passives;
                    unit
                },
            )
    }

    /// A team of one to `max_units` units with ids `1..`.
    pub fn arb_team(side: Side, max_units: u32) -> impl Strategy<Value = Vec<UnitState>> {
        (1..=max_units).prop_flat_map(move |n| (1..=n).map(|id| arb_unit(side, id)).collect::<Vec<_>>())
    }

    /// Two random teams.
    pub fn arb_matchup(max_units: u32) -> impl Strategy<Value = (Vec<UnitState>, Vec<UnitState>)> {
        (arb_team(Side::Player, max_units), arb_team(Side::Opponent, max_units))
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::arb_matchup;
    use super::*;
    use crate::fixtures::{duelists, mixed_team};
    use arena_core::components::Side;
    use proptest::prelude::*;

    fn config(seed: u64) -> SimConfig {
        SimConfig::default().with_seed(seed)
    }

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_duel_determinism() {
        let result = verify_combat_determinism(&config(1), || (duelists(Side::Player, 1), duelists(Side::Opponent, 1)), 3);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_mixed_team_determinism() {
        let result = verify_combat_determinism(&config(42), || (mixed_team(Side::Player), mixed_team(Side::Opponent)), 2);
        result.assert_deterministic();
    }

    #[test]
    fn test_steps_never_diverge() {
        let divergence = find_first_divergence(
            || {
                CombatSimulator::new(config(5), mixed_team(Side::Player), mixed_team(Side::Opponent), EventLog::new())
                    .unwrap()
            },
            400,
        );
        assert!(divergence.is_none(), "Expected no divergence");
    }

    #[test]
    fn test_different_seeds_are_detected() {
        let a = run_combat(&config(1), mixed_team(Side::Player), mixed_team(Side::Opponent)).unwrap();
        let b = run_combat(&config(2), mixed_team(Side::Player), mixed_team(Side::Opponent)).unwrap();
        // Run ids differ, so the first snapshot's event id already differs.
        assert_eq!(first_event_divergence(&a.events, &b.events), Some(0));
        assert_eq!(first_event_divergence(&a.events, &a.events), None);
    }

    #[test]
    fn test_truncated_stream_diverges_at_end() {
        let a = run_combat(&config(1), duelists(Side::Player, 1), duelists(Side::Opponent, 1)).unwrap();
        let cut = a.events.len() - 1;
        assert_eq!(first_event_divergence(&a.events, &a.events[..cut]), Some(cut));
    }

    // =========================================================================
    // Parallel tests
    // =========================================================================

    #[test]
    fn test_parallel_mixed_combats() {
        let result = run_parallel_combats(&config(77), || (mixed_team(Side::Player), mixed_team(Side::Opponent)), 4);
        result.assert_deterministic();
        assert_eq!(result.num_sims, 4);
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Random teams with random skills replay identically.
        #[test]
        fn prop_random_teams_are_deterministic(
            (team_a, team_b) in arb_matchup(3),
            seed in any::<u64>(),
        ) {
            let cfg = config(seed).with_timeout(arena_core::math::Fixed::from_num(15));
            let first = run_combat(&cfg, team_a.clone(), team_b.clone()).unwrap();
            let second = run_combat(&cfg, team_a, team_b).unwrap();
            prop_assert_eq!(first_event_divergence(&first.events, &second.events), None);
            prop_assert_eq!(first.result, second.result);
        }
    }
}
