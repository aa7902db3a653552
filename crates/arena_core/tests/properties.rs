//! Property tests over random seeds and random team compositions.
//!
//! These are the regression contract for simulator/reconstructor desyncs:
//! every random fight must replay identically, keep seq strictly
//! increasing, keep HP in bounds and reconstruct to the simulator's own
//! final state.

use arena_core::components::Teams;
use arena_core::events::{AnimationKind, CombatEvent, DamageCause, EventPayload};
use arena_core::math::Fixed;
use arena_core::reconstruct::{Reconstructor, SnapshotPolicy};
use arena_core::simulation::SimConfig;
use arena_core::snapshot::CombatSnapshot;
use arena_test_utils::determinism::strategies::{arb_matchup, arb_seed};
use arena_test_utils::determinism::{first_event_divergence, run_combat};
use proptest::prelude::*;

fn config(seed: u64) -> SimConfig {
    SimConfig::default().with_seed(seed).with_timeout(Fixed::from_num(20))
}

/// Check every HP value an event states against the max HP it states.
fn hp_in_bounds(event: &CombatEvent) -> Result<(), String> {
    let check = |hp: i32, max_hp: i32| {
        if hp < 0 || hp > max_hp {
            Err(format!("{} at seq {:?}: hp {hp} outside 0..={max_hp}", event.event_type(), event.seq))
        } else {
            Ok(())
        }
    };
    match &event.payload {
        EventPayload::UnitAttack(p) | EventPayload::DamageOverTimeTick(p) => {
            check(p.pre_hp, p.max_hp)?;
            check(p.post_hp, p.max_hp)
        }
        EventPayload::UnitHeal(p) => check(p.post_hp, p.max_hp),
        EventPayload::StateSnapshot(_) => {
            let Some(snapshot) = CombatSnapshot::from_event(event) else {
                return Ok(());
            };
            for unit in snapshot.player_units.iter().chain(&snapshot.opponent_units) {
                check(unit.hp, unit.max_hp)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_same_seed_same_stream((team_a, team_b) in arb_matchup(3), seed in arb_seed()) {
        let cfg = config(seed);
        let first = run_combat(&cfg, team_a.clone(), team_b.clone()).unwrap();
        let second = run_combat(&cfg, team_a, team_b).unwrap();

        prop_assert_eq!(first_event_divergence(&first.events, &second.events), None);
        prop_assert_eq!(&first.lines, &second.lines);
        prop_assert_eq!(&first.final_teams, &second.final_teams);
    }

    #[test]
    fn prop_seq_strictly_increasing((team_a, team_b) in arb_matchup(4), seed in arb_seed()) {
        let output = run_combat(&config(seed), team_a, team_b).unwrap();
        let seqs: Vec<u64> = output.events.iter().map(|e| e.seq.unwrap()).collect();
        prop_assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1), "seqs: {:?}", seqs);
        prop_assert_eq!(seqs.first().copied(), Some(1));

        let mut ids: Vec<&str> = output.events.iter().map(|e| e.event_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), output.events.len());
    }

    #[test]
    fn prop_hp_stays_in_bounds((team_a, team_b) in arb_matchup(4), seed in arb_seed()) {
        let output = run_combat(&config(seed), team_a, team_b).unwrap();
        for event in &output.events {
            if let Err(message) = hp_in_bounds(event) {
                prop_assert!(false, "{}", message);
            }
        }
        for unit in output.final_teams.0.iter().chain(&output.final_teams.1) {
            prop_assert!(unit.hp >= 0 && unit.hp <= unit.max_hp);
        }
    }

    #[test]
    fn prop_reconstruction_matches_simulator((team_a, team_b) in arb_matchup(4), seed in arb_seed()) {
        let output = run_combat(&config(seed), team_a, team_b).unwrap();
        let reconstructor = Reconstructor::replay(SnapshotPolicy::Verify, &output.events).unwrap();

        prop_assert!(
            reconstructor.divergences().is_empty(),
            "first divergence: {:?}",
            reconstructor.divergences().first()
        );
        let (a, b) = output.final_teams.clone();
        prop_assert!(reconstructor.verify_against_teams(&Teams::new(a, b)).is_ok());
    }

    #[test]
    fn prop_hits_follow_their_announcement((team_a, team_b) in arb_matchup(3), seed in arb_seed()) {
        let output = run_combat(&config(seed), team_a, team_b).unwrap();
        for (index, event) in output.events.iter().enumerate() {
            let EventPayload::UnitAttack(hit) = &event.payload else {
                continue;
            };
            if hit.cause != DamageCause::Attack {
                continue;
            }
            let announced = output.events[..index].iter().any(|e| {
                matches!(&e.payload, EventPayload::AnimationStart(a)
                    if a.animation == AnimationKind::Attack
                        && Some(a.unit_id) == hit.attacker_id
                        && Some(a.side) == hit.attacker_side
                        && a.impact_at == event.timestamp)
            });
            prop_assert!(announced, "unannounced hit at seq {:?}", event.seq);
        }
    }

    #[test]
    fn prop_each_unit_dies_at_most_once((team_a, team_b) in arb_matchup(4), seed in arb_seed()) {
        let output = run_combat(&config(seed), team_a, team_b).unwrap();
        let mut dead: Vec<_> = output
            .events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::UnitDied(p) => Some((p.side, p.unit_id)),
                _ => None,
            })
            .collect();
        let total = dead.len();
        dead.sort_unstable();
        dead.dedup();
        prop_assert_eq!(dead.len(), total);
    }
}
