//! Balance testing utilities for batch simulation.
//!
//! Runs the same matchup over many seeds and summarizes who wins, how fast
//! and how many units survive.

use serde::{Deserialize, Serialize};

use arena_core::components::UnitState;
use arena_core::dispatcher::EventLog;
use arena_core::error::Result;
use arena_core::simulation::{simulate, CombatResult, SimConfig, Winner};

/// Result of one simulated battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Seed the battle ran with.
    pub seed: u64,
    /// Winning team.
    pub winner: Winner,
    /// Simulated seconds until the end.
    pub duration: f64,
    /// Alive team A units at the end.
    pub team_a_survivors: usize,
    /// Alive team B units at the end.
    pub team_b_survivors: usize,
}

impl BattleResult {
    /// Summarize a finished combat.
    #[must_use]
    pub fn from_combat(seed: u64, result: &CombatResult) -> Self {
        Self {
            seed,
            winner: result.winner,
            duration: result.duration.to_num::<f64>(),
            team_a_survivors: result.team_a_survivors,
            team_b_survivors: result.team_b_survivors,
        }
    }
}

/// Statistics for a set of battles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleStats {
    /// Total battles run.
    pub total_battles: u32,
    /// Wins for team A.
    pub wins_a: u32,
    /// Wins for team B.
    pub wins_b: u32,
    /// Draws (timeouts or mutual elimination).
    pub draws: u32,
    /// Average simulated seconds to resolution.
    pub avg_duration: f64,
    /// Average survivors of the winning side, over decisive battles.
    pub avg_winner_survivors: f64,
}

impl BattleStats {
    /// Aggregate individual results.
    #[must_use]
    pub fn from_results(results: &[BattleResult]) -> Self {
        let mut stats = Self {
            total_battles: results.len() as u32,
            ..Self::default()
        };
        if results.is_empty() {
            return stats;
        }

        let mut survivors = 0usize;
        for result in results {
            match result.winner {
                Winner::TeamA => {
                    stats.wins_a += 1;
                    survivors += result.team_a_survivors;
                }
                Winner::TeamB => {
                    stats.wins_b += 1;
                    survivors += result.team_b_survivors;
                }
                Winner::Draw => stats.draws += 1,
            }
        }
        stats.avg_duration = results.iter().map(|r| r.duration).sum::<f64>() / results.len() as f64;
        let decisive = stats.wins_a + stats.wins_b;
        if decisive > 0 {
            stats.avg_winner_survivors = survivors as f64 / decisive as f64;
        }
        stats
    }

    /// Calculate win rate for team A (0.0 to 1.0).
    pub fn win_rate_a(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        self.wins_a as f64 / self.total_battles as f64
    }

    /// Calculate win rate for team B (0.0 to 1.0).
    pub fn win_rate_b(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        self.wins_b as f64 / self.total_battles as f64
    }

    /// Check if matchup is balanced (within acceptable range).
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate_a();
        rate >= min_rate && rate <= max_rate
    }
}

/// Run one battle with `seed` replacing the config's seed.
///
/// # Errors
///
/// Returns an error if the inputs are invalid.
pub fn run_battle(
    config: &SimConfig,
    seed: u64,
    team_a: Vec<UnitState>,
    team_b: Vec<UnitState>,
) -> Result<BattleResult> {
    let config = config.clone().with_seed(seed);
    let (result, _) = simulate(team_a, team_b, EventLog::new(), &config)?;
    tracing::debug!(seed, winner = %result.winner, "Battle finished");
    Ok(BattleResult::from_combat(seed, &result))
}

/// Run the matchup once per seed, sequentially.
///
/// # Errors
///
/// Returns the first battle error.
pub fn run_batch<F>(config: &SimConfig, seeds: impl IntoIterator<Item = u64>, teams: F) -> Result<Vec<BattleResult>>
where
    F: Fn() -> (Vec<UnitState>, Vec<UnitState>),
{
    seeds
        .into_iter()
        .map(|seed| {
            let (team_a, team_b) = teams();
            run_battle(config, seed, team_a, team_b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duelist, duelists, heavy_hitter, weak_defender};
    use arena_core::components::Side;

    fn result(winner: Winner, a: usize, b: usize) -> BattleResult {
        BattleResult {
            seed: 0,
            winner,
            duration: 4.0,
            team_a_survivors: a,
            team_b_survivors: b,
        }
    }

    #[test]
    fn test_battle_stats_win_rate() {
        let results = vec![
            result(Winner::TeamA, 2, 0),
            result(Winner::TeamA, 1, 0),
            result(Winner::TeamB, 0, 3),
            result(Winner::Draw, 1, 1),
        ];
        let stats = BattleStats::from_results(&results);

        assert_eq!(stats.total_battles, 4);
        assert_eq!((stats.wins_a, stats.wins_b, stats.draws), (2, 1, 1));
        assert!((stats.win_rate_a() - 0.5).abs() < 0.001);
        assert!((stats.win_rate_b() - 0.25).abs() < 0.001);
        assert!((stats.avg_winner_survivors - 2.0).abs() < 0.001);
        assert!(stats.is_balanced(0.45, 0.55));
    }

    #[test]
    fn test_empty_batch_is_even() {
        let stats = BattleStats::from_results(&[]);
        assert_eq!(stats.total_battles, 0);
        assert!((stats.win_rate_a() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_heavy_hitter_always_wins() {
        let results = run_batch(&SimConfig::default(), 0..8, || (vec![heavy_hitter(1)], vec![weak_defender(1)])).unwrap();
        let stats = BattleStats::from_results(&results);
        assert_eq!(stats.wins_a, 8);
        assert!(stats.avg_duration < 2.0);
    }

    #[test]
    fn test_batch_keeps_seed_order() {
        let config = SimConfig::default().with_timeout(arena_core::math::Fixed::from_num(20));
        let results = run_batch(&config, 0..6, || (duelists(Side::Player, 1), vec![duelist(1, Side::Opponent)])).unwrap();
        assert_eq!(results.len(), 6);
        assert!(results.iter().map(|r| r.seed).eq(0..6));
    }
}
