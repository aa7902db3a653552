//! Core simulation loop.
//!
//! The simulator advances a fixed timestep from `t = 0` until one team is
//! eliminated or the timeout is reached. Every tick runs the systems in a
//! fixed order:
//!
//! 1. Deliver scheduled announcements that are due
//! 2. Resolve pending attack hits and delayed effects
//! 3. Expire timed effects
//! 4. Tick damage over time
//! 5. Per-second buffs and mana regeneration, once per whole second
//! 6. Unit actions, team A then team B
//! 7. Win check
//! 8. Periodic snapshot
//!
//! # Determinism
//!
//! All operations are deterministic:
//! - Time and multipliers are fixed-point ([`Fixed`])
//! - Randomness comes from a seeded RNG owned by the run
//! - Units are visited in team order, never in hash order
//!
//! # Example
//!
//! ```
//! use arena_core::components::{Side, Stats, UnitState};
//! use arena_core::dispatcher::EventLog;
//! use arena_core::math::Fixed;
//! use arena_core::simulation::{simulate, SimConfig, Winner};
//!
//! let a = UnitState::new(1, "Knight", Side::Player, 120, Stats::new(80, 0, Fixed::from_num(2)));
//! let b = UnitState::new(1, "Squire", Side::Opponent, 10, Stats::new(1, 1, Fixed::ONE));
//!
//! let (result, log) = simulate(vec![a], vec![b], EventLog::new(), &SimConfig::default()).unwrap();
//! assert_eq!(result.winner, Winner::TeamA);
//! assert!(log.events().iter().any(|e| e.event_type() == "unit_died"));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::components::{Side, Teams, UnitKey, UnitState};
use crate::dispatcher::{Dispatcher, EventSink};
use crate::effects::MAX_EFFECT_SECONDS;
use crate::emit::Emitter;
use crate::error::{ArenaError, Result};
use crate::math::{action_interval, fixed_float, whole_seconds, Fixed, SimTime};
use crate::systems::Battle;

/// Longest fight a config may ask for, in seconds.
pub const MAX_TIMEOUT: Fixed = Fixed::const_from_int(86_400);

/// Outcome of a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// Every opponent unit died.
    TeamA,
    /// Every player unit died.
    TeamB,
    /// Both teams died together, or the timeout was reached.
    Draw,
}

impl Winner {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Winner::TeamA => "team_a",
            Winner::TeamB => "team_b",
            Winner::Draw => "draw",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodic processing to leave out of a run.
///
/// The initial and final snapshots are always emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipFlags {
    /// Timed effects never expire.
    pub effect_expiry: bool,
    /// Damage-over-time effects never tick.
    pub damage_over_time: bool,
    /// Per-second buffs are not granted.
    pub per_second: bool,
    /// Mana does not regenerate.
    pub mana_regen: bool,
    /// No periodic snapshots.
    pub snapshots: bool,
}

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds per tick.
    #[serde(with = "fixed_float")]
    pub dt: Fixed,
    /// Seconds until the fight is called a draw.
    #[serde(with = "fixed_float")]
    pub timeout: Fixed,
    /// Seed of the run's random source.
    pub seed: u64,
    /// Identifier used in event ids; the seed when absent.
    pub run_id: Option<u64>,
    /// Seconds between periodic snapshots; 0 disables them.
    #[serde(with = "fixed_float")]
    pub snapshot_interval: Fixed,
    /// Seconds between an attack's announcement and its hit.
    #[serde(with = "fixed_float")]
    pub hit_delay: Fixed,
    /// Processing to skip.
    pub skip: SkipFlags,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: Fixed::from_num(0.1),
            timeout: Fixed::from_num(30),
            seed: 0,
            run_id: None,
            snapshot_interval: Fixed::ONE,
            hit_delay: Fixed::from_num(0.1),
            skip: SkipFlags::default(),
        }
    }
}

impl SimConfig {
    /// Builder method to set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Fixed) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run identifier actually used.
    #[must_use]
    pub fn effective_run_id(&self) -> u64 {
        self.run_id.unwrap_or(self.seed)
    }

    /// Parse a config from RON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or the config is invalid.
    pub fn from_ron_str(input: &str) -> Result<Self> {
        let config: Self = ron::from_str(input).map_err(|e| ArenaError::DataParseError {
            origin: "sim config".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject unusable parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.dt <= Fixed::ZERO || self.dt > MAX_EFFECT_SECONDS {
            return Err(ArenaError::InvalidConfig(format!(
                "dt must be in (0, {MAX_EFFECT_SECONDS}], got {}",
                self.dt
            )));
        }
        if self.timeout <= Fixed::ZERO || self.timeout > MAX_TIMEOUT {
            return Err(ArenaError::InvalidConfig(format!(
                "timeout must be in (0, {MAX_TIMEOUT}], got {}",
                self.timeout
            )));
        }
        if self.snapshot_interval < Fixed::ZERO {
            return Err(ArenaError::InvalidConfig(format!(
                "snapshot_interval must not be negative, got {}",
                self.snapshot_interval
            )));
        }
        if self.hit_delay < Fixed::ZERO || self.hit_delay > MAX_EFFECT_SECONDS {
            return Err(ArenaError::InvalidConfig(format!(
                "hit_delay must be in [0, {MAX_EFFECT_SECONDS}], got {}",
                self.hit_delay
            )));
        }
        Ok(())
    }
}

/// Result of a finished fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatResult {
    /// Winning team.
    pub winner: Winner,
    /// Simulated seconds.
    #[serde(with = "fixed_float")]
    pub duration: Fixed,
    /// Alive player units at the end.
    pub team_a_survivors: usize,
    /// Alive opponent units at the end.
    pub team_b_survivors: usize,
    /// Human-readable combat log.
    pub log: Vec<String>,
    /// [`CombatSimulator::state_hash`] of the final state.
    pub final_hash: u64,
}

/// One combat run.
///
/// Owns the unit state, the dispatcher with its seq counter and the random
/// source. Nothing is shared between runs.
pub struct CombatSimulator<S, R = ChaCha8Rng> {
    config: SimConfig,
    battle: Battle<S, R>,
    /// Time accumulated towards each unit's next action.
    accumulators: BTreeMap<UnitKey, Fixed>,
    now: SimTime,
    tick: u64,
    last_second: i64,
    last_snapshot: SimTime,
    started: bool,
    winner: Option<Winner>,
}

impl<S: EventSink> CombatSimulator<S, ChaCha8Rng> {
    /// Create a run seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config or either team is invalid.
    pub fn new(config: SimConfig, team_a: Vec<UnitState>, team_b: Vec<UnitState>, sink: S) -> Result<Self> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(config, team_a, team_b, sink, rng)
    }
}

impl<S: EventSink, R: Rng> CombatSimulator<S, R> {
    /// Create a run with an explicit random source.
    ///
    /// # Errors
    ///
    /// Returns an error if the config or either team is invalid.
    pub fn with_rng(
        config: SimConfig,
        team_a: Vec<UnitState>,
        team_b: Vec<UnitState>,
        sink: S,
        rng: R,
    ) -> Result<Self> {
        config.validate()?;
        let teams = Teams::new(team_a, team_b);
        teams.validate()?;

        let accumulators = teams.keys().into_iter().map(|k| (k, Fixed::ZERO)).collect();
        let emitter = Emitter::new(Dispatcher::new(sink, config.effective_run_id()));
        let battle = Battle::new(teams, emitter, rng, config.hit_delay);
        Ok(Self {
            config,
            battle,
            accumulators,
            now: Fixed::ZERO,
            tick: 0,
            last_second: 0,
            last_snapshot: Fixed::ZERO,
            started: false,
            winner: None,
        })
    }

    /// Run the fight to completion.
    ///
    /// # Errors
    ///
    /// Returns the first delivery error; the run is aborted.
    pub fn run(&mut self) -> Result<CombatResult> {
        self.start()?;
        while self.winner.is_none() {
            self.step()?;
        }
        self.finish()
    }

    /// Emit the initial snapshot and apply passives at `t = 0`.
    ///
    /// Calling it again has no effect.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses an event.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        tracing::debug!(
            run_id = self.battle.emitter.dispatcher().run_id(),
            team_a = self.battle.teams.player.len(),
            team_b = self.battle.teams.opponent.len(),
            "Combat started"
        );
        self.battle
            .emitter
            .snapshot(self.now, &self.battle.teams.player, &self.battle.teams.opponent)?;
        self.battle.apply_passives(self.now)?;
        self.winner = self.check_winner();
        Ok(())
    }

    /// Advance one tick. Returns the winner once the fight is decided.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses an event.
    pub fn step(&mut self) -> Result<Option<Winner>> {
        if !self.started {
            self.start()?;
        }
        if self.winner.is_some() {
            return Ok(self.winner);
        }

        self.tick += 1;
        self.now += self.config.dt;
        let now = self.now;
        let skip = self.config.skip;

        self.battle.emitter.deliver_scheduled(now)?;
        self.battle.resolve_pending(now)?;
        if !skip.effect_expiry {
            self.battle.expire_effects(now)?;
        }
        if !skip.damage_over_time {
            self.battle.tick_damage_over_time(now)?;
        }

        let second = whole_seconds(now);
        if second > self.last_second {
            self.last_second = second;
            if !(skip.per_second && skip.mana_regen) {
                self.battle.per_second(now, !skip.per_second, !skip.mana_regen)?;
            }
        }

        self.unit_actions(now)?;

        #[cfg(feature = "debug-validation")]
        self.check_invariants()?;

        self.winner = self.check_winner();
        if self.winner.is_none() && now >= self.config.timeout {
            self.winner = Some(Winner::Draw);
        }

        if self.winner.is_none()
            && !skip.snapshots
            && self.config.snapshot_interval > Fixed::ZERO
            && now - self.last_snapshot >= self.config.snapshot_interval
        {
            self.last_snapshot = now;
            self.battle
                .emitter
                .snapshot(now, &self.battle.teams.player, &self.battle.teams.opponent)?;
        }

        tracing::trace!(tick = self.tick, time = %now, hash = self.state_hash(), "Tick complete");
        Ok(self.winner)
    }

    fn unit_actions(&mut self, now: SimTime) -> Result<()> {
        for key in self.battle.teams.keys() {
            let Some(unit) = self.battle.teams.get(key) else {
                continue;
            };
            if !unit.is_alive() || unit.is_stunned(now) {
                continue;
            }
            let Some(interval) = action_interval(unit.stats.attack_speed) else {
                continue;
            };
            let accumulated = self.accumulators.entry(key).or_insert(Fixed::ZERO);
            *accumulated += self.config.dt;
            if *accumulated < interval {
                continue;
            }
            *accumulated = Fixed::ZERO;
            self.battle.act(now, key)?;
            if self.check_winner().is_some() {
                break;
            }
        }
        Ok(())
    }

    fn check_winner(&self) -> Option<Winner> {
        let a_alive = self.battle.teams.alive_count(Side::Player) > 0;
        let b_alive = self.battle.teams.alive_count(Side::Opponent) > 0;
        match (a_alive, b_alive) {
            (true, true) => None,
            (true, false) => Some(Winner::TeamA),
            (false, true) => Some(Winner::TeamB),
            (false, false) => Some(Winner::Draw),
        }
    }

    /// Emit the final snapshot and `combat_end`, then build the result.
    ///
    /// Announcements still queued for the future are dropped.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses an event.
    pub fn finish(&mut self) -> Result<CombatResult> {
        let winner = self.winner.unwrap_or(Winner::Draw);
        let now = self.now;
        let dropped = self.battle.emitter.dispatcher_mut().discard_scheduled();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped announcements scheduled past the end of combat");
        }
        self.battle.pending.clear();

        let team_a_survivors = self.battle.teams.alive_count(Side::Player);
        let team_b_survivors = self.battle.teams.alive_count(Side::Opponent);
        self.battle
            .emitter
            .snapshot(now, &self.battle.teams.player, &self.battle.teams.opponent)?;
        self.battle
            .emitter
            .combat_end(now, winner, team_a_survivors, team_b_survivors)?;

        let mut log = std::mem::take(&mut self.battle.log);
        log.push(format!(
            "[{:>6.2}s] Combat over: {winner} ({team_a_survivors} vs {team_b_survivors} survivors)",
            now.to_num::<f64>()
        ));
        let final_hash = self.state_hash();
        tracing::info!(
            %winner,
            duration = %now,
            team_a_survivors,
            team_b_survivors,
            events = self.battle.emitter.dispatcher().last_seq().unwrap_or(0),
            "Combat finished"
        );

        Ok(CombatResult {
            winner,
            duration: now,
            team_a_survivors,
            team_b_survivors,
            log,
            final_hash,
        })
    }

    /// Hash of the current state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.now.to_bits().hash(&mut hasher);

        for unit in self.battle.teams.iter() {
            unit.key().hash(&mut hasher);
            unit.hp.hash(&mut hasher);
            unit.max_hp.hash(&mut hasher);
            unit.shield.hash(&mut hasher);
            unit.mana.hash(&mut hasher);
            unit.stats.hash(&mut hasher);
            unit.is_dead.hash(&mut hasher);
            unit.effects.len().hash(&mut hasher);
            for effect in &unit.effects {
                effect.effect_id.hash(&mut hasher);
                effect.expires_at.map(Fixed::to_bits).hash(&mut hasher);
            }
        }
        self.battle.emitter.dispatcher().last_seq().hash(&mut hasher);
        hasher.finish()
    }

    #[cfg(feature = "debug-validation")]
    fn check_invariants(&self) -> Result<()> {
        for unit in self.battle.teams.iter() {
            if unit.hp < 0 || unit.hp > unit.max_hp {
                return Err(ArenaError::DesyncDetected {
                    side: unit.side,
                    unit: unit.id,
                    field: "hp",
                    expected: format!("0..={}", unit.max_hp),
                    actual: unit.hp.to_string(),
                });
            }
            if unit.shield < 0 {
                return Err(ArenaError::DesyncDetected {
                    side: unit.side,
                    unit: unit.id,
                    field: "shield",
                    expected: ">= 0".to_string(),
                    actual: unit.shield.to_string(),
                });
            }
            if unit.mana < 0 || unit.mana > unit.max_mana {
                return Err(ArenaError::DesyncDetected {
                    side: unit.side,
                    unit: unit.id,
                    field: "current_mana",
                    expected: format!("0..={}", unit.max_mana),
                    actual: unit.mana.to_string(),
                });
            }
        }
        tracing::debug!(tick = self.tick, hash = self.state_hash(), "Invariants hold");
        Ok(())
    }

    /// Both teams in their current state.
    #[must_use]
    pub fn teams(&self) -> &Teams {
        &self.battle.teams
    }

    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Winner, once decided.
    #[must_use]
    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    /// The config this run uses.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The event sink.
    pub fn sink(&self) -> &S {
        self.battle.emitter.dispatcher().sink()
    }

    /// Unwrap the event sink.
    pub fn into_sink(self) -> S {
        self.battle.emitter.into_dispatcher().into_sink()
    }
}

/// Run one fight and return its result together with the sink.
///
/// # Errors
///
/// Returns an error if the inputs are invalid or the sink refuses an event.
pub fn simulate<S: EventSink>(
    team_a: Vec<UnitState>,
    team_b: Vec<UnitState>,
    sink: S,
    config: &SimConfig,
) -> Result<(CombatResult, S)> {
    let mut sim = CombatSimulator::new(config.clone(), team_a, team_b, sink)?;
    let result = sim.run()?;
    Ok((result, sim.into_sink()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Stats;
    use crate::dispatcher::EventLog;
    use crate::error::SinkError;
    use crate::events::{CombatEvent, EventPayload};

    fn duelist(id: u32, side: Side) -> UnitState {
        UnitState::new(id, format!("Duelist{id}"), side, 100, Stats::new(10, 0, Fixed::ONE))
    }

    fn run(config: &SimConfig) -> (CombatResult, Vec<CombatEvent>) {
        let (result, log) = simulate(
            vec![duelist(1, Side::Player)],
            vec![duelist(1, Side::Opponent)],
            EventLog::new(),
            config,
        )
        .unwrap();
        (result, log.into_events())
    }

    // ========================================================================
    // Config
    // ========================================================================

    #[test]
    fn test_config_defaults_and_ron() {
        let config = SimConfig::from_ron_str("(seed: 7, timeout: 5.0)").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.timeout, Fixed::from_num(5));
        assert_eq!(config.dt, Fixed::from_num(0.1));
        assert_eq!(config.effective_run_id(), 7);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad_dt = SimConfig {
            dt: Fixed::ZERO,
            ..SimConfig::default()
        };
        assert!(matches!(bad_dt.validate(), Err(ArenaError::InvalidConfig(_))));

        let bad_delay = SimConfig {
            hit_delay: Fixed::from_num(-1),
            ..SimConfig::default()
        };
        assert!(bad_delay.validate().is_err());

        let endless = SimConfig::default().with_timeout(Fixed::MAX);
        assert!(matches!(endless.validate(), Err(ArenaError::InvalidConfig(_))));
        assert!(SimConfig::default().with_timeout(MAX_TIMEOUT).validate().is_ok());
    }

    // ========================================================================
    // Runs
    // ========================================================================

    #[test]
    fn test_duel_times_out_as_draw() {
        let config = SimConfig::default().with_timeout(Fixed::from_num(5));
        let (result, events) = run(&config);
        assert_eq!(result.winner, Winner::Draw);
        assert_eq!(result.duration, Fixed::from_num(0.1) * Fixed::from_num(50));
        assert_eq!((result.team_a_survivors, result.team_b_survivors), (1, 1));

        let hits = events.iter().filter(|e| e.event_type() == "unit_attack").count();
        assert!(hits >= 8, "expected several exchanges, got {hits}");
        assert_eq!(events.first().map(CombatEvent::event_type), Some("state_snapshot"));
        assert_eq!(events.last().map(CombatEvent::event_type), Some("combat_end"));
    }

    #[test]
    fn test_elimination() {
        let attacker = UnitState::new(1, "Brute", Side::Player, 120, Stats::new(80, 0, Fixed::from_num(2)));
        let defender = UnitState::new(1, "Squire", Side::Opponent, 10, Stats::new(1, 1, Fixed::ONE));
        let (result, log) = simulate(vec![attacker], vec![defender], EventLog::new(), &SimConfig::default()).unwrap();

        assert_eq!(result.winner, Winner::TeamA);
        assert!(result.duration < Fixed::ONE);
        assert_eq!(result.team_b_survivors, 0);
        let deaths: Vec<_> = log
            .events()
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::UnitDied(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].killer_id, Some(1));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let config = SimConfig::default().with_seed(42);
        let (first, a) = run(&config);
        let (second, b) = run(&config);
        assert_eq!(a, b);
        assert_eq!(first.final_hash, second.final_hash);
    }

    #[test]
    fn test_seq_strictly_increasing() {
        let (_, events) = run(&SimConfig::default().with_seed(9));
        let seqs: Vec<u64> = events.iter().filter_map(|e| e.seq).collect();
        assert_eq!(seqs.len(), events.len());
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(seqs.first(), Some(&1));
    }

    #[test]
    fn test_empty_team_ends_immediately() {
        let (result, _) = simulate(vec![duelist(1, Side::Player)], Vec::new(), EventLog::new(), &SimConfig::default())
            .unwrap();
        assert_eq!(result.winner, Winner::TeamA);
        assert_eq!(result.duration, Fixed::ZERO);
    }

    #[test]
    fn test_sink_failure_aborts_run() {
        let mut delivered = 0u32;
        let sink = move |_: &CombatEvent| -> std::result::Result<(), SinkError> {
            if delivered == 5 {
                return Err("consumer closed".into());
            }
            delivered += 1;
            Ok(())
        };
        let err = simulate(
            vec![duelist(1, Side::Player)],
            vec![duelist(1, Side::Opponent)],
            sink,
            &SimConfig::default(),
        )
        .err()
        .expect("run must abort");
        match err {
            ArenaError::Delivery { seq, .. } => assert_eq!(seq, 6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_step_by_step_matches_run() {
        let config = SimConfig::default().with_seed(3);
        let (expected, _) = run(&config);

        let mut sim = CombatSimulator::new(
            config,
            vec![duelist(1, Side::Player)],
            vec![duelist(1, Side::Opponent)],
            EventLog::new(),
        )
        .unwrap();
        sim.start().unwrap();
        while sim.step().unwrap().is_none() {}
        let result = sim.finish().unwrap();
        assert_eq!(result, expected);
    }
}
