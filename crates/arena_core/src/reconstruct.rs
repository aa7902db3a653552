//! Event-sourced state reconstruction.
//!
//! The [`Reconstructor`] rebuilds per-unit state from an initial snapshot
//! and the ordered event stream alone. Every handler repeats the arithmetic
//! of the matching emitter using only what the payload states, so a
//! reconstructed fight must end in exactly the state the simulator held.
//!
//! Payload post-values (post HP, post shield, new mana, new stat value) are
//! cross-checked against the reconstructed arithmetic and mismatches are
//! recorded as [`Divergence`]s.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::components::{EffectView, Side, StatKind, Teams, UnitId};
use crate::error::{ArenaError, Result};
use crate::events::{
    CombatEvent, DamagePayload, EffectExpiredPayload, EventPayload, StatBuffPayload,
};
use crate::math::Fixed;
use crate::snapshot::{CombatSnapshot, SnapshotUnit};
use crate::vitals::{self, StatSlots};

/// Reconstructed units of one side, keyed by unit id.
pub type UnitTable = BTreeMap<UnitId, SnapshotUnit>;

/// What a mid-stream `state_snapshot` does to reconstructed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Replace reconstructed state with the snapshot.
    #[default]
    Overwrite,
    /// Compare against the snapshot and record divergences, keeping the
    /// reconstructed state.
    Verify,
}

/// A value the event stream disagrees with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Seq of the event that exposed it.
    pub seq: Option<u64>,
    /// Wire name of that event.
    pub event_type: &'static str,
    /// Side of the unit.
    pub side: Side,
    /// Unit identifier.
    pub unit: UnitId,
    /// Diverging field.
    pub field: &'static str,
    /// Value stated by the event or snapshot.
    pub expected: String,
    /// Reconstructed value.
    pub actual: String,
}

impl From<Divergence> for ArenaError {
    fn from(d: Divergence) -> Self {
        ArenaError::DesyncDetected {
            side: d.side,
            unit: d.unit,
            field: d.field,
            expected: d.expected,
            actual: d.actual,
        }
    }
}

type Checks = Vec<(&'static str, String, String)>;

fn check<T: PartialEq + ToString>(checks: &mut Checks, field: &'static str, expected: T, actual: T) {
    if expected != actual {
        checks.push((field, expected.to_string(), actual.to_string()));
    }
}

/// Sort events into replay order: by seq (missing seq last), a snapshot
/// after other events with the same seq, then by timestamp. The sort is
/// stable.
pub fn sort_for_replay(events: &mut [CombatEvent]) {
    events.sort_by(replay_order);
}

fn replay_order(a: &CombatEvent, b: &CombatEvent) -> Ordering {
    let seq = |e: &CombatEvent| (e.seq.is_none(), e.seq.unwrap_or(0));
    seq(a)
        .cmp(&seq(b))
        .then(a.is_snapshot().cmp(&b.is_snapshot()))
        .then(a.timestamp.cmp(&b.timestamp))
}

// ============================================================================
// Arithmetic shared with the emitters
// ============================================================================

fn absorb_shield(unit: &mut SnapshotUnit, amount: i32) -> i32 {
    let mut layers: Vec<i32> = unit
        .effects
        .iter()
        .filter(|e| e.kind == "shield")
        .map(|e| e.value.saturating_to_num::<i32>())
        .collect();
    let absorbed = vitals::absorb_shield(&mut unit.shield, amount, &mut layers);
    let shields = unit.effects.iter_mut().filter(|e| e.kind == "shield");
    for (effect, left) in shields.zip(layers) {
        effect.value = Fixed::from_num(left);
    }
    absorbed
}

fn shift_stat(unit: &mut SnapshotUnit, stat: StatKind, delta: Fixed) -> (Fixed, Fixed) {
    StatSlots {
        hp: &mut unit.hp,
        max_hp: &mut unit.max_hp,
        attack: &mut unit.attack,
        defense: &mut unit.defense,
        attack_speed: &mut unit.attack_speed,
        mana_regen: &mut unit.mana_regen,
    }
    .shift(stat, delta)
}

fn push_view(
    unit: &mut SnapshotUnit,
    effect_id: u64,
    kind: &str,
    stat: Option<StatKind>,
    value: Fixed,
    expires_at: Option<Fixed>,
) {
    unit.effects.push(EffectView {
        effect_id,
        kind: kind.to_string(),
        stat,
        value,
        remaining_ticks: None,
        expires_at,
    });
}

// ============================================================================
// Reconstructor
// ============================================================================

/// Rebuilds unit state from an event stream.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    policy: SnapshotPolicy,
    player: UnitTable,
    opponent: UnitTable,
    initialized: bool,
    divergences: Vec<Divergence>,
    processed: usize,
}

impl Reconstructor {
    /// Create a reconstructor that lets snapshots overwrite state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reconstructor with an explicit snapshot policy.
    #[must_use]
    pub fn with_policy(policy: SnapshotPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Sort `events` into replay order and process all of them.
    ///
    /// The first event after sorting must be a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first reconstruction fault.
    pub fn replay(policy: SnapshotPolicy, events: &[CombatEvent]) -> Result<Self> {
        let mut ordered = events.to_vec();
        sort_for_replay(&mut ordered);
        let mut reconstructor = Self::with_policy(policy);
        for event in &ordered {
            reconstructor.process_event(event)?;
        }
        Ok(reconstructor)
    }

    /// Seed state from a full snapshot, discarding anything reconstructed
    /// so far.
    pub fn initialize_from_snapshot(&mut self, snapshot: &CombatSnapshot) {
        self.player = Self::table(&snapshot.player_units);
        self.opponent = Self::table(&snapshot.opponent_units);
        self.initialized = true;
        tracing::debug!(
            seq = ?snapshot.seq,
            player_units = self.player.len(),
            opponent_units = self.opponent.len(),
            "Reconstruction initialized"
        );
    }

    fn table(units: &[SnapshotUnit]) -> UnitTable {
        units.iter().map(|u| (u.id, u.clone())).collect()
    }

    /// Apply one event.
    ///
    /// A snapshot received before initialization initializes state.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MissingSnapshot`] for an event before any
    /// snapshot, and [`ArenaError::UnknownUnit`] for an event naming a unit
    /// the snapshot did not list.
    pub fn process_event(&mut self, event: &CombatEvent) -> Result<()> {
        if let Some(snapshot) = CombatSnapshot::from_event(event) {
            if !self.initialized || self.policy == SnapshotPolicy::Overwrite {
                self.initialize_from_snapshot(&snapshot);
            } else {
                self.compare_snapshot(&snapshot, event.event_type());
            }
            self.processed += 1;
            return Ok(());
        }
        if !self.initialized {
            return Err(ArenaError::MissingSnapshot);
        }

        let Some((side, id)) = Self::subject(&event.payload) else {
            self.processed += 1;
            return Ok(());
        };
        let event_type = event.event_type();
        let table = match side {
            Side::Player => &mut self.player,
            Side::Opponent => &mut self.opponent,
        };
        let unit = table.get_mut(&id).ok_or(ArenaError::UnknownUnit {
            side,
            unit: id,
            event_type,
            seq: event.seq,
        })?;

        let mut checks = Checks::new();
        Self::apply(unit, &event.payload, &mut checks);
        for (field, expected, actual) in checks {
            self.record(Divergence {
                seq: event.seq,
                event_type,
                side,
                unit: id,
                field,
                expected,
                actual,
            });
        }
        self.processed += 1;
        Ok(())
    }

    /// Unit an event is about, for events that name one.
    fn subject(payload: &EventPayload) -> Option<(Side, UnitId)> {
        Some(match payload {
            EventPayload::UnitAttack(p) | EventPayload::DamageOverTimeTick(p) => (p.side, p.target_id),
            EventPayload::DamageOverTimeApplied(p) => (p.side, p.unit_id),
            EventPayload::DamageOverTimeExpired(p) | EventPayload::EffectExpired(p) => (p.side, p.unit_id),
            EventPayload::UnitHeal(p) => (p.side, p.unit_id),
            EventPayload::ShieldApplied(p) => (p.side, p.unit_id),
            EventPayload::StatBuff(p) => (p.side, p.unit_id),
            EventPayload::SkillCast(p) => (p.side, p.caster_id),
            EventPayload::UnitStunned(p) => (p.side, p.unit_id),
            EventPayload::UnitDied(p) => (p.side, p.unit_id),
            EventPayload::ManaUpdate(p) => (p.side, p.unit_id),
            EventPayload::RegenGain(p) => (p.side, p.unit_id),
            EventPayload::EffectApplied(p) => (p.side, p.unit_id),
            EventPayload::AnimationStart(p) => (p.side, p.unit_id),
            EventPayload::StateSnapshot(_) | EventPayload::CombatEnd(_) => return None,
        })
    }

    fn apply(unit: &mut SnapshotUnit, payload: &EventPayload, checks: &mut Checks) {
        match payload {
            EventPayload::UnitAttack(p) | EventPayload::DamageOverTimeTick(p) => {
                Self::apply_damage(unit, p, checks);
            }
            EventPayload::DamageOverTimeApplied(p) => {
                unit.effects.push(EffectView {
                    effect_id: p.effect_id,
                    kind: "damage_over_time".to_string(),
                    stat: None,
                    value: Fixed::from_num(p.damage),
                    remaining_ticks: Some(p.ticks),
                    expires_at: None,
                });
            }
            EventPayload::DamageOverTimeExpired(p) | EventPayload::EffectExpired(p) => {
                Self::apply_expiry(unit, p, checks);
            }
            EventPayload::UnitHeal(p) => {
                check(checks, "pre_hp", p.pre_hp, unit.hp);
                unit.hp = vitals::healed_hp(unit.hp, p.amount, unit.max_hp);
                check(checks, "post_hp", p.post_hp, unit.hp);
            }
            EventPayload::ShieldApplied(p) => {
                check(checks, "pre_shield", p.pre_shield, unit.shield);
                let amount = p.amount.max(0);
                unit.shield = vitals::added_shield(unit.shield, amount);
                push_view(
                    unit,
                    p.effect_id,
                    "shield",
                    None,
                    Fixed::from_num(amount),
                    Some(p.expires_at),
                );
                check(checks, "post_shield", p.post_shield, unit.shield);
            }
            EventPayload::StatBuff(p) => Self::apply_stat_buff(unit, p, checks),
            EventPayload::EffectApplied(p) => {
                push_view(unit, p.effect_id, &p.effect_type, p.stat, p.value, p.expires_at);
            }
            EventPayload::UnitStunned(p) => {
                push_view(unit, p.effect_id, "stun", None, Fixed::ZERO, Some(p.expires_at));
            }
            EventPayload::UnitDied(_) => {
                unit.hp = 0;
                unit.is_dead = true;
                unit.shield = 0;
                unit.effects.clear();
            }
            EventPayload::ManaUpdate(p) => {
                check(checks, "previous_mana", p.previous_mana, unit.current_mana);
                unit.current_mana = p.mana;
            }
            EventPayload::RegenGain(p) => {
                check(checks, "pre_mana", p.pre_mana, unit.current_mana);
                unit.current_mana = unit.current_mana.saturating_add(p.mana_gained);
                check(checks, "new_mana", p.new_mana, unit.current_mana);
            }
            EventPayload::SkillCast(_)
            | EventPayload::AnimationStart(_)
            | EventPayload::StateSnapshot(_)
            | EventPayload::CombatEnd(_) => {}
        }
    }

    fn apply_damage(unit: &mut SnapshotUnit, p: &DamagePayload, checks: &mut Checks) {
        if unit.is_dead {
            check(checks, "is_dead", false, true);
            return;
        }
        check(checks, "pre_hp", p.pre_hp, unit.hp);
        check(checks, "pre_shield", p.pre_shield, unit.shield);

        let amount = p.damage.max(0);
        let absorbed = absorb_shield(unit, amount);
        unit.hp = vitals::damaged_hp(unit.hp, amount, absorbed);

        check(checks, "shield_absorbed", p.shield_absorbed, absorbed);
        check(checks, "post_hp", p.post_hp, unit.hp);
        check(checks, "post_shield", p.post_shield, unit.shield);

        if let (Some(effect_id), Some(remaining)) = (p.effect_id, p.remaining_ticks) {
            match unit.effects.iter_mut().find(|e| e.effect_id == effect_id) {
                Some(view) => view.remaining_ticks = Some(remaining),
                None => check(checks, "effects", format!("effect {effect_id}"), "missing".to_string()),
            }
        }
    }

    fn apply_stat_buff(unit: &mut SnapshotUnit, p: &StatBuffPayload, checks: &mut Checks) {
        let (applied, new_value) = shift_stat(unit, p.stat, p.delta);
        check(checks, "delta", p.delta, applied);
        check(checks, "new_value", p.new_value, new_value);
        if let Some(post_hp) = p.post_hp {
            check(checks, "post_hp", post_hp, unit.hp);
        }
        let kind = if p.is_debuff { "debuff" } else { "buff" };
        push_view(unit, p.effect_id, kind, Some(p.stat), applied, p.expires_at);
    }

    fn apply_expiry(unit: &mut SnapshotUnit, p: &EffectExpiredPayload, checks: &mut Checks) {
        let Some(index) = unit.effects.iter().position(|e| e.effect_id == p.effect_id) else {
            check(checks, "effects", format!("effect {}", p.effect_id), "missing".to_string());
            return;
        };
        let view = unit.effects.remove(index);
        check(checks, "effect_type", p.effect_type.as_str(), view.kind.as_str());

        match view.kind.as_str() {
            "buff" | "debuff" => {
                let Some(stat) = view.stat else {
                    return;
                };
                let (reverted, new_value) = shift_stat(unit, stat, view.value.saturating_neg());
                if let Some(expected) = p.reverted_delta {
                    check(checks, "reverted_delta", expected, reverted);
                }
                if let Some(expected) = p.new_value {
                    check(checks, "new_value", expected, new_value);
                }
                if let Some(post_hp) = p.post_hp {
                    check(checks, "post_hp", post_hp, unit.hp);
                }
            }
            "shield" => {
                let removed = vitals::expired_shield(unit.shield, view.value.saturating_to_num::<i32>());
                unit.shield -= removed;
                if let Some(expected) = p.shield_removed {
                    check(checks, "shield_removed", expected, removed);
                }
                if let Some(expected) = p.post_shield {
                    check(checks, "post_shield", expected, unit.shield);
                }
            }
            _ => {}
        }
    }

    fn compare_snapshot(&mut self, snapshot: &CombatSnapshot, event_type: &'static str) {
        let mut found = Vec::new();
        for side in [Side::Player, Side::Opponent] {
            let table = match side {
                Side::Player => &self.player,
                Side::Opponent => &self.opponent,
            };
            for expected in snapshot.units(side) {
                let diffs = match table.get(&expected.id) {
                    Some(actual) => actual.diff(expected),
                    None => vec![("unit", "present".to_string(), "missing".to_string())],
                };
                for (field, want, got) in diffs {
                    found.push(Divergence {
                        seq: snapshot.seq,
                        event_type,
                        side,
                        unit: expected.id,
                        field,
                        expected: want,
                        actual: got,
                    });
                }
            }
        }
        for divergence in found {
            self.record(divergence);
        }
    }

    fn record(&mut self, divergence: Divergence) {
        tracing::warn!(
            seq = ?divergence.seq,
            event_type = divergence.event_type,
            side = %divergence.side,
            unit = divergence.unit,
            field = divergence.field,
            expected = %divergence.expected,
            actual = %divergence.actual,
            "Reconstruction diverged"
        );
        self.divergences.push(divergence);
    }

    /// Reconstructed player and opponent units.
    #[must_use]
    pub fn get_reconstructed_state(&self) -> (&UnitTable, &UnitTable) {
        (&self.player, &self.opponent)
    }

    /// Reconstructed units of one side.
    #[must_use]
    pub fn units(&self, side: Side) -> &UnitTable {
        match side {
            Side::Player => &self.player,
            Side::Opponent => &self.opponent,
        }
    }

    /// Divergences recorded so far.
    #[must_use]
    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }

    /// Number of events processed.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Whether a snapshot has been applied.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Check reconstructed state against an authoritative snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::DesyncDetected`] for the first differing field,
    /// or [`ArenaError::UnknownUnit`] if a unit is missing.
    pub fn verify_against(&self, expected: &CombatSnapshot) -> Result<()> {
        if !self.initialized {
            return Err(ArenaError::MissingSnapshot);
        }
        for side in [Side::Player, Side::Opponent] {
            for want in expected.units(side) {
                let actual = self.units(side).get(&want.id).ok_or(ArenaError::UnknownUnit {
                    side,
                    unit: want.id,
                    event_type: "state_snapshot",
                    seq: expected.seq,
                })?;
                if let Some((field, expected_value, actual_value)) = actual.diff(want).into_iter().next() {
                    return Err(ArenaError::DesyncDetected {
                        side,
                        unit: want.id,
                        field,
                        expected: expected_value,
                        actual: actual_value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check reconstructed state against live simulator teams.
    ///
    /// # Errors
    ///
    /// See [`Reconstructor::verify_against`].
    pub fn verify_against_teams(&self, teams: &Teams) -> Result<()> {
        self.verify_against(&CombatSnapshot::capture(&teams.player, &teams.opponent, Fixed::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Stats, UnitState};
    use crate::dispatcher::{Dispatcher, EventLog};
    use crate::effects::{DamageType, ValueType};
    use crate::emit::{BuffRequest, Emitter};
    use crate::events::{DamageCause, ManaCause};

    fn emitter() -> Emitter<EventLog> {
        Emitter::new(Dispatcher::new(EventLog::new(), 0))
    }

    fn pair() -> (UnitState, UnitState) {
        (
            UnitState::new(1, "A", Side::Player, 100, Stats::default()).with_shield(5),
            UnitState::new(1, "B", Side::Opponent, 80, Stats::default()),
        )
    }

    fn replayed(em: Emitter<EventLog>) -> Reconstructor {
        let events = em.into_dispatcher().into_sink().into_events();
        Reconstructor::replay(SnapshotPolicy::Verify, &events).unwrap()
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    #[test]
    fn test_sort_by_seq_then_snapshot_then_time() {
        let (a, b) = pair();
        let t = Fixed::ONE;
        let mut em = emitter();
        em.snapshot(t, &[a.clone()], &[b.clone()]).unwrap();
        let mut events = em.into_dispatcher().into_sink().into_events();
        let snapshot = events.remove(0);

        let mut damage = emitter();
        let mut target = b;
        damage
            .damage(t, None, &mut target, 5, DamageType::Physical, DamageCause::Attack)
            .unwrap();
        let mut hit = damage.into_dispatcher().into_sink().into_events().remove(0);

        // Same seq: the snapshot goes last.
        let mut same_seq = vec![snapshot.clone(), hit.clone()];
        sort_for_replay(&mut same_seq);
        assert!(same_seq[1].is_snapshot());

        // Missing seq sorts after present seq.
        hit.seq = None;
        let mut missing = vec![hit.clone(), snapshot.clone()];
        sort_for_replay(&mut missing);
        assert!(missing[0].is_snapshot());

        // Both missing: timestamp decides among non-snapshots.
        let mut early = hit.clone();
        early.timestamp = Fixed::ZERO;
        let mut two = vec![hit, early];
        sort_for_replay(&mut two);
        assert_eq!(two[0].timestamp, Fixed::ZERO);
    }

    // ========================================================================
    // Replay
    // ========================================================================

    #[test]
    fn test_event_before_snapshot_is_an_error() {
        let (_, mut b) = pair();
        let mut em = emitter();
        em.heal(Fixed::ZERO, None, &mut b, 5).unwrap();
        let events = em.into_dispatcher().into_sink().into_events();
        let mut rec = Reconstructor::new();
        assert!(matches!(rec.process_event(&events[0]), Err(ArenaError::MissingSnapshot)));
    }

    #[test]
    fn test_unknown_unit_is_an_error() {
        let (a, b) = pair();
        let mut em = emitter();
        em.snapshot(Fixed::ZERO, &[a], &[]).unwrap();
        let mut b = b;
        em.heal(Fixed::ZERO, None, &mut b, 5).unwrap();
        let events = em.into_dispatcher().into_sink().into_events();
        let err = Reconstructor::replay(SnapshotPolicy::Overwrite, &events).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::UnknownUnit {
                side: Side::Opponent,
                unit: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_mixed_stream_reconstructs_exactly() {
        let (mut a, mut b) = pair();
        let mut em = emitter();
        let t0 = Fixed::ZERO;
        let t1 = Fixed::ONE;
        em.snapshot(t0, &[a.clone()], &[b.clone()]).unwrap();

        em.shield(t0, None, &mut a, 10, Fixed::from_num(3)).unwrap();
        em.damage(t1, None, &mut a, 12, DamageType::Physical, DamageCause::Attack)
            .unwrap();
        let buff = BuffRequest {
            duration: Some(Fixed::from_num(2)),
            ..BuffRequest::permanent(StatKind::MaxHp, Fixed::from_num(20), ValueType::Percentage)
        };
        em.stat_buff(t1, None, &mut a, buff).unwrap();
        em.gain_mana(t1, &mut a, 30, ManaCause::Attack).unwrap();
        let dot = em
            .dot_applied(t1, None, &mut b, 7, 2, Fixed::ONE)
            .unwrap()
            .expect("alive");
        em.dot_tick(Fixed::from_num(2), &mut b, dot).unwrap();

        let due: Vec<_> = a.effects.iter().map(|e| e.effect_id).collect();
        for id in due {
            em.expire(Fixed::from_num(4), &mut a, id).unwrap();
        }
        em.dot_tick(Fixed::from_num(3), &mut b, dot).unwrap();
        em.snapshot(Fixed::from_num(4), &[a.clone()], &[b.clone()]).unwrap();

        let rec = replayed(em);
        assert!(rec.divergences().is_empty(), "{:?}", rec.divergences());
        let (player, opponent) = rec.get_reconstructed_state();
        assert_eq!(player[&1].hp, a.hp);
        assert_eq!(player[&1].max_hp, a.max_hp);
        assert_eq!(player[&1].shield, a.shield);
        assert_eq!(player[&1].current_mana, a.mana);
        assert_eq!(opponent[&1].hp, 66);
        assert!(opponent[&1].effects.is_empty());
        rec.verify_against(&CombatSnapshot::capture(&[a], &[b], Fixed::ZERO))
            .unwrap();
    }

    #[test]
    fn test_verify_policy_flags_tampered_snapshot() {
        let (a, mut b) = pair();
        let mut em = emitter();
        em.snapshot(Fixed::ZERO, &[a.clone()], &[b.clone()]).unwrap();
        em.damage(Fixed::ONE, None, &mut b, 10, DamageType::Physical, DamageCause::Attack)
            .unwrap();
        b.hp += 3;
        em.snapshot(Fixed::ONE, &[a], &[b]).unwrap();

        let events = em.into_dispatcher().into_sink().into_events();
        let verified = Reconstructor::replay(SnapshotPolicy::Verify, &events).unwrap();
        assert_eq!(verified.divergences().len(), 1);
        assert_eq!(verified.divergences()[0].field, "hp");
        assert_eq!(verified.units(Side::Opponent)[&1].hp, 70);

        let overwritten = Reconstructor::replay(SnapshotPolicy::Overwrite, &events).unwrap();
        assert!(overwritten.divergences().is_empty());
        assert_eq!(overwritten.units(Side::Opponent)[&1].hp, 73);
    }

    #[test]
    fn test_tampered_payload_is_recorded() {
        let (a, mut b) = pair();
        let mut em = emitter();
        em.snapshot(Fixed::ZERO, &[a], &[b.clone()]).unwrap();
        em.damage(Fixed::ONE, None, &mut b, 10, DamageType::Physical, DamageCause::Attack)
            .unwrap();
        let mut events = em.into_dispatcher().into_sink().into_events();
        if let EventPayload::UnitAttack(p) = &mut events[1].payload {
            p.post_hp = 75;
        }
        let rec = Reconstructor::replay(SnapshotPolicy::Verify, &events).unwrap();
        let fields: Vec<_> = rec.divergences().iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["post_hp"]);
    }

    #[test]
    fn test_death_clears_without_reverting() {
        let (a, mut b) = pair();
        let mut em = emitter();
        em.snapshot(Fixed::ZERO, &[a], &[b.clone()]).unwrap();
        let buff = BuffRequest::permanent(StatKind::Attack, Fixed::from_num(5), ValueType::Flat);
        em.stat_buff(Fixed::ZERO, None, &mut b, buff).unwrap();
        em.death(Fixed::ONE, &mut b, None).unwrap();

        let rec = replayed(em);
        let unit = &rec.units(Side::Opponent)[&1];
        assert!(unit.is_dead);
        assert_eq!(unit.attack, 15);
        assert!(unit.effects.is_empty());
    }
}
