//! Canonical emitters.
//!
//! Each function here is the only sanctioned way to perform one kind of
//! mutation on a [`UnitState`], and it delivers the matching event in the
//! same step. Emitting onto a dead unit is a no-op that returns `Ok(None)`
//! (or `Ok(false)`): several effects resolving in the same tick may race
//! for a unit that already died.

use std::collections::BTreeSet;

use crate::components::{
    ActiveEffect, ActiveEffectKind, Actor, EffectId, StatKind, UnitId, UnitKey, UnitState,
};
use crate::dispatcher::{Dispatcher, EventSink};
use crate::effects::{DamageType, ValueType};
use crate::error::Result;
use crate::events::{
    AnimationKind, AnimationPayload, CombatEndPayload, CombatEvent, DamageCause, DamagePayload,
    DeathPayload, DotAppliedPayload, EffectAppliedPayload, EffectExpiredPayload, EventPayload,
    HealPayload, ManaCause, ManaPayload, RegenPayload, ShieldPayload, SkillCastPayload,
    SnapshotPayload, StatBuffPayload, StunPayload,
};
use crate::math::{percent_of, Fixed, SimTime};
use crate::simulation::Winner;
use crate::snapshot::SnapshotUnit;
use crate::vitals;

/// Result of one damage application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// HP before the hit.
    pub pre_hp: i32,
    /// HP after the hit.
    pub post_hp: i32,
    /// Damage absorbed by shield.
    pub shield_absorbed: i32,
    /// Whether the hit dropped HP to 0.
    pub killed: bool,
}

/// A stat change to apply through [`Emitter::stat_buff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuffRequest {
    /// Stat to change.
    pub stat: StatKind,
    /// Nominal value, always positive.
    pub value: Fixed,
    /// Flat or percentage of the current value.
    pub value_type: ValueType,
    /// Lower instead of raise. Debuffs are never amplified.
    pub is_debuff: bool,
    /// Seconds until reverted; permanent when absent.
    pub duration: Option<Fixed>,
}

impl BuffRequest {
    /// A permanent positive buff.
    #[must_use]
    pub const fn permanent(stat: StatKind, value: Fixed, value_type: ValueType) -> Self {
        Self {
            stat,
            value,
            value_type,
            is_debuff: false,
            duration: None,
        }
    }
}

fn source_fields(source: Option<&Actor>) -> (Option<UnitId>, Option<String>) {
    source.map_or((None, None), |a| (Some(a.key.id), Some(a.name.clone())))
}

/// Take `amount` out of the unit's shield and its timed layers.
fn absorb_shield(unit: &mut UnitState, amount: i32) -> i32 {
    let mut layers: Vec<i32> = unit
        .effects
        .iter()
        .filter_map(|e| match e.kind {
            ActiveEffectKind::Shield { remaining } => Some(remaining),
            _ => None,
        })
        .collect();
    let absorbed = vitals::absorb_shield(&mut unit.shield, amount, &mut layers);
    let shields = unit.effects.iter_mut().filter_map(|e| match &mut e.kind {
        ActiveEffectKind::Shield { remaining } => Some(remaining),
        _ => None,
    });
    for (remaining, left) in shields.zip(layers) {
        *remaining = left;
    }
    absorbed
}

/// Canonical mutation and event path for one simulation run.
#[derive(Debug)]
pub struct Emitter<S> {
    dispatcher: Dispatcher<S>,
    next_effect_id: EffectId,
    mana_tracked: BTreeSet<UnitKey>,
}

impl<S: EventSink> Emitter<S> {
    /// Create an emitter around a dispatcher.
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self {
            dispatcher,
            next_effect_id: 1,
            mana_tracked: BTreeSet::new(),
        }
    }

    fn allocate_effect_id(&mut self) -> EffectId {
        let id = self.next_effect_id;
        self.next_effect_id += 1;
        id
    }

    // ------------------------------------------------------------------------
    // Damage
    // ------------------------------------------------------------------------

    fn apply_damage(
        attacker: Option<&Actor>,
        target: &mut UnitState,
        amount: i32,
        damage_type: DamageType,
        cause: DamageCause,
    ) -> (DamageOutcome, DamagePayload) {
        let amount = amount.max(0);
        let pre_hp = target.hp;
        let pre_shield = target.shield;
        let shield_absorbed = absorb_shield(target, amount);
        let post_hp = vitals::damaged_hp(pre_hp, amount, shield_absorbed);
        target.hp = post_hp;

        let outcome = DamageOutcome {
            pre_hp,
            post_hp,
            shield_absorbed,
            killed: post_hp == 0,
        };
        let payload = DamagePayload {
            attacker_id: attacker.map(|a| a.key.id),
            attacker_name: attacker.map(|a| a.name.clone()),
            attacker_side: attacker.map(|a| a.key.side),
            target_id: target.id,
            target_name: target.name.clone(),
            side: target.side,
            damage: amount,
            shield_absorbed,
            pre_hp,
            post_hp,
            pre_shield,
            post_shield: target.shield,
            max_hp: target.max_hp,
            damage_type,
            cause,
            is_skill: cause == DamageCause::Skill,
            is_kill: outcome.killed,
            effect_id: None,
            remaining_ticks: None,
        };
        (outcome, payload)
    }

    /// Apply attack or skill damage: shield first, then HP, clamped at 0.
    ///
    /// The caller is responsible for the death event when `killed` is set.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn damage(
        &mut self,
        now: SimTime,
        attacker: Option<&Actor>,
        target: &mut UnitState,
        amount: i32,
        damage_type: DamageType,
        cause: DamageCause,
    ) -> Result<Option<DamageOutcome>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let (outcome, payload) = Self::apply_damage(attacker, target, amount, damage_type, cause);
        self.dispatcher
            .emit(now, EventPayload::UnitAttack(payload))?;
        Ok(Some(outcome))
    }

    /// Tick a damage-over-time effect. The effect is removed, with a
    /// `damage_over_time_expired` event, after its last tick.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses an event.
    pub fn dot_tick(
        &mut self,
        now: SimTime,
        target: &mut UnitState,
        effect_id: EffectId,
    ) -> Result<Option<DamageOutcome>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let Some(index) = target.effects.iter().position(|e| e.effect_id == effect_id) else {
            return Ok(None);
        };
        let ActiveEffectKind::DamageOverTime {
            damage,
            remaining_ticks,
            interval,
            next_tick_at,
        } = &mut target.effects[index].kind
        else {
            return Ok(None);
        };
        let amount = *damage;
        *remaining_ticks = remaining_ticks.saturating_sub(1);
        *next_tick_at = next_tick_at.saturating_add(*interval);
        let remaining = *remaining_ticks;

        let (outcome, mut payload) = Self::apply_damage(
            None,
            target,
            amount,
            DamageType::True,
            DamageCause::DamageOverTime,
        );
        payload.effect_id = Some(effect_id);
        payload.remaining_ticks = Some(remaining);
        self.dispatcher
            .emit(now, EventPayload::DamageOverTimeTick(payload))?;

        if remaining == 0 && !outcome.killed {
            self.expire(now, target, effect_id)?;
        }
        Ok(Some(outcome))
    }

    /// Attach a damage-over-time effect. The first tick lands one interval
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn dot_applied(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        damage: i32,
        ticks: u32,
        interval: Fixed,
    ) -> Result<Option<EffectId>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let effect_id = self.allocate_effect_id();
        let next_tick_at = now.saturating_add(interval);
        target.effects.push(ActiveEffect {
            effect_id,
            kind: ActiveEffectKind::DamageOverTime {
                damage,
                remaining_ticks: ticks,
                interval,
                next_tick_at,
            },
            expires_at: None,
            source: source.map(|a| a.key),
        });
        let (source_id, source_name) = source_fields(source);
        self.dispatcher.emit(
            now,
            EventPayload::DamageOverTimeApplied(DotAppliedPayload {
                effect_id,
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id,
                source_name,
                damage,
                ticks,
                interval,
                next_tick_at,
            }),
        )?;
        Ok(Some(effect_id))
    }

    // ------------------------------------------------------------------------
    // Heal, shield, stats
    // ------------------------------------------------------------------------

    /// Restore HP, clamped at max HP. Returns the HP actually restored.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn heal(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        amount: i32,
    ) -> Result<Option<i32>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let pre_hp = target.hp;
        target.hp = vitals::healed_hp(pre_hp, amount, target.max_hp);
        let restored = target.hp - pre_hp;

        let (source_id, source_name) = source_fields(source);
        self.dispatcher.emit(
            now,
            EventPayload::UnitHeal(HealPayload {
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id,
                source_name,
                amount: restored,
                pre_hp,
                post_hp: target.hp,
                max_hp: target.max_hp,
            }),
        )?;
        Ok(Some(restored))
    }

    /// Add a timed shield layer. Returns the new total shield.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn shield(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        amount: i32,
        duration: Fixed,
    ) -> Result<Option<i32>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let amount = amount.max(0);
        let pre_shield = target.shield;
        target.shield = vitals::added_shield(pre_shield, amount);
        let effect_id = self.allocate_effect_id();
        let expires_at = now.saturating_add(duration);
        target.effects.push(ActiveEffect {
            effect_id,
            kind: ActiveEffectKind::Shield { remaining: amount },
            expires_at: Some(expires_at),
            source: source.map(|a| a.key),
        });

        self.dispatcher.emit(
            now,
            EventPayload::ShieldApplied(ShieldPayload {
                effect_id,
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id: source.map(|a| a.key.id),
                amount,
                pre_shield,
                post_shield: target.shield,
                expires_at,
            }),
        )?;
        Ok(Some(target.shield))
    }

    /// Buff or debuff a stat against its current value. Positive buffs are
    /// multiplied by the unit's buff amplification. Returns the applied
    /// delta, which is what the event carries.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn stat_buff(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        request: BuffRequest,
    ) -> Result<Option<Fixed>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let current = target.stat_value(request.stat);
        let nominal = match request.value_type {
            ValueType::Flat => request.value,
            ValueType::Percentage => percent_of(current, request.value),
        };
        let (signed, amplifier) = if request.is_debuff {
            (nominal.saturating_neg(), Fixed::ONE)
        } else {
            (nominal, target.buff_amplification())
        };
        let (delta, new_value) = target.shift_stat(request.stat, signed.saturating_mul(amplifier));

        let effect_id = self.allocate_effect_id();
        let expires_at = request.duration.map(|d| now.saturating_add(d));
        target.effects.push(ActiveEffect {
            effect_id,
            kind: ActiveEffectKind::StatModifier {
                stat: request.stat,
                delta,
                is_debuff: request.is_debuff,
            },
            expires_at,
            source: source.map(|a| a.key),
        });

        let (source_id, source_name) = source_fields(source);
        self.dispatcher.emit(
            now,
            EventPayload::StatBuff(StatBuffPayload {
                effect_id,
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id,
                source_name,
                stat: request.stat,
                value: request.value,
                value_type: request.value_type,
                amplifier,
                delta,
                new_value,
                is_debuff: request.is_debuff,
                expires_at,
                post_hp: (request.stat == StatKind::MaxHp).then_some(target.hp),
            }),
        )?;
        Ok(Some(delta))
    }

    /// Attach a marker or trigger effect and announce it.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn effect_applied(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        kind: ActiveEffectKind,
        duration: Option<Fixed>,
    ) -> Result<Option<EffectId>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let effect = ActiveEffect {
            effect_id: self.allocate_effect_id(),
            kind,
            expires_at: duration.map(|d| now.saturating_add(d)),
            source: source.map(|a| a.key),
        };
        let view = effect.view();
        target.effects.push(effect);

        self.dispatcher.emit(
            now,
            EventPayload::EffectApplied(EffectAppliedPayload {
                effect_id: view.effect_id,
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id: source.map(|a| a.key.id),
                effect_type: view.kind,
                stat: view.stat,
                value: view.value,
                expires_at: view.expires_at,
            }),
        )?;
        Ok(Some(view.effect_id))
    }

    /// Stun a unit. Overlapping stuns keep the latest end time.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn stun(
        &mut self,
        now: SimTime,
        source: Option<&Actor>,
        target: &mut UnitState,
        duration: Fixed,
    ) -> Result<Option<SimTime>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let effect_id = self.allocate_effect_id();
        let expires_at = now.saturating_add(duration);
        target.effects.push(ActiveEffect {
            effect_id,
            kind: ActiveEffectKind::Stun,
            expires_at: Some(expires_at),
            source: source.map(|a| a.key),
        });
        target.stunned_until = Some(target.stunned_until.map_or(expires_at, |u| u.max(expires_at)));

        self.dispatcher.emit(
            now,
            EventPayload::UnitStunned(StunPayload {
                effect_id,
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                source_id: source.map(|a| a.key.id),
                duration,
                expires_at,
            }),
        )?;
        Ok(Some(expires_at))
    }

    /// Remove an effect and undo what it did: stat changes are reverted and
    /// shield layers take their remaining points with them.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn expire(&mut self, now: SimTime, target: &mut UnitState, effect_id: EffectId) -> Result<bool> {
        if target.is_dead {
            return Ok(false);
        }
        let Some(index) = target.effects.iter().position(|e| e.effect_id == effect_id) else {
            return Ok(false);
        };
        let effect = target.effects.remove(index);
        let mut payload = EffectExpiredPayload {
            effect_id,
            unit_id: target.id,
            unit_name: target.name.clone(),
            side: target.side,
            effect_type: effect.kind.tag().to_string(),
            stat: None,
            reverted_delta: None,
            new_value: None,
            shield_removed: None,
            post_shield: None,
            post_hp: None,
        };

        match effect.kind {
            ActiveEffectKind::StatModifier { stat, delta, .. } => {
                let (reverted, new_value) = target.shift_stat(stat, delta.saturating_neg());
                payload.stat = Some(stat);
                payload.reverted_delta = Some(reverted);
                payload.new_value = Some(new_value);
                if stat == StatKind::MaxHp {
                    payload.post_hp = Some(target.hp);
                }
            }
            ActiveEffectKind::Shield { remaining } => {
                let removed = vitals::expired_shield(target.shield, remaining);
                target.shield -= removed;
                payload.shield_removed = Some(removed);
                payload.post_shield = Some(target.shield);
            }
            ActiveEffectKind::Stun => {
                target.stunned_until = target
                    .effects
                    .iter()
                    .filter(|e| matches!(e.kind, ActiveEffectKind::Stun))
                    .filter_map(|e| e.expires_at)
                    .max();
            }
            _ => {}
        }

        let event = if payload.effect_type == "damage_over_time" {
            EventPayload::DamageOverTimeExpired(payload)
        } else {
            EventPayload::EffectExpired(payload)
        };
        self.dispatcher.emit(now, event)?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Mana
    // ------------------------------------------------------------------------

    /// Set mana to `value`, clamped to the pool. Returns the delta.
    ///
    /// No event is emitted for a zero change on a unit whose mana was never
    /// reported before.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn set_mana(
        &mut self,
        now: SimTime,
        target: &mut UnitState,
        value: i32,
        cause: ManaCause,
    ) -> Result<Option<i32>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let previous_mana = target.mana;
        target.mana = value.clamp(0, target.max_mana.max(0));
        let delta = target.mana - previous_mana;
        let key = target.key();
        if delta == 0 && !self.mana_tracked.contains(&key) {
            return Ok(Some(0));
        }
        self.mana_tracked.insert(key);

        self.dispatcher.emit(
            now,
            EventPayload::ManaUpdate(ManaPayload {
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                mana: target.mana,
                previous_mana,
                delta,
                max_mana: target.max_mana,
                cause,
            }),
        )?;
        Ok(Some(delta))
    }

    /// Add mana through [`Emitter::set_mana`].
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn gain_mana(
        &mut self,
        now: SimTime,
        target: &mut UnitState,
        amount: i32,
        cause: ManaCause,
    ) -> Result<Option<i32>> {
        let value = target.mana.saturating_add(amount);
        self.set_mana(now, target, value, cause)
    }

    /// Per-second mana regeneration. Nothing is emitted when the pool is
    /// full or the unit has no regeneration.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn regen(&mut self, now: SimTime, target: &mut UnitState) -> Result<Option<i32>> {
        if !target.is_alive() {
            return Ok(None);
        }
        let gained = target.stats.mana_regen.min(target.max_mana.saturating_sub(target.mana));
        if gained <= 0 {
            return Ok(None);
        }
        let pre_mana = target.mana;
        target.mana = target.mana.saturating_add(gained);

        self.dispatcher.emit(
            now,
            EventPayload::RegenGain(RegenPayload {
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                mana_gained: gained,
                pre_mana,
                new_mana: target.mana,
                max_mana: target.max_mana,
            }),
        )?;
        Ok(Some(gained))
    }

    // ------------------------------------------------------------------------
    // Lifecycle and announcements
    // ------------------------------------------------------------------------

    /// Flag a unit dead. Happens at most once per unit: HP and shield drop
    /// to 0 and every effect is cleared.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn death(&mut self, now: SimTime, target: &mut UnitState, killer: Option<&Actor>) -> Result<bool> {
        if target.is_dead {
            return Ok(false);
        }
        target.hp = 0;
        target.is_dead = true;
        target.shield = 0;
        target.effects.clear();
        target.stunned_until = None;
        tracing::debug!(unit = %target.key(), name = %target.name, time = %now, "Unit died");

        self.dispatcher.emit(
            now,
            EventPayload::UnitDied(DeathPayload {
                unit_id: target.id,
                unit_name: target.name.clone(),
                side: target.side,
                killer_id: killer.map(|a| a.key.id),
                killer_name: killer.map(|a| a.name.clone()),
                killer_side: killer.map(|a| a.key.side),
            }),
        )?;
        Ok(true)
    }

    fn animation_payload(
        unit: &UnitState,
        animation: AnimationKind,
        target: Option<UnitKey>,
        duration: Fixed,
        impact_at: SimTime,
    ) -> EventPayload {
        EventPayload::AnimationStart(AnimationPayload {
            unit_id: unit.id,
            unit_name: unit.name.clone(),
            side: unit.side,
            animation,
            target_id: target.map(|k| k.id),
            target_side: target.map(|k| k.side),
            duration,
            impact_at,
        })
    }

    /// Announce a windup starting now and landing `duration` later.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn animation_start(
        &mut self,
        now: SimTime,
        unit: &UnitState,
        animation: AnimationKind,
        target: Option<UnitKey>,
        duration: Fixed,
    ) -> Result<u64> {
        let payload = Self::animation_payload(unit, animation, target, duration, now.saturating_add(duration));
        self.dispatcher.emit(now, payload)
    }

    /// Queue an announcement for time `at`. It is delivered right away when
    /// `at` is not in the future.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn schedule_animation(
        &mut self,
        now: SimTime,
        at: SimTime,
        unit: &UnitState,
        animation: AnimationKind,
        target: Option<UnitKey>,
    ) -> Result<Option<u64>> {
        let payload = Self::animation_payload(unit, animation, target, Fixed::ZERO, at);
        self.dispatcher
            .schedule_or_deliver(now, CombatEvent::new(at, payload))
    }

    /// Announce a skill cast.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn skill_cast(
        &mut self,
        now: SimTime,
        caster: &UnitState,
        skill_name: &str,
        target: Option<&Actor>,
    ) -> Result<u64> {
        let (target_id, target_name) = source_fields(target);
        self.dispatcher.emit(
            now,
            EventPayload::SkillCast(SkillCastPayload {
                caster_id: caster.id,
                caster_name: caster.name.clone(),
                side: caster.side,
                skill_name: skill_name.to_string(),
                target_id,
                target_name,
                mana_spent: caster.mana,
            }),
        )
    }

    /// Emit a full snapshot of both teams.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn snapshot(&mut self, now: SimTime, player: &[UnitState], opponent: &[UnitState]) -> Result<u64> {
        self.dispatcher.emit(
            now,
            EventPayload::StateSnapshot(SnapshotPayload {
                player_units: player.iter().map(SnapshotUnit::from_unit).collect(),
                opponent_units: opponent.iter().map(SnapshotUnit::from_unit).collect(),
            }),
        )
    }

    /// Emit the final result.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses the event.
    pub fn combat_end(
        &mut self,
        now: SimTime,
        winner: Winner,
        team_a_survivors: usize,
        team_b_survivors: usize,
    ) -> Result<u64> {
        self.dispatcher.emit(
            now,
            EventPayload::CombatEnd(CombatEndPayload {
                winner,
                duration: now,
                team_a_survivors,
                team_b_survivors,
            }),
        )
    }

    /// Deliver queued announcements due by `now`.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the sink refuses an event.
    pub fn deliver_scheduled(&mut self, now: SimTime) -> Result<usize> {
        self.dispatcher.deliver_scheduled(now)
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Mutable access to the underlying dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<S> {
        &mut self.dispatcher
    }

    /// Unwrap the dispatcher.
    pub fn into_dispatcher(self) -> Dispatcher<S> {
        self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Side, Stats};
    use crate::dispatcher::EventLog;

    fn emitter() -> Emitter<EventLog> {
        Emitter::new(Dispatcher::new(EventLog::new(), 0))
    }

    fn unit(side: Side) -> UnitState {
        UnitState::new(1, "Target", side, 100, Stats::new(10, 0, Fixed::ONE))
    }

    fn events(emitter: Emitter<EventLog>) -> Vec<CombatEvent> {
        emitter.into_dispatcher().into_sink().into_events()
    }

    // ========================================================================
    // Damage
    // ========================================================================

    #[test]
    fn test_shield_absorbs_before_hp() {
        let mut em = emitter();
        let mut target = unit(Side::Opponent).with_shield(10);
        let outcome = em
            .damage(Fixed::ONE, None, &mut target, 25, DamageType::Physical, DamageCause::Attack)
            .unwrap()
            .expect("alive target");
        assert_eq!(outcome.shield_absorbed, 10);
        assert_eq!(outcome.post_hp, outcome.pre_hp - 15);
        assert_eq!(target.shield, 0);

        let events = events(em);
        match &events[0].payload {
            EventPayload::UnitAttack(p) => {
                assert_eq!(p.post_shield, 0);
                assert_eq!(p.damage, 25);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut em = emitter();
        let mut target = unit(Side::Opponent);
        let outcome = em
            .damage(Fixed::ZERO, None, &mut target, 500, DamageType::Magic, DamageCause::Skill)
            .unwrap()
            .expect("alive target");
        assert_eq!(outcome.post_hp, 0);
        assert!(outcome.killed);
        assert_eq!(target.hp, 0);
    }

    #[test]
    fn test_dead_target_is_a_no_op() {
        let mut em = emitter();
        let mut target = unit(Side::Opponent);
        assert!(em.death(Fixed::ZERO, &mut target, None).unwrap());
        let before = target.clone();

        let t = Fixed::ONE;
        assert_eq!(
            em.damage(t, None, &mut target, 5, DamageType::Physical, DamageCause::Attack)
                .unwrap(),
            None
        );
        assert_eq!(em.heal(t, None, &mut target, 5).unwrap(), None);
        assert_eq!(em.dot_tick(t, &mut target, 1).unwrap(), None);
        let buff = BuffRequest::permanent(StatKind::Attack, Fixed::from_num(5), ValueType::Flat);
        assert_eq!(em.stat_buff(t, None, &mut target, buff).unwrap(), None);
        assert!(!em.death(t, &mut target, None).unwrap());

        assert_eq!(target, before);
        assert_eq!(events(em).len(), 1);
    }

    #[test]
    fn test_shield_layers_consumed_oldest_first() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        em.shield(Fixed::ZERO, None, &mut target, 10, Fixed::from_num(5)).unwrap();
        em.shield(Fixed::ZERO, None, &mut target, 10, Fixed::from_num(5)).unwrap();
        em.damage(Fixed::ONE, None, &mut target, 15, DamageType::Physical, DamageCause::Attack)
            .unwrap();
        let remaining: Vec<i32> = target
            .effects
            .iter()
            .filter_map(|e| match e.kind {
                ActiveEffectKind::Shield { remaining } => Some(remaining),
                _ => None,
            })
            .collect();
        assert_eq!(remaining, vec![0, 5]);
        assert_eq!(target.shield, 5);
    }

    #[test]
    fn test_dot_ticks_then_expires() {
        let mut em = emitter();
        let mut target = unit(Side::Opponent);
        let id = em
            .dot_applied(Fixed::ZERO, None, &mut target, 4, 2, Fixed::ONE)
            .unwrap()
            .expect("alive");
        em.dot_tick(Fixed::ONE, &mut target, id).unwrap();
        em.dot_tick(Fixed::from_num(2), &mut target, id).unwrap();
        assert_eq!(target.hp, 92);
        assert!(target.effects.is_empty());

        let types: Vec<_> = events(em).iter().map(CombatEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "damage_over_time_applied",
                "damage_over_time_tick",
                "damage_over_time_tick",
                "damage_over_time_expired",
            ]
        );
    }

    // ========================================================================
    // Heal and stats
    // ========================================================================

    #[test]
    fn test_heal_clamps_at_max() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        target.hp = 95;
        assert_eq!(em.heal(Fixed::ZERO, None, &mut target, 20).unwrap(), Some(5));
        assert_eq!(target.hp, 100);
    }

    #[test]
    fn test_amplified_buff_reports_applied_delta() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        em.effect_applied(
            Fixed::ZERO,
            None,
            &mut target,
            ActiveEffectKind::BuffAmplifier {
                multiplier: Fixed::from_num(2),
            },
            None,
        )
        .unwrap();
        let buff = BuffRequest::permanent(StatKind::Attack, Fixed::from_num(5), ValueType::Flat);
        let delta = em.stat_buff(Fixed::ZERO, None, &mut target, buff).unwrap();
        assert_eq!(delta, Some(Fixed::from_num(10)));
        assert_eq!(target.stats.attack, 20);
    }

    #[test]
    fn test_percentage_buff_uses_current_value_and_reverts() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        let first = BuffRequest::permanent(StatKind::Attack, Fixed::from_num(10), ValueType::Flat);
        em.stat_buff(Fixed::ZERO, None, &mut target, first).unwrap();

        let timed = BuffRequest {
            duration: Some(Fixed::from_num(3)),
            ..BuffRequest::permanent(StatKind::Attack, Fixed::from_num(50), ValueType::Percentage)
        };
        let delta = em.stat_buff(Fixed::ZERO, None, &mut target, timed).unwrap();
        assert_eq!(delta, Some(Fixed::from_num(10)));
        assert_eq!(target.stats.attack, 30);

        let timed_id = target.effects[1].effect_id;
        assert!(em.expire(Fixed::from_num(3), &mut target, timed_id).unwrap());
        assert_eq!(target.stats.attack, 20);
    }

    #[test]
    fn test_debuff_is_not_amplified() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        em.effect_applied(
            Fixed::ZERO,
            None,
            &mut target,
            ActiveEffectKind::BuffAmplifier {
                multiplier: Fixed::from_num(3),
            },
            None,
        )
        .unwrap();
        let debuff = BuffRequest {
            is_debuff: true,
            ..BuffRequest::permanent(StatKind::Attack, Fixed::from_num(4), ValueType::Flat)
        };
        let delta = em.stat_buff(Fixed::ZERO, None, &mut target, debuff).unwrap();
        assert_eq!(delta, Some(Fixed::from_num(-4)));
    }

    #[test]
    fn test_shield_expiry_removes_remaining_points() {
        let mut em = emitter();
        let mut target = unit(Side::Player).with_shield(5);
        em.shield(Fixed::ZERO, None, &mut target, 10, Fixed::from_num(2)).unwrap();
        let id = target.effects[0].effect_id;
        assert!(em.expire(Fixed::from_num(2), &mut target, id).unwrap());
        assert_eq!(target.shield, 5);
    }

    // ========================================================================
    // Mana
    // ========================================================================

    #[test]
    fn test_mana_zero_delta_suppressed_until_tracked() {
        let mut em = emitter();
        let mut target = unit(Side::Player);
        assert_eq!(
            em.set_mana(Fixed::ZERO, &mut target, 0, ManaCause::Attack).unwrap(),
            Some(0)
        );
        em.gain_mana(Fixed::ZERO, &mut target, 10, ManaCause::Attack).unwrap();
        em.gain_mana(Fixed::ZERO, &mut target, 0, ManaCause::Attack).unwrap();

        let events = events(em);
        assert_eq!(events.len(), 2);
        match &events[0].payload {
            EventPayload::ManaUpdate(p) => {
                assert_eq!((p.previous_mana, p.mana, p.delta), (0, 10, 10));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mana_clamped_to_pool() {
        let mut em = emitter();
        let mut target = unit(Side::Player).with_mana(90, 100);
        assert_eq!(
            em.gain_mana(Fixed::ZERO, &mut target, 25, ManaCause::Attack).unwrap(),
            Some(10)
        );
        assert_eq!(target.mana, 100);
    }

    #[test]
    fn test_regen_skips_full_pool() {
        let mut em = emitter();
        let mut target = UnitState::new(
            1,
            "Mage",
            Side::Player,
            50,
            Stats::new(5, 0, Fixed::ONE).with_mana_gain(0, 10),
        )
        .with_mana(95, 100);
        assert_eq!(em.regen(Fixed::ONE, &mut target).unwrap(), Some(5));
        assert_eq!(em.regen(Fixed::from_num(2), &mut target).unwrap(), None);
    }

    #[test]
    fn test_stun_and_expiry() {
        let mut em = emitter();
        let mut target = unit(Side::Opponent);
        em.stun(Fixed::ZERO, None, &mut target, Fixed::from_num(2)).unwrap();
        assert!(target.is_stunned(Fixed::ONE));
        let id = target.effects[0].effect_id;
        em.expire(Fixed::from_num(2), &mut target, id).unwrap();
        assert_eq!(target.stunned_until, None);
    }
}
