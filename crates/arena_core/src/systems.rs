//! Combat systems.
//!
//! Each system resolves one part of a tick against the shared [`Battle`]
//! state. Systems never touch unit vitals directly: every mutation goes
//! through the [`Emitter`]. Units are always visited team A first, in list
//! order, then team B.

use std::collections::VecDeque;

use rand::Rng;

use crate::combat::{backline_target, first_alive, lowest_hp, physical_damage, random_alive, select_target};
use crate::components::{ActiveEffectKind, Actor, EffectId, Side, Teams, UnitKey, UnitState};
use crate::dispatcher::{EventSink, TimedQueue};
use crate::effects::{DamageType, EffectContext, EffectOutcome, EffectSpec, EffectTarget};
use crate::emit::{BuffRequest, Emitter};
use crate::error::Result;
use crate::events::{AnimationKind, DamageCause, ManaCause};
use crate::math::{Fixed, SimTime};

/// Work scheduled for a later tick.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingAction {
    /// An attack whose windup started earlier.
    Hit {
        /// Attacking unit.
        attacker: UnitKey,
        /// Target chosen when the windup started.
        target: UnitKey,
    },
    /// Effects of a `delay`.
    Delayed {
        /// Unit that cast the delay.
        caster: UnitKey,
        /// Caster's target at cast time.
        target: Option<UnitKey>,
        /// Effects to resolve.
        effects: Vec<EffectSpec>,
    },
}

#[derive(Debug, Clone, Copy)]
struct DeathRecord {
    victim: UnitKey,
    killer: Option<UnitKey>,
}

/// Mutable state of one fight, shared by all systems.
pub(crate) struct Battle<S, R> {
    pub teams: Teams,
    pub emitter: Emitter<S>,
    pub rng: R,
    pub pending: TimedQueue<PendingAction>,
    pub log: Vec<String>,
    pub hit_delay: Fixed,
    deaths: VecDeque<DeathRecord>,
}

impl<S: EventSink, R: Rng> Battle<S, R> {
    pub fn new(teams: Teams, emitter: Emitter<S>, rng: R, hit_delay: Fixed) -> Self {
        Self {
            teams,
            emitter,
            rng,
            pending: TimedQueue::new(),
            log: Vec::new(),
            hit_delay,
            deaths: VecDeque::new(),
        }
    }

    fn actor(&self, key: UnitKey) -> Option<Actor> {
        self.teams.get(key).map(UnitState::actor)
    }

    fn default_target(&self, key: UnitKey) -> Option<UnitKey> {
        let unit = self.teams.get(key)?;
        let enemies = self.teams.side(key.side.opposite());
        select_target(unit, enemies).map(|index| enemies[index].key())
    }

    fn push_log(&mut self, now: SimTime, line: String) {
        self.log
            .push(format!("[{:>6.2}s] {line}", now.to_num::<f64>()));
    }

    // ========================================================================
    // Effect resolution
    // ========================================================================

    fn recipients(&mut self, caster: UnitKey, current: Option<UnitKey>, target: EffectTarget) -> Vec<UnitKey> {
        let Some(caster_unit) = self.teams.get(caster) else {
            return Vec::new();
        };
        let allies = self.teams.side(caster.side);
        let enemies = self.teams.side(caster.side.opposite());
        let alive_keys = |units: &[UnitState]| -> Vec<UnitKey> {
            units
                .iter()
                .filter(|u| u.is_alive())
                .map(UnitState::key)
                .collect()
        };

        let index_in = |units: &[UnitState], index: Option<usize>| -> Vec<UnitKey> {
            index.map(|i| units[i].key()).into_iter().collect()
        };

        match target {
            EffectTarget::Caster => {
                if caster_unit.is_alive() {
                    vec![caster]
                } else {
                    Vec::new()
                }
            }
            EffectTarget::CurrentTarget => {
                let still_alive = current.filter(|key| self.teams.get(*key).is_some_and(UnitState::is_alive));
                match still_alive {
                    Some(key) => vec![key],
                    None => index_in(enemies, select_target(caster_unit, enemies)),
                }
            }
            EffectTarget::AllAllies => alive_keys(allies),
            EffectTarget::AllEnemies => alive_keys(enemies),
            EffectTarget::LowestHpAlly => index_in(allies, lowest_hp(allies)),
            EffectTarget::RandomEnemy => index_in(enemies, random_alive(enemies, &mut self.rng)),
            EffectTarget::BacklineEnemy => {
                index_in(enemies, backline_target(enemies).or_else(|| first_alive(enemies)))
            }
        }
    }

    /// Resolve effects in order with `caster` as the source.
    pub fn resolve_effects(
        &mut self,
        now: SimTime,
        caster: UnitKey,
        current: Option<UnitKey>,
        effects: &[EffectSpec],
        context: EffectContext,
    ) -> Result<()> {
        for spec in effects {
            let outcome = self.resolve_effect(now, caster, current, spec, context)?;
            match outcome {
                EffectOutcome::Unsupported { reason } => {
                    tracing::warn!(caster = %caster, effect = spec.kind_name(), ?context, reason, "Effect skipped");
                }
                _ => {
                    tracing::debug!(caster = %caster, effect = spec.kind_name(), ?context, ?outcome, "Effect resolved");
                }
            }
        }
        Ok(())
    }

    /// Resolve one effect.
    pub fn resolve_effect(
        &mut self,
        now: SimTime,
        caster: UnitKey,
        current: Option<UnitKey>,
        spec: &EffectSpec,
        context: EffectContext,
    ) -> Result<EffectOutcome> {
        let Some(source) = self.teams.get(caster).filter(|u| u.is_alive()).map(UnitState::actor) else {
            return Ok(EffectOutcome::NoTarget);
        };

        let marker = match spec {
            EffectSpec::Delay { seconds, effects } => {
                let at = now.saturating_add(*seconds);
                if let Some(unit) = self.teams.get(caster) {
                    self.emitter
                        .schedule_animation(now, at, unit, AnimationKind::DelayedEffect, current)?;
                }
                self.pending.push(
                    at,
                    PendingAction::Delayed {
                        caster,
                        target: current,
                        effects: effects.clone(),
                    },
                );
                return Ok(EffectOutcome::Applied { recipients: 1 });
            }
            EffectSpec::TargetBackline { duration } => Some((ActiveEffectKind::TargetBackline, *duration)),
            EffectSpec::OnEnemyDeath { effects } => {
                Some((ActiveEffectKind::OnEnemyDeath { effects: effects.clone() }, None))
            }
            EffectSpec::OnAllyDeath { effects } => {
                Some((ActiveEffectKind::OnAllyDeath { effects: effects.clone() }, None))
            }
            EffectSpec::KillBuff {
                stat,
                value,
                value_type,
            } => Some((
                ActiveEffectKind::KillBuff {
                    stat: *stat,
                    value: *value,
                    value_type: *value_type,
                },
                None,
            )),
            _ => None,
        };

        if let Some((kind, duration)) = marker {
            if context == EffectContext::Trigger && spec.registers_trigger() {
                return Ok(EffectOutcome::Unsupported {
                    reason: "death triggers cannot register further triggers",
                });
            }
            let Some(unit) = self.teams.get_mut(caster) else {
                return Ok(EffectOutcome::NoTarget);
            };
            return Ok(match self.emitter.effect_applied(now, Some(&source), unit, kind, duration)? {
                Some(_) => EffectOutcome::Applied { recipients: 1 },
                None => EffectOutcome::NoTarget,
            });
        }

        let Some(selector) = spec.target() else {
            return Ok(EffectOutcome::Unsupported {
                reason: "effect has no recipients",
            });
        };
        let recipients = self.recipients(caster, current, selector);
        if recipients.is_empty() {
            return Ok(EffectOutcome::NoTarget);
        }
        let mut applied = 0;
        for key in recipients {
            if self.apply_to(now, &source, key, spec)? {
                applied += 1;
            }
        }
        Ok(EffectOutcome::Applied { recipients: applied })
    }

    fn apply_to(&mut self, now: SimTime, source: &Actor, key: UnitKey, spec: &EffectSpec) -> Result<bool> {
        let dead_enemies = match spec {
            EffectSpec::DynamicScaling { .. } => self
                .teams
                .side(source.key.side.opposite())
                .iter()
                .filter(|u| !u.is_alive())
                .count(),
            _ => 0,
        };
        let Some(target) = self.teams.get_mut(key) else {
            return Ok(false);
        };
        let source_ref = Some(source);

        let landed = match spec {
            EffectSpec::Damage { amount, .. } => {
                let outcome = self.emitter.damage(
                    now,
                    source_ref,
                    target,
                    *amount,
                    DamageType::Magic,
                    DamageCause::Skill,
                )?;
                if outcome.is_some_and(|o| o.killed) {
                    self.deaths.push_back(DeathRecord {
                        victim: key,
                        killer: Some(source.key),
                    });
                }
                outcome.is_some()
            }
            EffectSpec::Heal { amount, .. } => self.emitter.heal(now, source_ref, target, *amount)?.is_some(),
            EffectSpec::Shield {
                amount, duration, ..
            } => self
                .emitter
                .shield(now, source_ref, target, *amount, *duration)?
                .is_some(),
            EffectSpec::Buff {
                stat,
                value,
                value_type,
                duration,
                ..
            }
            | EffectSpec::Debuff {
                stat,
                value,
                value_type,
                duration,
                ..
            } => {
                let request = BuffRequest {
                    stat: *stat,
                    value: *value,
                    value_type: *value_type,
                    is_debuff: matches!(spec, EffectSpec::Debuff { .. }),
                    duration: *duration,
                };
                self.emitter
                    .stat_buff(now, source_ref, target, request)?
                    .is_some()
            }
            EffectSpec::PerSecondBuff {
                stat,
                value,
                value_type,
                duration,
                ..
            } => {
                let kind = ActiveEffectKind::PerSecondBuff {
                    stat: *stat,
                    value: *value,
                    value_type: *value_type,
                };
                self.emitter
                    .effect_applied(now, source_ref, target, kind, *duration)?
                    .is_some()
            }
            EffectSpec::DamageOverTime {
                damage,
                ticks,
                interval,
                ..
            } => self
                .emitter
                .dot_applied(now, source_ref, target, *damage, *ticks, *interval)?
                .is_some(),
            EffectSpec::Stun { duration, .. } => self
                .emitter
                .stun(now, source_ref, target, *duration)?
                .is_some(),
            EffectSpec::BuffAmplifier {
                multiplier,
                duration,
                ..
            } => {
                let kind = ActiveEffectKind::BuffAmplifier {
                    multiplier: *multiplier,
                };
                self.emitter
                    .effect_applied(now, source_ref, target, kind, *duration)?
                    .is_some()
            }
            EffectSpec::ManaGain { amount, .. } => self
                .emitter
                .gain_mana(now, target, *amount, ManaCause::Effect)?
                .is_some(),
            EffectSpec::DynamicScaling {
                stat,
                value,
                value_type,
                ..
            } => {
                if dead_enemies == 0 {
                    return Ok(false);
                }
                let scaled = value.saturating_mul(Fixed::saturating_from_num(dead_enemies));
                let request = BuffRequest::permanent(*stat, scaled, *value_type);
                self.emitter
                    .stat_buff(now, source_ref, target, request)?
                    .is_some()
            }
            EffectSpec::Delay { .. }
            | EffectSpec::TargetBackline { .. }
            | EffectSpec::OnEnemyDeath { .. }
            | EffectSpec::OnAllyDeath { .. }
            | EffectSpec::KillBuff { .. } => false,
        };
        Ok(landed)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Apply every unit's passives at combat start.
    pub fn apply_passives(&mut self, now: SimTime) -> Result<()> {
        for key in self.teams.keys() {
            let Some(unit) = self.teams.get(key) else {
                continue;
            };
            if unit.passives.is_empty() {
                continue;
            }
            let passives = unit.passives.clone();
            let target = self.default_target(key);
            self.resolve_effects(now, key, target, &passives, EffectContext::Passive)?;
        }
        self.process_deaths(now)
    }

    /// Let a unit act: cast its skill when mana is full, otherwise start an
    /// attack. Returns `false` if the unit could not act.
    pub fn act(&mut self, now: SimTime, key: UnitKey) -> Result<bool> {
        let Some(unit) = self.teams.get(key) else {
            return Ok(false);
        };
        if !unit.is_alive() || unit.is_stunned(now) {
            return Ok(false);
        }
        let acted = if unit.skill.is_some() && unit.mana >= unit.max_mana {
            self.cast_skill(now, key)?;
            true
        } else {
            self.start_attack(now, key)?
        };
        self.process_deaths(now)?;
        Ok(acted)
    }

    fn start_attack(&mut self, now: SimTime, key: UnitKey) -> Result<bool> {
        let Some(target) = self.default_target(key) else {
            return Ok(false);
        };
        if let Some(attacker) = self.teams.get(key) {
            self.emitter
                .animation_start(now, attacker, AnimationKind::Attack, Some(target), self.hit_delay)?;
        }
        if self.hit_delay <= Fixed::ZERO {
            self.resolve_hit(now, key, target)?;
        } else {
            self.pending.push(
                now.saturating_add(self.hit_delay),
                PendingAction::Hit {
                    attacker: key,
                    target,
                },
            );
        }
        Ok(true)
    }

    fn resolve_hit(&mut self, now: SimTime, attacker_key: UnitKey, target_key: UnitKey) -> Result<()> {
        let Some(attacker) = self.teams.get(attacker_key) else {
            return Ok(());
        };
        if !attacker.is_alive() || attacker.is_stunned(now) {
            tracing::trace!(attacker = %attacker_key, "Attack cancelled");
            return Ok(());
        }
        let actor = attacker.actor();
        let attack = attacker.stats.attack;
        let mana_gain = attacker.stats.mana_on_attack;

        let Some(target) = self.teams.get_mut(target_key) else {
            return Ok(());
        };
        if !target.is_alive() {
            return Ok(());
        }
        let amount = physical_damage(attack, target.stats.defense, &mut self.rng);
        let Some(outcome) = self.emitter.damage(
            now,
            Some(&actor),
            target,
            amount,
            DamageType::Physical,
            DamageCause::Attack,
        )?
        else {
            return Ok(());
        };
        let line = format!(
            "{} hits {} for {} ({}/{})",
            actor.name, target.name, amount, outcome.post_hp, target.max_hp
        );
        tracing::debug!(attacker = %attacker_key, target = %target_key, damage = amount, post_hp = outcome.post_hp, "Attack landed");
        if outcome.killed {
            self.deaths.push_back(DeathRecord {
                victim: target_key,
                killer: Some(attacker_key),
            });
        }
        self.push_log(now, line);

        if mana_gain > 0 {
            if let Some(attacker) = self.teams.get_mut(attacker_key) {
                self.emitter
                    .gain_mana(now, attacker, mana_gain, ManaCause::Attack)?;
            }
        }
        Ok(())
    }

    fn cast_skill(&mut self, now: SimTime, key: UnitKey) -> Result<()> {
        let Some(skill) = self.teams.get(key).and_then(|u| u.skill.clone()) else {
            return Ok(());
        };
        let target = self.default_target(key);
        let target_actor = target.and_then(|k| self.actor(k));

        if let Some(caster) = self.teams.get(key) {
            self.emitter
                .skill_cast(now, caster, &skill.name, target_actor.as_ref())?;
            let line = format!("{} casts {}", caster.name, skill.name);
            self.push_log(now, line);
        }
        if let Some(caster) = self.teams.get_mut(key) {
            self.emitter.set_mana(now, caster, 0, ManaCause::SkillCast)?;
        }
        if let Some(caster) = self.teams.get(key) {
            self.emitter
                .animation_start(now, caster, AnimationKind::Skill, target, Fixed::ZERO)?;
        }
        tracing::debug!(caster = %key, skill = %skill.name, "Skill cast");
        self.resolve_effects(now, key, target, &skill.effects, EffectContext::Skill)
    }

    /// Resolve attack hits and delayed effects that are due.
    pub fn resolve_pending(&mut self, now: SimTime) -> Result<usize> {
        let mut resolved = 0;
        while let Some((_, action)) = self.pending.pop_due(now) {
            match action {
                PendingAction::Hit { attacker, target } => self.resolve_hit(now, attacker, target)?,
                PendingAction::Delayed {
                    caster,
                    target,
                    effects,
                } => self.resolve_effects(now, caster, target, &effects, EffectContext::Delayed)?,
            }
            self.process_deaths(now)?;
            resolved += 1;
        }
        Ok(resolved)
    }

    // ========================================================================
    // Periodic processing
    // ========================================================================

    /// Remove effects whose expiry time has come.
    pub fn expire_effects(&mut self, now: SimTime) -> Result<usize> {
        let mut expired = 0;
        for key in self.teams.keys() {
            let Some(unit) = self.teams.get_mut(key) else {
                continue;
            };
            let due: Vec<EffectId> = unit
                .effects
                .iter()
                .filter(|e| e.expires_at.is_some_and(|at| at <= now))
                .map(|e| e.effect_id)
                .collect();
            for effect_id in due {
                if self.emitter.expire(now, unit, effect_id)? {
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    /// Tick every damage-over-time effect whose next tick is due.
    pub fn tick_damage_over_time(&mut self, now: SimTime) -> Result<usize> {
        let mut ticks = 0;
        for key in self.teams.keys() {
            loop {
                let Some(unit) = self.teams.get_mut(key) else {
                    break;
                };
                let due = unit.effects.iter().find_map(|e| match e.kind {
                    ActiveEffectKind::DamageOverTime { next_tick_at, .. } if next_tick_at <= now => {
                        Some((e.effect_id, e.source))
                    }
                    _ => None,
                });
                let Some((effect_id, source)) = due else {
                    break;
                };
                let Some(outcome) = self.emitter.dot_tick(now, unit, effect_id)? else {
                    break;
                };
                ticks += 1;
                if outcome.killed {
                    self.deaths.push_back(DeathRecord {
                        victim: key,
                        killer: source,
                    });
                    break;
                }
            }
        }
        self.process_deaths(now)?;
        Ok(ticks)
    }

    /// Once-per-second processing: per-second buffs, then mana regeneration.
    pub fn per_second(&mut self, now: SimTime, buffs: bool, regen: bool) -> Result<()> {
        for key in self.teams.keys() {
            if buffs {
                let grants: Vec<(BuffRequest, Option<UnitKey>)> = self
                    .teams
                    .get(key)
                    .filter(|u| u.is_alive())
                    .map(|u| {
                        u.effects
                            .iter()
                            .filter_map(|e| match e.kind {
                                ActiveEffectKind::PerSecondBuff {
                                    stat,
                                    value,
                                    value_type,
                                } => Some((BuffRequest::permanent(stat, value, value_type), e.source)),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                for (request, source) in grants {
                    let source = source.and_then(|k| self.actor(k));
                    if let Some(unit) = self.teams.get_mut(key) {
                        self.emitter
                            .stat_buff(now, source.as_ref(), unit, request)?;
                    }
                }
            }
            if regen {
                if let Some(unit) = self.teams.get_mut(key) {
                    self.emitter.regen(now, unit)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Deaths
    // ========================================================================

    /// Emit queued deaths and resolve their triggers. Deaths caused by
    /// triggers join the queue and resolve in order.
    pub fn process_deaths(&mut self, now: SimTime) -> Result<()> {
        while let Some(record) = self.deaths.pop_front() {
            let killer = record.killer.and_then(|k| self.actor(k));
            let Some(victim) = self.teams.get_mut(record.victim) else {
                continue;
            };
            if !self.emitter.death(now, victim, killer.as_ref())? {
                continue;
            }
            let line = match &killer {
                Some(k) => format!("{} is defeated by {}", victim.name, k.name),
                None => format!("{} is defeated", victim.name),
            };
            self.push_log(now, line);
            self.fire_death_triggers(now, record)?;
        }
        Ok(())
    }

    fn fire_death_triggers(&mut self, now: SimTime, record: DeathRecord) -> Result<()> {
        let victim_side = record.victim.side;
        let mut triggered: Vec<(UnitKey, Vec<EffectSpec>)> = Vec::new();
        let collect = |side: Side, enemy_death: bool, out: &mut Vec<(UnitKey, Vec<EffectSpec>)>| {
            for unit in self.teams.side(side).iter().filter(|u| u.is_alive()) {
                for effect in &unit.effects {
                    match &effect.kind {
                        ActiveEffectKind::OnEnemyDeath { effects } if enemy_death => {
                            out.push((unit.key(), effects.clone()));
                        }
                        ActiveEffectKind::OnAllyDeath { effects } if !enemy_death => {
                            out.push((unit.key(), effects.clone()));
                        }
                        _ => {}
                    }
                }
            }
        };
        collect(victim_side.opposite(), true, &mut triggered);
        collect(victim_side, false, &mut triggered);

        for (caster, effects) in triggered {
            let target = self.default_target(caster);
            self.resolve_effects(now, caster, target, &effects, EffectContext::Trigger)?;
        }

        let Some(killer) = record.killer else {
            return Ok(());
        };
        let Some(killer_unit) = self.teams.get(killer).filter(|u| u.is_alive()) else {
            return Ok(());
        };
        let actor = killer_unit.actor();
        let buffs: Vec<BuffRequest> = killer_unit
            .effects
            .iter()
            .filter_map(|e| match e.kind {
                ActiveEffectKind::KillBuff {
                    stat,
                    value,
                    value_type,
                } => Some(BuffRequest::permanent(stat, value, value_type)),
                _ => None,
            })
            .collect();
        for request in buffs {
            if let Some(unit) = self.teams.get_mut(killer) {
                self.emitter.stat_buff(now, Some(&actor), unit, request)?;
            }
        }
        Ok(())
    }
}
