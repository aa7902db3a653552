//! HP, shield and stat arithmetic shared by the emitters and the
//! reconstructor.
//!
//! Every operation saturates at the `i32`/[`Fixed`] bounds, so a valid but
//! extreme unit (a compounding percentage buff, a heal of `i32::MAX`) never
//! panics, and replaying its events lands on the same values.

use crate::components::StatKind;
use crate::math::{round_to_i32, Fixed};

/// HP after a heal, clamped at `max_hp`.
pub(crate) fn healed_hp(hp: i32, amount: i32, max_hp: i32) -> i32 {
    hp.saturating_add(amount.max(0)).min(max_hp)
}

/// HP after the part of a hit the shield did not absorb.
pub(crate) fn damaged_hp(hp: i32, amount: i32, shield_absorbed: i32) -> i32 {
    hp.saturating_sub(amount.saturating_sub(shield_absorbed).max(0)).max(0)
}

/// Shield after adding a layer.
pub(crate) fn added_shield(shield: i32, amount: i32) -> i32 {
    shield.saturating_add(amount.max(0))
}

/// Take `amount` out of `shield`. The untimed part of the shield goes
/// first, then `layers` oldest first. Returns the amount absorbed.
pub(crate) fn absorb_shield(shield: &mut i32, amount: i32, layers: &mut [i32]) -> i32 {
    let absorbed = amount.min(*shield).max(0);
    if absorbed == 0 {
        return 0;
    }
    let layered = layers.iter().fold(0i32, |acc, layer| acc.saturating_add(*layer));
    let untimed = shield.saturating_sub(layered).max(0);
    let mut left = absorbed - untimed.min(absorbed);
    for layer in layers.iter_mut() {
        if left == 0 {
            break;
        }
        let take = left.min(*layer).max(0);
        *layer -= take;
        left -= take;
    }
    *shield -= absorbed;
    absorbed
}

/// Shield points removed when a layer with `remaining` points expires.
pub(crate) fn expired_shield(shield: i32, remaining: i32) -> i32 {
    remaining.min(shield).max(0)
}

/// Borrowed stat fields of one unit, simulated or reconstructed.
pub(crate) struct StatSlots<'a> {
    pub hp: &'a mut i32,
    pub max_hp: &'a mut i32,
    pub attack: &'a mut i32,
    pub defense: &'a mut i32,
    pub attack_speed: &'a mut Fixed,
    pub mana_regen: &'a mut i32,
}

impl StatSlots<'_> {
    /// Add `delta` to a stat and return `(applied_delta, new_value)`.
    ///
    /// Integral stats round the delta half away from zero. `max_hp` never
    /// drops below 1; raising it heals by the same amount and lowering it
    /// clamps `hp`. The applied delta is what actually changed, so
    /// reverting it restores the old value even after saturation.
    pub(crate) fn shift(self, stat: StatKind, delta: Fixed) -> (Fixed, Fixed) {
        match stat {
            StatKind::AttackSpeed => {
                let before = *self.attack_speed;
                *self.attack_speed = before.saturating_add(delta);
                (self.attack_speed.saturating_sub(before), *self.attack_speed)
            }
            StatKind::MaxHp => {
                let before = *self.max_hp;
                *self.max_hp = before.saturating_add(round_to_i32(delta)).max(1);
                let applied = self.max_hp.saturating_sub(before);
                if applied > 0 {
                    *self.hp = self.hp.saturating_add(applied);
                }
                *self.hp = (*self.hp).min(*self.max_hp);
                (Fixed::from_num(applied), Fixed::from_num(*self.max_hp))
            }
            StatKind::Attack | StatKind::Defense | StatKind::ManaRegen => {
                let slot = match stat {
                    StatKind::Attack => self.attack,
                    StatKind::Defense => self.defense,
                    _ => self.mana_regen,
                };
                let before = *slot;
                *slot = before.saturating_add(round_to_i32(delta));
                (Fixed::from_num(slot.saturating_sub(before)), Fixed::from_num(*slot))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heal_saturates_and_clamps() {
        assert_eq!(healed_hp(40, i32::MAX, 100), 100);
        assert_eq!(healed_hp(40, -5, 100), 40);
    }

    #[test]
    fn test_damage_never_goes_negative() {
        assert_eq!(damaged_hp(30, i32::MAX, 0), 0);
        assert_eq!(damaged_hp(30, 25, 10), 15);
    }

    #[test]
    fn test_absorb_untimed_then_layers() {
        let mut shield = 30;
        let mut layers = [10, 15];
        assert_eq!(absorb_shield(&mut shield, 12, &mut layers), 12);
        assert_eq!(shield, 18);
        assert_eq!(layers, [3, 15]);

        assert_eq!(absorb_shield(&mut shield, 100, &mut layers), 18);
        assert_eq!(shield, 0);
        assert_eq!(layers, [0, 0]);
    }

    #[test]
    fn test_huge_shield_stack_saturates() {
        assert_eq!(added_shield(i32::MAX - 1, i32::MAX), i32::MAX);
        let mut shield = i32::MAX;
        let mut layers = [i32::MAX, i32::MAX];
        assert_eq!(absorb_shield(&mut shield, 10, &mut layers), 10);
        assert_eq!(shield, i32::MAX - 10);
    }

    fn slots<'a>(values: &'a mut (i32, i32, i32, i32, Fixed, i32)) -> StatSlots<'a> {
        let (hp, max_hp, attack, defense, attack_speed, mana_regen) = values;
        StatSlots {
            hp,
            max_hp,
            attack,
            defense,
            attack_speed,
            mana_regen,
        }
    }

    #[test]
    fn test_saturated_shift_reports_actual_change() {
        let mut values = (10, 10, 5, i32::MAX - 3, Fixed::ONE, 0);
        let (applied, new_value) = slots(&mut values).shift(StatKind::Defense, Fixed::from_num(1000));
        assert_eq!(applied, Fixed::from_num(3));
        assert_eq!(new_value, Fixed::from_num(i32::MAX));

        let (reverted, _) = slots(&mut values).shift(StatKind::Defense, -applied);
        assert_eq!(reverted, Fixed::from_num(-3));
        assert_eq!(values.3, i32::MAX - 3);
    }

    #[test]
    fn test_max_hp_shift_heals_and_clamps() {
        let mut values = (50, 100, 0, 0, Fixed::ONE, 0);
        slots(&mut values).shift(StatKind::MaxHp, Fixed::from_num(20));
        assert_eq!((values.0, values.1), (70, 120));
        let (applied, _) = slots(&mut values).shift(StatKind::MaxHp, Fixed::from_num(-500));
        assert_eq!(applied, Fixed::from_num(-119));
        assert_eq!((values.0, values.1), (1, 1));
    }

    #[test]
    fn test_attack_speed_saturates() {
        let mut values = (1, 1, 0, 0, Fixed::MAX - Fixed::ONE, 0);
        let (applied, new_value) = slots(&mut values).shift(StatKind::AttackSpeed, Fixed::from_num(5));
        assert_eq!(new_value, Fixed::MAX);
        assert_eq!(applied, Fixed::ONE);
    }
}
