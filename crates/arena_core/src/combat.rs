//! Combat rules: damage formula, target selection and star scaling.
//!
//! This module implements:
//! - Flat defense reduction with a floor of 1 and a small random variance
//! - Front-to-back target selection with back-row preference for
//!   `target_backline` units
//! - Star-level scaling of template stats

use rand::Rng;

use crate::components::{Position, UnitState};

/// Upper bound (inclusive) of the random bonus added to physical damage.
pub const DAMAGE_VARIANCE: i32 = 2;

/// Highest supported star level.
pub const MAX_STAR_LEVEL: u8 = 3;

/// Damage of a basic attack before shields.
///
/// `max(1, attack - defense)` plus a variance in `0..=DAMAGE_VARIANCE`, so
/// the result is never below 1.
pub fn physical_damage<R: Rng>(attack: i32, defense: i32, rng: &mut R) -> i32 {
    attack.saturating_sub(defense).max(1).saturating_add(rng.gen_range(0..=DAMAGE_VARIANCE))
}

/// Index of the default attack target: the first alive enemy in team
/// order. Units with `target_backline` take the first alive back-row enemy
/// when there is one.
#[must_use]
pub fn select_target(attacker: &UnitState, enemies: &[UnitState]) -> Option<usize> {
    if attacker.targets_backline() {
        if let Some(index) = backline_target(enemies) {
            return Some(index);
        }
    }
    first_alive(enemies)
}

/// Index of the first alive unit.
#[must_use]
pub fn first_alive(units: &[UnitState]) -> Option<usize> {
    units.iter().position(UnitState::is_alive)
}

/// Index of the first alive back-row unit.
#[must_use]
pub fn backline_target(units: &[UnitState]) -> Option<usize> {
    units
        .iter()
        .position(|u| u.is_alive() && u.position == Position::Back)
}

/// Index of the alive unit with the lowest HP; the earliest wins ties.
#[must_use]
pub fn lowest_hp(units: &[UnitState]) -> Option<usize> {
    units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.is_alive())
        .min_by_key(|(index, u)| (u.hp, *index))
        .map(|(index, _)| index)
}

/// Index of a uniformly chosen alive unit.
pub fn random_alive<R: Rng>(units: &[UnitState], rng: &mut R) -> Option<usize> {
    let alive: Vec<usize> = units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.is_alive())
        .map(|(index, _)| index)
        .collect();
    if alive.is_empty() {
        return None;
    }
    Some(alive[rng.gen_range(0..alive.len())])
}

/// Number of alive units.
#[must_use]
pub fn alive_count(units: &[UnitState]) -> usize {
    units.iter().filter(|u| u.is_alive()).count()
}

/// Scale a base stat by star level: x1.0, x1.8 and x3.24 for 1 to 3 stars,
/// rounded half away from zero.
///
/// Returns `None` for unsupported star levels.
#[must_use]
pub fn scale_by_star(base: i32, star_level: u8) -> Option<i32> {
    // 1.8 = 9/5 and 3.24 = 81/25, kept as ratios so scaling is exact.
    let (num, den): (i64, i64) = match star_level {
        1 => (1, 1),
        2 => (9, 5),
        3 => (81, 25),
        _ => return None,
    };
    let scaled = i64::from(base) * num;
    let rounded = if scaled >= 0 {
        (scaled * 2 + den) / (2 * den)
    } else {
        (scaled * 2 - den) / (2 * den)
    };
    i32::try_from(rounded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ActiveEffect, ActiveEffectKind, Side, Stats};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn enemy(id: u32, hp: i32, position: Position) -> UnitState {
        let mut unit = UnitState::new(id, format!("E{id}"), Side::Opponent, 100, Stats::default())
            .with_position(position);
        unit.hp = hp;
        unit
    }

    #[test]
    fn test_physical_damage_floor_and_variance() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let dmg = physical_damage(10, 0, &mut rng);
            assert!((10..=12).contains(&dmg));
            let floored = physical_damage(1, 50, &mut rng);
            assert!((1..=3).contains(&floored));
        }
    }

    #[test]
    fn test_physical_damage_is_seed_deterministic() {
        let mut a = ChaCha8Rng::seed_from_u64(99);
        let mut b = ChaCha8Rng::seed_from_u64(99);
        let left: Vec<_> = (0..50).map(|_| physical_damage(20, 5, &mut a)).collect();
        let right: Vec<_> = (0..50).map(|_| physical_damage(20, 5, &mut b)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_select_first_alive() {
        let attacker = UnitState::new(1, "A", Side::Player, 100, Stats::default());
        let mut enemies = vec![
            enemy(1, 100, Position::Front),
            enemy(2, 100, Position::Back),
        ];
        assert_eq!(select_target(&attacker, &enemies), Some(0));
        enemies[0].hp = 0;
        enemies[0].is_dead = true;
        assert_eq!(select_target(&attacker, &enemies), Some(1));
        enemies[1].hp = 0;
        assert_eq!(select_target(&attacker, &enemies), None);
    }

    #[test]
    fn test_backline_preference() {
        let mut attacker = UnitState::new(1, "Assassin", Side::Player, 100, Stats::default());
        attacker.effects.push(ActiveEffect {
            effect_id: 1,
            kind: ActiveEffectKind::TargetBackline,
            expires_at: None,
            source: None,
        });
        let mut enemies = vec![
            enemy(1, 100, Position::Front),
            enemy(2, 100, Position::Back),
        ];
        assert_eq!(select_target(&attacker, &enemies), Some(1));

        // Falls back to the front row once the back row is gone.
        enemies[1].hp = 0;
        assert_eq!(select_target(&attacker, &enemies), Some(0));
    }

    #[test]
    fn test_lowest_hp_ties_go_to_first() {
        let units = vec![
            enemy(1, 50, Position::Front),
            enemy(2, 20, Position::Front),
            enemy(3, 20, Position::Back),
        ];
        assert_eq!(lowest_hp(&units), Some(1));
    }

    #[test]
    fn test_random_alive_skips_dead() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let units = vec![enemy(1, 0, Position::Front), enemy(2, 10, Position::Front)];
        for _ in 0..20 {
            assert_eq!(random_alive(&units, &mut rng), Some(1));
        }
        assert_eq!(alive_count(&units), 1);
    }

    #[test]
    fn test_star_scaling() {
        assert_eq!(scale_by_star(100, 1), Some(100));
        assert_eq!(scale_by_star(100, 2), Some(180));
        assert_eq!(scale_by_star(100, 3), Some(324));
        // 57 * 1.8 = 102.6
        assert_eq!(scale_by_star(57, 2), Some(103));
        assert_eq!(scale_by_star(10, 4), None);
        assert_eq!(scale_by_star(10, 0), None);
    }
}
