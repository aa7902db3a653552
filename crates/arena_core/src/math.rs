//! Fixed-point math utilities for deterministic simulation.
//!
//! Simulated time, attack speeds, multipliers and stat deltas all use
//! fixed-point arithmetic so that two runs with the same seed produce
//! bit-identical event streams. Integer vitals (HP, shield, mana) stay `i32`.

use fixed::types::I32F32;

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Simulated seconds since combat start.
pub type SimTime = Fixed;

/// One hundred, the divisor for percentage values.
const HUNDRED: Fixed = Fixed::const_from_int(100);

/// Read a fixed-point value back from its `f64` form. [`Fixed::MAX`] is
/// written as `2^31`, so that one step past the range saturates; anything
/// further out is rejected.
fn from_wire(value: f64) -> Option<Fixed> {
    const BOUND: f64 = 2_147_483_648.0;
    (value >= -BOUND && value <= BOUND).then(|| Fixed::saturating_from_num(value))
}

/// Serde support for fixed-point numbers as decimal floats.
///
/// The event wire format and the RON data files are human-facing, so
/// fixed-point values are written as plain decimals. Every `I32F32` value
/// in the ranges used here fits in an `f64` mantissa, so the round trip
/// `Fixed -> f64 -> Fixed` is exact.
pub mod fixed_float {
    use super::{from_wire, Fixed};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as an `f64`.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from an `f64`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        from_wire(value).ok_or_else(|| D::Error::custom(format!("value {value} out of fixed-point range")))
    }
}

/// Serde support for `Option<Fixed>` as an optional decimal float.
pub mod option_fixed_float {
    use super::{from_wire, Fixed};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_num::<f64>()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            Some(value) => from_wire(value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("value {value} out of fixed-point range"))),
            None => Ok(None),
        }
    }
}

/// Round a fixed-point value half away from zero into an `i32`.
#[must_use]
pub fn round_to_i32(value: Fixed) -> i32 {
    value.saturating_round().saturating_to_num::<i32>()
}

/// `value` percent of `base`, saturating at the fixed-point bounds.
#[must_use]
pub fn percent_of(base: Fixed, value: Fixed) -> Fixed {
    match base.checked_mul(value) {
        Some(product) => product / HUNDRED,
        None if (base < Fixed::ZERO) != (value < Fixed::ZERO) => Fixed::MIN,
        None => Fixed::MAX,
    }
}

/// Interval between actions for an attacks-per-second rate.
///
/// Returns `None` for a non-positive rate: such a unit never acts.
#[must_use]
pub fn action_interval(attacks_per_second: Fixed) -> Option<Fixed> {
    if attacks_per_second <= Fixed::ZERO {
        return None;
    }
    Fixed::ONE.checked_div(attacks_per_second)
}

/// Whole seconds elapsed at `time`, used for per-second processing.
#[must_use]
pub fn whole_seconds(time: SimTime) -> i64 {
    time.floor().to_num::<i64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);

        let result1 = a * Fixed::from_num(7);
        let result2 = b * Fixed::from_num(7);
        assert_eq!(result1, result2);
    }

    #[test]
    fn test_float_round_trip_is_exact() {
        let dt = Fixed::from_num(0.1);
        for tick in 0..10_000 {
            let t = dt * Fixed::from_num(tick);
            let back = Fixed::from_num(t.to_num::<f64>());
            assert_eq!(t, back, "tick {tick}");
        }
    }

    #[test]
    fn test_tick_multiples_are_additive() {
        let dt = Fixed::from_num(0.1);
        let mut acc = Fixed::ZERO;
        for tick in 1..500 {
            acc += dt;
            assert_eq!(acc, dt * Fixed::from_num(tick));
        }
    }

    #[test]
    fn test_round_to_i32() {
        assert_eq!(round_to_i32(Fixed::from_num(2.5)), 3);
        assert_eq!(round_to_i32(Fixed::from_num(-2.5)), -3);
        assert_eq!(round_to_i32(Fixed::from_num(2.4)), 2);
    }

    #[test]
    fn test_percent_of() {
        let result = percent_of(Fixed::from_num(40), Fixed::from_num(25));
        assert_eq!(result, Fixed::from_num(10));
    }

    #[test]
    fn test_wire_bounds() {
        let max = Fixed::MAX.to_num::<f64>();
        assert_eq!(from_wire(max), Some(Fixed::MAX));
        assert_eq!(from_wire(Fixed::MIN.to_num::<f64>()), Some(Fixed::MIN));
        assert_eq!(from_wire(1e12), None);
        assert_eq!(from_wire(f64::NAN), None);
    }

    #[test]
    fn test_percent_of_saturates() {
        let huge = Fixed::from_num(50_000_000);
        assert_eq!(percent_of(huge, Fixed::from_num(100)), Fixed::MAX);
        assert_eq!(percent_of(-huge, Fixed::from_num(100)), Fixed::MIN);
        assert_eq!(round_to_i32(Fixed::MAX), i32::MAX);
        assert_eq!(round_to_i32(Fixed::MIN), i32::MIN);
    }

    #[test]
    fn test_action_interval() {
        assert_eq!(action_interval(Fixed::from_num(2)), Some(Fixed::from_num(0.5)));
        assert_eq!(action_interval(Fixed::ONE), Some(Fixed::ONE));
        assert_eq!(action_interval(Fixed::ZERO), None);
    }

    #[test]
    fn test_whole_seconds() {
        assert_eq!(whole_seconds(Fixed::from_num(0.9)), 0);
        assert_eq!(whole_seconds(Fixed::from_num(1)), 1);
        assert_eq!(whole_seconds(Fixed::from_num(2.3)), 2);
    }
}
