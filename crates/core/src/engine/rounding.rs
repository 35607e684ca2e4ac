//! Half-up rounding at a product's unit granularity.
//!
//! Amounts are user-visible, so the rule is fixed: halves always round up
//! (amounts are never negative). A small tolerance absorbs binary
//! representation error, e.g. `1.15 * 10 == 11.499999999999998`.

use crate::domain::records::Unit;

const TOLERANCE: f64 = 1e-9;

pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    let scale = 10f64.powi(decimals as i32);
    (value * scale + 0.5 + TOLERANCE).floor() / scale
}

pub fn round_to_unit(value: f64, unit: Unit) -> f64 {
    round_half_up(value, unit.decimals())
}

/// `round(base × (1 + reserve / 100))` at the unit's granularity.
pub fn total_with_reserve(base: f64, reserve_percent: u32, unit: Unit) -> f64 {
    round_to_unit(base * (1.0 + f64::from(reserve_percent) / 100.0), unit)
}
