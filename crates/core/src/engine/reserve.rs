//! Reserve allocator: safety-stock percentage and final order quantity.
//!
//! reserve = base + weather bump (product overrides included) + write-off tier,
//! clamped to [0, 100]. Products whose deliveries are regularly written off
//! get a smaller reserve.

use chrono::NaiveDate;

use crate::domain::forecast::ForecastLine;
use crate::domain::records::Unit;
use crate::domain::weather::WeatherAdjustment;
use crate::engine::config::{ReservePolicy, WriteoffTier};
use crate::engine::rounding::{round_half_up, total_with_reserve};
use crate::ingest::ProductSeries;

/// Sold vs written-off volume over the trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Volatility {
    pub sold: f64,
    pub written_off: f64,
}

impl Volatility {
    pub fn from_series(series: &ProductSeries, as_of: Option<NaiveDate>, window_days: u32) -> Self {
        let Some(as_of) = as_of else {
            return Self::default();
        };
        series
            .window(as_of, window_days)
            .iter()
            .fold(Self::default(), |acc, p| Self {
                sold: acc.sold + p.sold.unwrap_or(0.0),
                written_off: acc.written_off + p.written_off,
            })
    }

    /// Written-off / sold. `None` without write-offs; infinite when nothing sold.
    pub fn writeoff_ratio(&self) -> Option<f64> {
        if self.written_off <= 0.0 {
            return None;
        }
        if self.sold <= 0.0 {
            return Some(f64::INFINITY);
        }
        Some(self.written_off / self.sold)
    }

    /// Ratio in percent, one decimal, capped at 100.
    pub fn writeoff_rate_percent(&self) -> f64 {
        match self.writeoff_ratio() {
            None => 0.0,
            Some(r) => round_half_up((r * 100.0).min(100.0), 1),
        }
    }
}

/// Delta of the highest tier whose `min_ratio` the ratio reaches.
pub fn writeoff_delta(volatility: &Volatility, tiers: &[WriteoffTier]) -> i32 {
    let Some(ratio) = volatility.writeoff_ratio() else {
        return 0;
    };
    tiers
        .iter()
        .filter(|t| ratio >= t.min_ratio)
        .max_by(|a, b| a.min_ratio.total_cmp(&b.min_ratio))
        .map_or(0, |t| t.reserve_delta)
}

pub fn reserve_percent(adjustment: &WeatherAdjustment, volatility: &Volatility, policy: &ReservePolicy) -> u32 {
    let raw = i64::from(policy.base_reserve)
        + i64::from(adjustment.reserve_bump)
        + i64::from(writeoff_delta(volatility, &policy.writeoff_tiers));
    raw.clamp(0, 100) as u32
}

/// Build the final line. `adjustment` must already be specialised for the product.
pub fn allocate(
    product_id: &str,
    unit: Unit,
    base_forecast_amount: f64,
    adjustment: &WeatherAdjustment,
    volatility: &Volatility,
    policy: &ReservePolicy,
) -> ForecastLine {
    let reserve_percent = reserve_percent(adjustment, volatility, policy);
    ForecastLine {
        product_id: product_id.to_string(),
        base_forecast_amount,
        reserve_percent,
        total_amount: total_with_reserve(base_forecast_amount, reserve_percent, unit),
        unit,
        writeoff_rate: volatility.writeoff_rate_percent(),
    }
}
