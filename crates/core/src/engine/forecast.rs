//! Base demand estimate per product.
//!
//! A robust central tendency of daily sold quantity over the trailing window,
//! scaled to the horizon and the weather multiplier, then rounded to the
//! product's unit.

use chrono::NaiveDate;

use crate::domain::weather::WeatherAdjustment;
use crate::engine::config::{Estimator, ForecastOptions};
use crate::engine::rounding::round_to_unit;
use crate::ingest::ProductSeries;

/// Daily sold quantities inside the trailing window. Days without a sales
/// record are absent, not zero.
pub fn window_sales(series: &ProductSeries, as_of: NaiveDate, window_days: u32) -> Vec<f64> {
    series
        .window(as_of, window_days)
        .iter()
        .filter_map(|p| p.sold)
        .collect()
}

/// Robust daily baseline, or `None` when the window holds no sales day.
pub fn baseline_daily(series: &ProductSeries, as_of: NaiveDate, opts: &ForecastOptions) -> Option<f64> {
    let mut values = window_sales(series, as_of, opts.window_days);
    match opts.estimator {
        Estimator::TrimmedMean => trimmed_mean(&mut values, opts.trim_fraction),
        Estimator::Median => median(&mut values),
    }
}

/// `round_unit(baseline × horizon × multiplier)`; 0 when there is no demand signal.
pub fn forecast(
    series: &ProductSeries,
    adjustment: &WeatherAdjustment,
    horizon_days: u32,
    as_of: Option<NaiveDate>,
    opts: &ForecastOptions,
) -> f64 {
    let Some(as_of) = as_of else {
        return 0.0;
    };
    let Some(daily) = baseline_daily(series, as_of, opts) else {
        return 0.0;
    };
    round_to_unit(daily * f64::from(horizon_days) * adjustment.demand_multiplier, series.unit)
}

pub fn trimmed_mean(values: &mut [f64], trim_fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    let mut k = (n as f64 * trim_fraction).floor() as usize;
    if 2 * k >= n {
        k = (n - 1) / 2;
    }
    let kept = &values[k..n - k];
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
    }
}
