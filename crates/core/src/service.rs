//! Forecast service: one call from raw uploads to a complete report.
//!
//! Stateless and request-scoped. Every input (files, observation, as-of date,
//! analysis timestamp) is an explicit argument, so identical inputs always
//! produce identical reports.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rayon::prelude::*;

use crate::domain::forecast::{ForecastLine, ForecastReport, IngestSummary};
use crate::domain::weather::{WeatherAdjustment, WeatherObservation};
use crate::engine::config::{EngineConfig, MAX_HORIZON_DAYS};
use crate::engine::{adjust, allocate, forecast, OverrideTable, Volatility};
use crate::error::ForecastError;
use crate::ingest::{self, ProductSeries};

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub sales_raw: Vec<u8>,
    pub writeoffs_raw: Vec<u8>,
    /// `None` runs with a neutral adjustment and reports the fallback weather.
    pub observation: Option<WeatherObservation>,
    /// City label for the fallback weather block.
    pub city: Option<String>,
    /// Anchor of the trailing window; defaults to the latest sales date.
    pub as_of: Option<NaiveDate>,
    pub horizon_days: Option<u32>,
    pub analysis_date: DateTime<Utc>,
}

impl ForecastRequest {
    pub fn new(sales_raw: Vec<u8>, writeoffs_raw: Vec<u8>, analysis_date: DateTime<Utc>) -> Self {
        Self {
            sales_raw,
            writeoffs_raw,
            observation: None,
            city: None,
            as_of: None,
            horizon_days: None,
            analysis_date,
        }
    }
}

pub fn run_forecast(request: &ForecastRequest, config: &EngineConfig) -> Result<ForecastReport, ForecastError> {
    let horizon_days = request.horizon_days.unwrap_or(config.forecast.horizon_days);
    if !(1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
        return Err(ForecastError::InvalidRequest {
            field: "horizon_days",
            reason: format!("must be within [1, {MAX_HORIZON_DAYS}]"),
        });
    }
    if let Some(as_of) = request.as_of {
        let window = Duration::days(i64::from(config.forecast.window_days));
        if as_of.checked_sub_signed(window).is_none() {
            return Err(ForecastError::InvalidRequest {
                field: "as_of",
                reason: format!("{as_of} is too early for a {}-day window", config.forecast.window_days),
            });
        }
    }

    let data = ingest::ingest(&request.sales_raw, &request.writeoffs_raw, &config.ingest)?;
    let as_of = request.as_of.or(data.latest_sales_date);

    let (weather, adjustment, weather_fallback) = match &request.observation {
        Some(obs) => {
            let obs = obs.clone().normalized();
            let adjustment = adjust(&obs, &config.weather);
            (obs, adjustment, false)
        }
        None => {
            let mut fallback = config.fallback_weather.clone();
            if let Some(city) = &request.city {
                fallback.location = city.clone();
            }
            (fallback, WeatherAdjustment::neutral(), true)
        }
    };

    tracing::info!(
        products = data.products.len(),
        ?as_of,
        horizon_days,
        temperature = weather.temperature,
        condition = weather.condition.as_str(),
        demand_multiplier = adjustment.demand_multiplier,
        reserve_bump = adjustment.reserve_bump,
        weather_fallback,
        "running forecast"
    );

    let table = OverrideTable::new(&config.overrides, &config.product_tags);
    let lines: Vec<ForecastLine> = data
        .products
        .par_iter()
        .map(|series| forecast_line(series, adjustment, table, horizon_days, as_of, config))
        .collect();

    Ok(ForecastReport {
        weather,
        weather_fallback,
        forecast: lines,
        analysis_date: request.analysis_date,
        as_of_date: as_of,
        horizon_days,
        ingest: IngestSummary {
            sales: data.sales,
            writeoffs: data.writeoffs,
        },
    })
}

fn forecast_line(
    series: &ProductSeries,
    base: WeatherAdjustment,
    table: OverrideTable<'_>,
    horizon_days: u32,
    as_of: Option<NaiveDate>,
    config: &EngineConfig,
) -> ForecastLine {
    let adjustment = table.for_product(base, &series.product_id);
    let amount = forecast(series, &adjustment, horizon_days, as_of, &config.forecast);
    let volatility = Volatility::from_series(series, as_of, config.forecast.window_days);
    allocate(
        &series.product_id,
        series.unit,
        amount,
        &adjustment,
        &volatility,
        &config.reserve,
    )
}
