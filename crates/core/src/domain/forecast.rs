use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::domain::records::Unit;
use crate::domain::weather::WeatherObservation;
use crate::ingest::IngestStats;

/// Order recommendation for one product. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastLine {
    #[serde(rename = "product")]
    pub product_id: String,
    #[serde(rename = "forecast_amount", serialize_with = "serialize_amount")]
    pub base_forecast_amount: f64,
    pub reserve_percent: u32,
    #[serde(serialize_with = "serialize_amount")]
    pub total_amount: f64,
    #[serde(serialize_with = "serialize_unit_label")]
    pub unit: Unit,
    /// Written-off share of sold volume over the trailing window, in percent.
    pub writeoff_rate: f64,
}

/// Full response of one forecast run.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub weather: WeatherObservation,
    pub weather_fallback: bool,
    pub forecast: Vec<ForecastLine>,
    pub analysis_date: DateTime<Utc>,
    pub as_of_date: Option<NaiveDate>,
    pub horizon_days: u32,
    pub ingest: IngestSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub sales: IngestStats,
    pub writeoffs: IngestStats,
}

// Whole amounts go out as JSON integers so piece counts never render as `14.0`.
fn serialize_amount<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn serialize_unit_label<S: Serializer>(unit: &Unit, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(unit.label())
}
