//! Engine configuration.
//!
//! Every threshold, multiplier and rule the engine uses lives here so that
//! business tuning is a config change, not a code change. Loaded once at
//! startup from JSON (`FORECAST_CONFIG_PATH`) with a few scalar knobs
//! overridable from the environment, then validated. An invalid config is a
//! startup failure, never a per-request one.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::domain::weather::{ConditionTag, TemperatureBand, WeatherObservation};
use crate::error::ConfigError;

/// Ten years of history.
pub const MAX_WINDOW_DAYS: u32 = 3660;
pub const MAX_HORIZON_DAYS: u32 = 366;
/// Any single reserve contribution, in percentage points.
const RESERVE_POINTS: std::ops::RangeInclusive<i32> = -100..=100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub ingest: IngestOptions,
    pub weather: WeatherPolicy,
    /// Product/condition specific add-ons, applied on top of the weather policy.
    pub overrides: Vec<OverrideRule>,
    /// Product id -> tags (e.g. `perishable`) that override rules can target.
    pub product_tags: BTreeMap<String, Vec<String>>,
    pub forecast: ForecastOptions,
    pub reserve: ReservePolicy,
    /// Reported when no observation is available. Never drives any adjustment.
    pub fallback_weather: WeatherObservation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingest: IngestOptions::default(),
            weather: WeatherPolicy::default(),
            overrides: Vec::new(),
            product_tags: BTreeMap::new(),
            forecast: ForecastOptions::default(),
            reserve: ReservePolicy::default(),
            fallback_weather: WeatherObservation {
                location: String::new(),
                temperature: 20.0,
                description: "нет данных".to_string(),
                condition: ConditionTag::Other,
                humidity: 60.0,
                wind_speed: 5.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestOptions {
    /// Ingestion fails when malformed rows exceed this share of all rows.
    pub max_malformed_fraction: f64,
    /// Emit lines for products that only appear in the write-off file.
    pub include_writeoff_only: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_malformed_fraction: 0.2,
            include_writeoff_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandEffect {
    pub demand_multiplier: f64,
    #[serde(default)]
    pub reserve_bump: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherPolicy {
    /// Strictly above this temperature (°C) the day counts as hot.
    pub hot_threshold: f64,
    /// Strictly below this temperature (°C) the day counts as cold.
    pub cold_threshold: f64,
    pub hot: BandEffect,
    pub cold: BandEffect,
    /// Rain within the normal temperature band.
    pub rain: BandEffect,
    pub normal: BandEffect,
}

impl Default for WeatherPolicy {
    fn default() -> Self {
        Self {
            hot_threshold: 25.0,
            cold_threshold: 10.0,
            hot: BandEffect {
                demand_multiplier: 1.2,
                reserve_bump: 5,
            },
            cold: BandEffect {
                demand_multiplier: 0.8,
                reserve_bump: 0,
            },
            rain: BandEffect {
                demand_multiplier: 1.1,
                reserve_bump: 0,
            },
            normal: BandEffect {
                demand_multiplier: 1.0,
                reserve_bump: 0,
            },
        }
    }
}

/// One row of the override table.
///
/// Targets exactly one of `product` / `tag`; fires when every given trigger
/// (`band`, `condition`) matches the day's weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<TemperatureBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionTag>,
    #[serde(default)]
    pub reserve_add: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    TrimmedMean,
    Median,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastOptions {
    /// Trailing window, in calendar days, ending at the as-of date.
    pub window_days: u32,
    /// Default number of days the order has to cover.
    pub horizon_days: u32,
    pub estimator: Estimator,
    /// Share trimmed from each end for `trimmed_mean`.
    pub trim_fraction: f64,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            window_days: 28,
            horizon_days: 1,
            estimator: Estimator::TrimmedMean,
            trim_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteoffTier {
    /// Applies when written-off / sold >= this ratio.
    pub min_ratio: f64,
    /// Reserve change in percentage points (negative trims over-provisioning).
    pub reserve_delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReservePolicy {
    pub base_reserve: i32,
    pub writeoff_tiers: Vec<WriteoffTier>,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            base_reserve: 10,
            writeoff_tiers: vec![
                WriteoffTier {
                    min_ratio: 0.05,
                    reserve_delta: -3,
                },
                WriteoffTier {
                    min_ratio: 0.15,
                    reserve_delta: -5,
                },
            ],
        }
    }
}

impl EngineConfig {
    /// Load from `FORECAST_CONFIG_PATH` (or defaults), apply env overrides, validate.
    pub fn load(settings: &Settings) -> Result<Self, ConfigError> {
        let mut config = match settings.forecast_config_path.as_deref() {
            Some(path) => Self::from_json_file(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            ConfigError::Parse { detail, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                detail,
            },
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Scalar knobs that deployments commonly tune without shipping a file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("FORECAST_WINDOW_DAYS") {
            self.forecast.window_days = parse_env("FORECAST_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = lookup("FORECAST_HORIZON_DAYS") {
            self.forecast.horizon_days = parse_env("FORECAST_HORIZON_DAYS", &v)?;
        }
        if let Some(v) = lookup("FORECAST_BASE_RESERVE") {
            self.reserve.base_reserve = parse_env("FORECAST_BASE_RESERVE", &v)?;
        }
        if let Some(v) = lookup("INGEST_MAX_MALFORMED_FRACTION") {
            self.ingest.max_malformed_fraction = parse_env("INGEST_MAX_MALFORMED_FRACTION", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let frac = self.ingest.max_malformed_fraction;
        if !(0.0..=1.0).contains(&frac) {
            return Err(ConfigError::threshold("ingest.max_malformed_fraction", frac, "must be within [0, 1]"));
        }

        let w = &self.weather;
        if !w.hot_threshold.is_finite() || !w.cold_threshold.is_finite() {
            return Err(ConfigError::threshold(
                "weather.hot_threshold",
                w.hot_threshold,
                "thresholds must be finite",
            ));
        }
        if w.cold_threshold >= w.hot_threshold {
            return Err(ConfigError::threshold(
                "weather.cold_threshold",
                w.cold_threshold,
                "must be below weather.hot_threshold",
            ));
        }
        for (field, effect) in [
            ("weather.hot.demand_multiplier", w.hot),
            ("weather.cold.demand_multiplier", w.cold),
            ("weather.rain.demand_multiplier", w.rain),
            ("weather.normal.demand_multiplier", w.normal),
        ] {
            check_multiplier(field, effect.demand_multiplier)?;
        }
        for (field, effect) in [
            ("weather.hot.reserve_bump", w.hot),
            ("weather.cold.reserve_bump", w.cold),
            ("weather.rain.reserve_bump", w.rain),
            ("weather.normal.reserve_bump", w.normal),
        ] {
            if !RESERVE_POINTS.contains(&effect.reserve_bump) {
                return Err(ConfigError::threshold(field, effect.reserve_bump, "must be within [-100, 100]"));
            }
        }

        for (index, rule) in self.overrides.iter().enumerate() {
            validate_rule(index, rule)?;
        }

        let f = &self.forecast;
        if !(1..=MAX_WINDOW_DAYS).contains(&f.window_days) {
            return Err(ConfigError::threshold(
                "forecast.window_days",
                f.window_days,
                "must be within [1, 3660]",
            ));
        }
        if !(1..=MAX_HORIZON_DAYS).contains(&f.horizon_days) {
            return Err(ConfigError::threshold(
                "forecast.horizon_days",
                f.horizon_days,
                "must be within [1, 366]",
            ));
        }
        if !(0.0..0.5).contains(&f.trim_fraction) {
            return Err(ConfigError::threshold("forecast.trim_fraction", f.trim_fraction, "must be within [0, 0.5)"));
        }

        let r = &self.reserve;
        if !(0..=100).contains(&r.base_reserve) {
            return Err(ConfigError::threshold("reserve.base_reserve", r.base_reserve, "must be within [0, 100]"));
        }
        for tier in &r.writeoff_tiers {
            if !tier.min_ratio.is_finite() || tier.min_ratio < 0.0 {
                return Err(ConfigError::threshold(
                    "reserve.writeoff_tiers.min_ratio",
                    tier.min_ratio,
                    "must be finite and non-negative",
                ));
            }
            if !RESERVE_POINTS.contains(&tier.reserve_delta) {
                return Err(ConfigError::threshold(
                    "reserve.writeoff_tiers.reserve_delta",
                    tier.reserve_delta,
                    "must be within [-100, 100]",
                ));
            }
        }

        Ok(())
    }
}

fn check_multiplier(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::threshold(field, value, "must be finite and > 0"));
    }
    Ok(())
}

fn validate_rule(index: usize, rule: &OverrideRule) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRule {
        index,
        reason: reason.to_string(),
    };

    match (&rule.product, &rule.tag) {
        (Some(_), Some(_)) => return Err(invalid("set either `product` or `tag`, not both")),
        (None, None) => return Err(invalid("one of `product` or `tag` is required")),
        (Some(p), None) | (None, Some(p)) if p.trim().is_empty() => {
            return Err(invalid("target must be non-empty"));
        }
        _ => {}
    }
    if !RESERVE_POINTS.contains(&rule.reserve_add) {
        return Err(invalid("`reserve_add` must be within [-100, 100]"));
    }
    if rule.band.is_none() && rule.condition.is_none() {
        return Err(invalid("at least one trigger (`band` or `condition`) is required"));
    }
    if let Some(factor) = rule.demand_factor {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(invalid("`demand_factor` must be finite and > 0"));
        }
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::threshold(key, value, "not a valid number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reserve.base_reserve, 10);
        assert_eq!(config.forecast.window_days, 28);
        assert_eq!(config.weather.hot.reserve_bump, 5);
    }

    #[test]
    fn parses_partial_json_on_top_of_defaults() {
        let text = json!({
            "weather": {"hot_threshold": 27.0},
            "product_tags": {"cream-dessert": ["perishable"]},
            "overrides": [
                {"tag": "perishable", "band": "hot", "reserve_add": 10}
            ]
        })
        .to_string();

        let config = EngineConfig::from_json_str(&text).unwrap();
        assert_eq!(config.weather.hot_threshold, 27.0);
        assert_eq!(config.weather.cold_threshold, 10.0);
        assert_eq!(config.overrides.len(), 1);
        assert_eq!(config.overrides[0].band, Some(TemperatureBand::Hot));
    }

    #[test]
    fn rejects_negative_base_reserve() {
        let mut config = EngineConfig::default();
        config.reserve.base_reserve = -5;
        match config.validate() {
            Err(ConfigError::InvalidThreshold { field, .. }) => assert_eq!(field, "reserve.base_reserve"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_windows_beyond_ten_years() {
        let mut config = EngineConfig::default();
        config.forecast.window_days = u32::MAX;
        match config.validate() {
            Err(ConfigError::InvalidThreshold { field, .. }) => assert_eq!(field, "forecast.window_days"),
            other => panic!("unexpected: {other:?}"),
        }
        config.forecast.window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_reserve_points() {
        let text = json!({"overrides": [
            {"tag": "perishable", "band": "hot", "reserve_add": 100},
            {"tag": "perishable", "band": "hot", "reserve_add": 2147483647}
        ]})
        .to_string();
        assert!(matches!(
            EngineConfig::from_json_str(&text),
            Err(ConfigError::InvalidRule { index: 1, .. })
        ));

        let mut config = EngineConfig::default();
        config.weather.hot.reserve_bump = -101;
        match config.validate() {
            Err(ConfigError::InvalidThreshold { field, .. }) => assert_eq!(field, "weather.hot.reserve_bump"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = EngineConfig::default();
        config.weather.cold_threshold = 30.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn rejects_rule_without_trigger_or_with_two_targets() {
        let text = json!({"overrides": [{"product": "a", "reserve_add": 3}]}).to_string();
        assert!(matches!(
            EngineConfig::from_json_str(&text),
            Err(ConfigError::InvalidRule { index: 0, .. })
        ));

        let text = json!({"overrides": [
            {"product": "a", "condition": "rain"},
            {"product": "a", "tag": "b", "condition": "rain"}
        ]})
        .to_string();
        assert!(matches!(
            EngineConfig::from_json_str(&text),
            Err(ConfigError::InvalidRule { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = json!({"reserve": {"base_reserv": 12}}).to_string();
        assert!(matches!(EngineConfig::from_json_str(&text), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_apply_and_reject_garbage() {
        let mut config = EngineConfig::default();
        config
            .apply_env_overrides(|k| match k {
                "FORECAST_WINDOW_DAYS" => Some("14".to_string()),
                "FORECAST_BASE_RESERVE" => Some("12".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.forecast.window_days, 14);
        assert_eq!(config.reserve.base_reserve, 12);

        let err = config
            .apply_env_overrides(|k| (k == "FORECAST_HORIZON_DAYS").then(|| "two".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { field: "FORECAST_HORIZON_DAYS", .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({"reserve": {"base_reserve": 15}})).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.reserve.base_reserve, 15);

        let missing = EngineConfig::from_json_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
