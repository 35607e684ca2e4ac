use crate::config::Settings;
use crate::domain::weather::WeatherObservation;
use crate::error::WeatherError;
use crate::weather::{City, WeatherProvider};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PATH: &str = "/v1/forecast/tomorrow";
const DEFAULT_RETRIES: u32 = 3;

/// Plausible surface air temperature range, °C.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -80.0..=70.0;

/// Weather provider speaking a small JSON contract:
/// `GET {base}{path}?city=<key>&lat=..&lon=..` -> one observation object.
#[derive(Debug, Clone)]
pub struct HttpJsonWeatherProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonWeatherProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_weather_provider_base_url()?.to_string();
        let timeout_secs = settings.weather_provider_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build weather provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.weather_provider_api_key.clone(),
            path: settings
                .weather_provider_path
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PATH.to_string()),
            retries: settings.weather_provider_retries.unwrap_or(DEFAULT_RETRIES).max(1),
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, city: &City) -> Result<WeatherObservation> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[
                ("city", city.key.to_string()),
                ("lat", city.lat.to_string()),
                ("lon", city.lon.to_string()),
            ])
            .send()
            .await
            .context("weather provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read weather provider response")?;

        if !status.is_success() {
            anyhow::bail!("weather provider HTTP {status}: {text}");
        }

        parse_observation(&text, city)
    }
}

/// Decode and sanity-check one provider payload.
pub fn parse_observation(text: &str, city: &City) -> Result<WeatherObservation> {
    let mut obs = serde_json::from_str::<WeatherObservation>(text)
        .with_context(|| format!("weather provider response is not a valid observation: {text}"))?;

    anyhow::ensure!(
        TEMPERATURE_RANGE.contains(&obs.temperature),
        "implausible temperature {} for {}",
        obs.temperature,
        city.key
    );
    if obs.location.trim().is_empty() {
        obs.location = city.name.to_string();
    }
    Ok(obs.normalized())
}

#[async_trait::async_trait]
impl WeatherProvider for HttpJsonWeatherProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_observation(&self, city: &City) -> Result<WeatherObservation, WeatherError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(city).await {
                Ok(obs) => return Ok(obs),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(WeatherError::Unavailable {
                            location: city.key.to_string(),
                            reason: format!("{err:#}"),
                        });
                    }
                    let backoff = Duration::from_millis(250 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, city = city.key, error = %err, "weather fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::weather::ConditionTag;
    use crate::weather::CITIES;
    use serde_json::json;

    #[test]
    fn parses_payload_and_derives_condition() {
        let body = json!({
            "temperature": 27.5,
            "description": "небольшой дождь",
            "humidity": 81,
            "wind_speed": 4.2
        })
        .to_string();

        let obs = parse_observation(&body, &CITIES[0]).unwrap();
        assert_eq!(obs.location, "Пятигорск");
        assert_eq!(obs.condition, ConditionTag::Rain);
        assert_eq!(obs.humidity, 81.0);
    }

    #[test]
    fn keeps_explicit_condition_and_city() {
        let body = json!({
            "city": "Кисловодск",
            "temperature": 3,
            "condition": "cold"
        })
        .to_string();

        let obs = parse_observation(&body, &CITIES[1]).unwrap();
        assert_eq!(obs.location, "Кисловодск");
        assert_eq!(obs.condition, ConditionTag::Cold);
        assert_eq!(obs.description, "cold");
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(parse_observation("<html>", &CITIES[0]).is_err());
        assert!(parse_observation(&json!({"description": "ясно"}).to_string(), &CITIES[0]).is_err());
        assert!(parse_observation(&json!({"temperature": 140}).to_string(), &CITIES[0]).is_err());
    }

    #[test]
    fn builds_url_without_double_slash() {
        let provider = HttpJsonWeatherProvider {
            http: reqwest::Client::new(),
            base_url: "https://weather.example/".to_string(),
            api_key: None,
            path: "v1/forecast".to_string(),
            retries: 1,
        };
        assert_eq!(provider.url(), "https://weather.example/v1/forecast");
    }
}
