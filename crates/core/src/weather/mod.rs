//! Weather source boundary.
//!
//! The engine only ever sees a [`WeatherObservation`]; where it comes from
//! (request payload, HTTP provider, cache) is decided here and in the callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::weather::WeatherObservation;
use crate::error::WeatherError;

pub mod http;

pub use http::HttpJsonWeatherProvider;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub key: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

pub const CITIES: &[City] = &[
    City {
        key: "pyatigorsk",
        name: "Пятигорск",
        lat: 44.0486,
        lon: 43.0594,
    },
    City {
        key: "kislovodsk",
        name: "Кисловодск",
        lat: 43.9053,
        lon: 43.19,
    },
];

pub const DEFAULT_CITY: &str = "pyatigorsk";

pub fn find_city(key: &str) -> Option<&'static City> {
    let key = key.trim();
    CITIES.iter().find(|c| c.key.eq_ignore_ascii_case(key) || c.name == key)
}

#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Observation for the next business day at `city`.
    async fn fetch_observation(&self, city: &City) -> Result<WeatherObservation, WeatherError>;
}

/// Per-city TTL cache in front of another provider. Failures are not cached.
///
/// Each city has its own slot lock: concurrent requests for the same cold
/// city share one upstream fetch, while other cities are never blocked by it.
pub struct CachedWeatherProvider<P> {
    inner: P,
    ttl: Duration,
    slots: Mutex<HashMap<&'static str, Arc<Mutex<Option<CachedObservation>>>>>,
}

type CachedObservation = (Instant, WeatherObservation);

impl<P: WeatherProvider> CachedWeatherProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, city: &City) -> Arc<Mutex<Option<CachedObservation>>> {
        let mut slots = self.slots.lock().await;
        slots.entry(city.key).or_default().clone()
    }
}

#[async_trait::async_trait]
impl<P: WeatherProvider> WeatherProvider for CachedWeatherProvider<P> {
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    async fn fetch_observation(&self, city: &City) -> Result<WeatherObservation, WeatherError> {
        let slot = self.slot(city).await;
        let mut cached = slot.lock().await;
        if let Some((fetched_at, obs)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                tracing::debug!(city = city.key, "weather cache hit");
                return Ok(obs.clone());
            }
        }

        let obs = self.inner.fetch_observation(city).await?;
        *cached = Some((Instant::now(), obs.clone()));
        Ok(obs)
    }
}
