pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod service;
pub mod weather;

pub use engine::EngineConfig;
pub use error::{ConfigError, ForecastError, IngestError, WeatherError};
pub use service::{run_forecast, ForecastRequest};

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub weather_provider_base_url: Option<String>,
        pub weather_provider_api_key: Option<String>,
        pub weather_provider_path: Option<String>,
        pub weather_provider_timeout_secs: Option<u64>,
        pub weather_provider_retries: Option<u32>,
        pub weather_cache_ttl_secs: Option<u64>,
        pub forecast_config_path: Option<String>,
        pub default_city: Option<String>,
        pub port: Option<u16>,
        pub request_timeout_secs: Option<u64>,
        pub max_upload_bytes: Option<usize>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: env_string("SENTRY_DSN"),
                weather_provider_base_url: env_string("WEATHER_PROVIDER_BASE_URL"),
                weather_provider_api_key: env_string("WEATHER_PROVIDER_API_KEY"),
                weather_provider_path: env_string("WEATHER_PROVIDER_PATH"),
                weather_provider_timeout_secs: env_parse("WEATHER_PROVIDER_TIMEOUT_SECS")?,
                weather_provider_retries: env_parse("WEATHER_PROVIDER_RETRIES")?,
                weather_cache_ttl_secs: env_parse("WEATHER_CACHE_TTL_SECS")?,
                forecast_config_path: env_string("FORECAST_CONFIG_PATH"),
                default_city: env_string("DEFAULT_CITY"),
                port: env_parse("PORT")?,
                request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")?,
                max_upload_bytes: env_parse("MAX_UPLOAD_BYTES")?,
            })
        }

        pub fn require_weather_provider_base_url(&self) -> anyhow::Result<&str> {
            self.weather_provider_base_url
                .as_deref()
                .context("WEATHER_PROVIDER_BASE_URL is required")
        }

        pub fn default_city(&self) -> &str {
            self.default_city
                .as_deref()
                .unwrap_or(crate::weather::DEFAULT_CITY)
        }
    }

    fn env_string(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        env_string(key)
            .map(|v| v.trim().parse::<T>().with_context(|| format!("{key} is not valid: {v}")))
            .transpose()
    }
}
