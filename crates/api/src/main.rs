use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::Request,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vanlav_core::domain::forecast::ForecastReport;
use vanlav_core::domain::weather::WeatherObservation;
use vanlav_core::ingest::schema::parse_date;
use vanlav_core::weather::{find_city, CachedWeatherProvider, City, HttpJsonWeatherProvider, WeatherProvider, CITIES};
use vanlav_core::{run_forecast, EngineConfig, ForecastRequest};

mod error;

use error::ApiError;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_WEATHER_CACHE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_WEATHER_LOOKUP_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = vanlav_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = match EngineConfig::load(&settings) {
        Ok(config) => config,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "invalid forecast configuration");
            return Err(err);
        }
    };

    let default_city = find_city(settings.default_city())
        .ok_or_else(|| anyhow::anyhow!("DEFAULT_CITY '{}' is not a known city", settings.default_city()))?;

    let weather: Option<Arc<dyn WeatherProvider>> = match HttpJsonWeatherProvider::from_settings(&settings) {
        Ok(provider) => {
            let ttl = Duration::from_secs(
                settings
                    .weather_cache_ttl_secs
                    .unwrap_or(DEFAULT_WEATHER_CACHE_TTL_SECS),
            );
            Some(Arc::new(CachedWeatherProvider::new(provider, ttl)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "weather provider not configured; forecasts without a weather field use the fallback");
            None
        }
    };

    let request_timeout = Duration::from_secs(
        settings
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
    );
    // Cap on one weather lookup, retries included.
    let weather_timeout = Duration::from_secs(
        settings
            .weather_provider_timeout_secs
            .unwrap_or(DEFAULT_WEATHER_LOOKUP_SECS),
    );
    let max_upload_bytes = settings.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    let state = AppState {
        config: Arc::new(config),
        weather,
        default_city,
        request_timeout,
        weather_timeout,
    };

    // The outer layer is a backstop; the handler reports its own JSON timeout first.
    let app = router(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout + weather_timeout + Duration::from_secs(5)))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            tracing::info_span!(
                "http",
                request_id = %Uuid::new_v4(),
                method = %req.method(),
                uri = %req.uri(),
            )
        }));

    let port = settings.port.unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, city = default_city.key, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    config: Arc<EngineConfig>,
    weather: Option<Arc<dyn WeatherProvider>>,
    default_city: &'static City,
    request_timeout: Duration,
    weather_timeout: Duration,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/api/cities", get(cities))
        .route("/api/forecast", post(create_forecast))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

async fn cities(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "cities": CITIES,
        "default": state.default_city.key,
    }))
}

/// Multipart fields of `POST /api/forecast`.
#[derive(Debug, Default)]
struct ForecastForm {
    sales_file: Option<Bytes>,
    writeoffs_file: Option<Bytes>,
    city: Option<String>,
    weather: Option<String>,
    as_of: Option<String>,
    horizon_days: Option<String>,
}

impl ForecastForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Multipart(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "sales_file" => form.sales_file = Some(read_bytes(field).await?),
                "writeoffs_file" => form.writeoffs_file = Some(read_bytes(field).await?),
                "city" => form.city = Some(read_text(field).await?),
                "weather" => form.weather = Some(read_text(field).await?),
                "as_of" => form.as_of = Some(read_text(field).await?),
                "horizon_days" => form.horizon_days = Some(read_text(field).await?),
                other => tracing::debug!(field = other, "ignoring unknown multipart field"),
            }
        }
        Ok(form)
    }
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Bytes, ApiError> {
    field.bytes().await.map_err(|e| ApiError::Multipart(e.body_text()))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map(|s| s.trim().to_string())
        .map_err(|e| ApiError::Multipart(e.body_text()))
}

async fn create_forecast(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ForecastReport>, ApiError> {
    let form = ForecastForm::read(multipart).await?;

    let sales = form.sales_file.ok_or(ApiError::MissingField("sales_file"))?;
    let writeoffs = form.writeoffs_file.ok_or(ApiError::MissingField("writeoffs_file"))?;

    let city = match form.city.as_deref().filter(|s| !s.is_empty()) {
        Some(key) => find_city(key).ok_or_else(|| ApiError::InvalidField {
            field: "city",
            message: format!("unknown city '{key}'"),
        })?,
        None => state.default_city,
    };

    let explicit_weather = form
        .weather
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            serde_json::from_str::<WeatherObservation>(raw).map_err(|e| ApiError::InvalidField {
                field: "weather",
                message: e.to_string(),
            })
        })
        .transpose()?;

    let as_of = form
        .as_of
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(parse_as_of)
        .transpose()?;

    let horizon_days = form
        .horizon_days
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            raw.parse::<u32>().map_err(|e| ApiError::InvalidField {
                field: "horizon_days",
                message: e.to_string(),
            })
        })
        .transpose()?;

    let observation = match explicit_weather {
        Some(obs) => Some(obs),
        None => lookup_weather(&state, city).await,
    };

    let mut request = ForecastRequest::new(sales.to_vec(), writeoffs.to_vec(), Utc::now());
    request.observation = observation;
    request.city = Some(city.name.to_string());
    request.as_of = as_of;
    request.horizon_days = horizon_days;

    let config = state.config.clone();
    let job = tokio::task::spawn_blocking(move || run_forecast(&request, &config));
    let report = match tokio::time::timeout(state.request_timeout, job).await {
        Err(_) => return Err(ApiError::Timeout(state.request_timeout.as_secs())),
        Ok(Err(join_err)) => return Err(ApiError::Internal(anyhow::Error::new(join_err).context("forecast task failed"))),
        Ok(Ok(result)) => result?,
    };

    tracing::info!(
        city = city.key,
        lines = report.forecast.len(),
        weather_fallback = report.weather_fallback,
        "forecast produced"
    );

    Ok(Json(report))
}

fn parse_as_of(raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date(raw).map_err(|message| ApiError::InvalidField {
        field: "as_of",
        message,
    })
}

/// Provider failures and slow lookups degrade to the neutral fallback; they never fail the request.
async fn lookup_weather(state: &AppState, city: &City) -> Option<WeatherObservation> {
    let provider = state.weather.as_ref()?;
    match tokio::time::timeout(state.weather_timeout, provider.fetch_observation(city)).await {
        Ok(Ok(obs)) => Some(obs),
        Ok(Err(e)) => {
            tracing::warn!(provider = provider.provider_name(), city = city.key, error = %e, "weather lookup failed; using fallback");
            None
        }
        Err(_) => {
            tracing::warn!(
                provider = provider.provider_name(),
                city = city.key,
                timeout = ?state.weather_timeout,
                "weather lookup timed out; using fallback"
            );
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &vanlav_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
