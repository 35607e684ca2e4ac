use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vanlav_core::domain::weather::{ConditionTag, WeatherObservation};
use vanlav_core::ingest::schema::parse_date;
use vanlav_core::weather::{find_city, City, HttpJsonWeatherProvider, WeatherProvider};
use vanlav_core::{run_forecast, EngineConfig, ForecastRequest};

mod sample;

#[derive(Debug, Parser)]
#[command(name = "vanlav_worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one forecast from local files and print the JSON report.
    Forecast(ForecastArgs),
    /// Write deterministic sample sales / write-off files.
    Sample(SampleArgs),
}

#[derive(Debug, Args)]
struct ForecastArgs {
    #[arg(long)]
    sales: PathBuf,

    #[arg(long)]
    writeoffs: PathBuf,

    /// Engine config JSON. Defaults to FORECAST_CONFIG_PATH, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// City key or name. Defaults to DEFAULT_CITY.
    #[arg(long)]
    city: Option<String>,

    /// Observed/forecast temperature, °C. Skips the weather provider.
    #[arg(long, allow_hyphen_values = true)]
    temperature: Option<f64>,

    /// clear | cloudy | rain | hot | cold | other
    #[arg(long, requires = "temperature")]
    condition: Option<String>,

    #[arg(long, requires = "temperature")]
    description: Option<String>,

    /// Ask the configured weather provider when no temperature is given.
    #[arg(long)]
    fetch_weather: bool,

    /// Window anchor (YYYY-MM-DD). Defaults to the latest sales date.
    #[arg(long)]
    as_of: Option<String>,

    #[arg(long)]
    horizon_days: Option<u32>,

    /// RFC 3339 timestamp stamped on the report. Defaults to now.
    #[arg(long)]
    analysis_date: Option<String>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SampleArgs {
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 30)]
    days: u32,

    /// Last day of the generated history (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    as_of: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = vanlav_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Forecast(args) => forecast(&settings, args).await,
        Command::Sample(args) => write_sample(args),
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

async fn forecast(settings: &vanlav_core::config::Settings, args: ForecastArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => {
            let mut config = EngineConfig::from_json_file(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config.validate()?;
            config
        }
        None => EngineConfig::load(settings)?,
    };

    let city_key = args.city.as_deref().unwrap_or(settings.default_city());
    let city = find_city(city_key).with_context(|| format!("unknown city '{city_key}'"))?;

    let observation = match args.temperature {
        Some(temperature) => Some(manual_observation(city, temperature, args.condition.as_deref(), args.description)?),
        None if args.fetch_weather => fetch_weather(settings, city).await,
        None => None,
    };

    let mut request = ForecastRequest::new(
        read_file(&args.sales)?,
        read_file(&args.writeoffs)?,
        resolve_analysis_date(args.analysis_date.as_deref())?,
    );
    request.observation = observation;
    request.city = Some(city.name.to_string());
    request.as_of = resolve_date(args.as_of.as_deref())?;
    request.horizon_days = args.horizon_days;

    let report = tokio::task::spawn_blocking(move || run_forecast(&request, &config))
        .await
        .context("forecast task failed")??;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), lines = report.forecast.len(), "wrote forecast report");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn manual_observation(
    city: &City,
    temperature: f64,
    condition: Option<&str>,
    description: Option<String>,
) -> anyhow::Result<WeatherObservation> {
    let condition = match condition {
        Some(raw) => serde_json::from_value::<ConditionTag>(serde_json::Value::String(raw.trim().to_lowercase()))
            .with_context(|| format!("unknown condition '{raw}'"))?,
        None => ConditionTag::Other,
    };
    Ok(WeatherObservation {
        location: city.name.to_string(),
        temperature,
        description: description.unwrap_or_default(),
        condition,
        humidity: 0.0,
        wind_speed: 0.0,
    }
    .normalized())
}

async fn fetch_weather(settings: &vanlav_core::config::Settings, city: &City) -> Option<WeatherObservation> {
    let provider = match HttpJsonWeatherProvider::from_settings(settings) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "weather provider not configured; using fallback");
            return None;
        }
    };
    match provider.fetch_observation(city).await {
        Ok(obs) => Some(obs),
        Err(e) => {
            tracing::warn!(city = city.key, error = %e, "weather lookup failed; using fallback");
            None
        }
    }
}

fn write_sample(args: SampleArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.days > 0, "--days must be at least 1");
    let as_of = resolve_date(args.as_of.as_deref())?.unwrap_or_else(|| Utc::now().date_naive());

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let data = sample::generate(as_of, args.days);
    sample::write_csv(&args.out_dir.join("sample_sales.csv"), &data.sales)?;
    sample::write_csv(&args.out_dir.join("sample_writeoffs.csv"), &data.writeoffs)?;

    tracing::info!(
        %as_of,
        days = args.days,
        sales_rows = data.sales.len(),
        writeoff_rows = data.writeoffs.len(),
        out_dir = %args.out_dir.display(),
        "wrote sample data"
    );
    Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn resolve_date(raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    raw.map(|s| parse_date(s).map_err(anyhow::Error::msg))
        .transpose()
}

fn resolve_analysis_date(raw: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --analysis-date '{s}'"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use vanlav_core::weather::CITIES;

    #[test]
    fn cli_parses_forecast_flags() {
        let cli = Cli::try_parse_from([
            "vanlav_worker",
            "forecast",
            "--sales",
            "s.csv",
            "--writeoffs",
            "w.xlsx",
            "--temperature",
            "-3",
            "--condition",
            "cold",
            "--horizon-days",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::Forecast(args) => {
                assert_eq!(args.temperature, Some(-3.0));
                assert_eq!(args.horizon_days, Some(2));
                assert_eq!(args.writeoffs, PathBuf::from("w.xlsx"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn condition_requires_temperature() {
        assert!(Cli::try_parse_from(["vanlav_worker", "forecast", "--sales", "s", "--writeoffs", "w", "--condition", "rain"]).is_err());
    }

    #[test]
    fn manual_observation_parses_condition() {
        let obs = manual_observation(&CITIES[1], 12.0, Some("Rain"), None).unwrap();
        assert_eq!(obs.condition, ConditionTag::Rain);
        assert_eq!(obs.location, "Кисловодск");
        assert_eq!(obs.description, "rain");
        assert!(manual_observation(&CITIES[0], 12.0, Some("sleet"), None).is_err());
    }

    #[test]
    fn forecast_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let data = sample::generate(as_of, 28);
        let sales = dir.path().join("sales.csv");
        let writeoffs = dir.path().join("writeoffs.csv");
        let output = dir.path().join("report.json");
        sample::write_csv(&sales, &data.sales).unwrap();
        sample::write_csv(&writeoffs, &data.writeoffs).unwrap();

        let args = ForecastArgs {
            sales,
            writeoffs,
            config: None,
            city: Some("kislovodsk".to_string()),
            temperature: Some(28.0),
            condition: Some("clear".to_string()),
            description: None,
            fetch_weather: false,
            as_of: None,
            horizon_days: None,
            analysis_date: Some("2026-07-01T06:00:00Z".to_string()),
            output: Some(output.clone()),
        };
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime
            .block_on(forecast(&vanlav_core::config::Settings::default(), args))
            .unwrap();

        let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["weather"]["city"], "Кисловодск");
        assert_eq!(report["weather_fallback"], false);
        assert_eq!(report["as_of_date"], "2026-06-30");
        assert_eq!(report["forecast"].as_array().unwrap().len(), sample::PRODUCTS.len());
    }
}
