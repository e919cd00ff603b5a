//! CLI entry point for the crop health engine.
//!
//! Provides subcommands for computing indices and field health from band
//! values, summarising NDVI rasters, and tracking growth stages against the
//! configured satellite and weather services.

mod infra;

use crate::infra::build_providers;
use crate::infra::satellite::HttpSatelliteProvider;
use crate::infra::weather::HttpWeatherProvider;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use crop_health_engine::{
    analyzers::{
        health::HealthAssessor,
        irrigation::{SoilMoisture, optimize_irrigation},
        report::{FieldAnalyzer, FieldHealthRecord},
        trend::analyze_stress_pattern,
    },
    config::{EngineConfig, ProviderConfig},
    indices::{IndexCalculator, SpectralBands},
    output::{append_record, print_json, print_pretty},
    services::{GeoPoint, SatelliteProvider, WeatherProvider},
    stages::{GrowthStageDetector, StageRecord, StageTable},
    stats::calculate_ndvi_statistics,
    StageError,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type HttpDetector = GrowthStageDetector<HttpSatelliteProvider, HttpWeatherProvider>;

#[derive(Parser)]
#[command(name = "crop_health_engine")]
#[command(about = "Crop health and growth-stage analytics", long_about = None)]
struct Cli {
    /// Engine parameter overrides (JSON file)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Crop stage table (JSON file); the built-in table when omitted
    #[arg(long, global = true)]
    stages: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct BandArgs {
    /// Red reflectance
    #[arg(long)]
    red: f64,

    /// Near-infrared reflectance
    #[arg(long)]
    nir: f64,

    #[arg(long)]
    blue: Option<f64>,

    #[arg(long)]
    green: Option<f64>,

    /// Shortwave infrared near 1.6um
    #[arg(long)]
    swir1: Option<f64>,

    /// Shortwave infrared near 2.2um
    #[arg(long)]
    swir2: Option<f64>,
}

impl BandArgs {
    fn bands(&self) -> SpectralBands {
        SpectralBands {
            red: self.red,
            nir: self.nir,
            blue: self.blue,
            green: self.green,
            swir1: self.swir1,
            swir2: self.swir2,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct FieldArgs {
    field_id: String,

    /// Crop type, e.g. "corn"
    #[arg(long)]
    crop: String,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
}

impl FieldArgs {
    fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute vegetation indices and a health assessment from band values
    Indices {
        #[command(flatten)]
        bands: BandArgs,
    },
    /// Summarise an NDVI pixel file (JSON array, null for masked pixels)
    Stats {
        #[arg(value_name = "FILE")]
        pixels: String,
    },
    /// Assess a field and append the result to a CSV
    Assess {
        field_id: String,

        #[command(flatten)]
        bands: BandArgs,

        /// NDVI pixel file (JSON array)
        #[arg(long, conflicts_with = "scene_date")]
        pixels: Option<String>,

        /// Fetch NDVI pixels for this scene date from the satellite service
        #[arg(long)]
        scene_date: Option<NaiveDate>,

        /// CSV file to append results to
        #[arg(short, long, default_value = "field_health.csv")]
        output: String,
    },
    /// List the crops and stages in the stage table
    Crops,
    /// Detect the current growth stage of a field
    Detect {
        #[command(flatten)]
        field: FieldArgs,

        #[arg(long)]
        planting_date: NaiveDate,
    },
    /// Reconstruct the stage history and projected harvest of a field
    History {
        #[command(flatten)]
        field: FieldArgs,

        #[arg(long)]
        planting_date: NaiveDate,
    },
    /// Predict the transition out of the field's current stage
    Predict {
        #[command(flatten)]
        field: FieldArgs,

        /// Current stage name, e.g. "vegetative"
        #[arg(long)]
        stage: String,

        #[arg(long)]
        planting_date: Option<NaiveDate>,
    },
    /// Analyse stress patterns in a field's recent NDVI history
    Pattern {
        field_id: String,

        /// Days of history to analyse
        #[arg(long, default_value_t = 90)]
        days: i64,
    },
    /// Plan irrigation from soil moisture and the weather forecast
    Irrigate {
        #[command(flatten)]
        field: FieldArgs,

        /// Current stage name, e.g. "flowering"
        #[arg(long)]
        stage: String,

        #[arg(long, default_value_t = 0.3)]
        soil_moisture: f64,

        #[arg(long, default_value_t = 0.4)]
        field_capacity: f64,

        #[arg(long, default_value_t = 0.15)]
        wilting_point: f64,
    },
    /// Detect stages for every field in a CSV concurrently
    DetectAll {
        /// CSV with columns field_id, crop_type, lat, lon, planting_date
        #[arg(value_name = "FIELDS_CSV")]
        fields: String,

        /// CSV file to append detections to
        #[arg(short, long, default_value = "stages.csv")]
        output: String,

        /// Maximum number of fields processed at once
        #[arg(short, long, default_value_t = 5)]
        concurrency: usize,
    },
}

/// One row of the `detect-all` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldRow {
    field_id: String,
    crop_type: String,
    lat: f64,
    lon: f64,
    planting_date: NaiveDate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/crop_health_engine.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("crop_health_engine.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let table = Arc::new(match &cli.stages {
        Some(path) => StageTable::load(path)?,
        None => StageTable::builtin(),
    });
    table.check_heat_bound(config.detector.heat_bound())?;

    match cli.command {
        Commands::Indices { bands } => {
            let indices = IndexCalculator::new(config.indices.clone()).calculate(&bands.bands());
            let assessment = HealthAssessor::new(config.health.clone()).assess(&indices);
            print_pretty(&indices);
            print_json(&serde_json::json!({
                "indices": indices,
                "assessment": assessment,
            }))?;
        }
        Commands::Stats { pixels } => {
            let values = read_pixels(&pixels)?;
            let stats = calculate_ndvi_statistics(&values);
            info!(
                valid = stats.valid_pixels,
                cloudy = stats.cloudy_pixels,
                cloud_pct = stats.cloud_pct(),
                "NDVI statistics computed"
            );
            print_json(&stats)?;
        }
        Commands::Assess {
            field_id,
            bands,
            pixels,
            scene_date,
            output,
        } => {
            let values = match (pixels, scene_date) {
                (Some(path), _) => Some(read_pixels(&path)?),
                (None, Some(date)) => {
                    let (satellite, _) = build_providers(&ProviderConfig::from_env()?)?;
                    Some(satellite.ndvi_pixels(&field_id, date).await?)
                }
                (None, None) => None,
            };

            let analyzer = FieldAnalyzer::new(
                IndexCalculator::new(config.indices.clone()),
                HealthAssessor::new(config.health.clone()),
            );
            let report = analyzer.assess(&field_id, &bands.bands(), values.as_deref());
            print_json(&report)?;
            append_record(&output, &FieldHealthRecord::from(&report))?;
            info!(field_id, output, "Field assessment recorded");
        }
        Commands::Crops => {
            for profile in table.profiles() {
                info!(
                    crop = %profile.crop_type,
                    base_temperature_c = profile.base_temperature_c,
                    typical_season_days = profile.typical_season_days(),
                    "Crop"
                );
                for stage in &profile.stages {
                    info!(
                        crop = %profile.crop_type,
                        stage = %stage.name,
                        display_name = %stage.display_name,
                        typical_days = stage.typical_duration_days,
                        "Stage"
                    );
                }
            }
        }
        Commands::Detect {
            field,
            planting_date,
        } => {
            let detector = http_detector(&config, table)?;
            let detection = detector
                .detect_crop_stage(
                    &field.field_id,
                    &field.crop,
                    field.location(),
                    planting_date,
                    None,
                )
                .await?;
            print_json(&detection)?;
        }
        Commands::History {
            field,
            planting_date,
        } => {
            let detector = http_detector(&config, table)?;
            let history = detector
                .get_crop_stage_history(&field.field_id, &field.crop, field.location(), planting_date)
                .await?;
            print_json(&history)?;
        }
        Commands::Predict {
            field,
            stage,
            planting_date,
        } => {
            let detector = http_detector(&config, table)?;
            let prediction = detector
                .predict_stage_transition(
                    &field.field_id,
                    &field.crop,
                    field.location(),
                    &stage,
                    planting_date,
                )
                .await?;
            print_json(&prediction)?;
        }
        Commands::Pattern { field_id, days } => {
            let (satellite, _) = build_providers(&ProviderConfig::from_env()?)?;
            let today = Utc::now().date_naive();
            let samples = satellite
                .ndvi_series(&field_id, None, today - Duration::days(days), today)
                .await?;
            let analysis = analyze_stress_pattern(&samples)?;
            print_json(&analysis)?;
        }
        Commands::Irrigate {
            field,
            stage,
            soil_moisture,
            field_capacity,
            wilting_point,
        } => {
            let profile = table.crop(&field.crop)?;
            let definition = profile
                .stage_index(&stage)
                .map(|i| &profile.stages[i])
                .ok_or_else(|| StageError::InvalidStageName {
                    crop_type: profile.crop_type.clone(),
                    stage: stage.clone(),
                })?;

            let (_, weather) = build_providers(&ProviderConfig::from_env()?)?;
            let forecast = match weather.forecast(field.location(), 7).await {
                Ok(days) => days,
                Err(e) => {
                    warn!(error = %e, "Forecast unavailable, planning without it");
                    Vec::new()
                }
            };

            let moisture = SoilMoisture {
                soil_moisture,
                field_capacity,
                wilting_point,
            };
            let plan = optimize_irrigation(&moisture, definition.moisture_requirement, &forecast);
            print_json(&plan)?;
        }
        Commands::DetectAll {
            fields,
            output,
            concurrency,
        } => {
            let detector = Arc::new(http_detector(&config, table)?);
            detect_all(detector, &fields, &output, concurrency).await?;
        }
    }

    Ok(())
}

/// Builds a detector backed by the HTTP services named in the environment.
fn http_detector(config: &EngineConfig, table: Arc<StageTable>) -> Result<HttpDetector> {
    let providers = ProviderConfig::from_env()?;
    let (satellite, weather) = build_providers(&providers)?;
    Ok(GrowthStageDetector::new(table, satellite, weather)
        .with_params(config.detector.clone())
        .with_timeout(providers.timeout))
}

/// Reads a JSON array of NDVI values, mapping `null` to NaN.
fn read_pixels(path: &str) -> Result<Vec<f64>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read pixels '{path}'"))?;
    let values: Vec<Option<f64>> = serde_json::from_str(&content)
        .with_context(|| format!("'{path}' is not a JSON array of numbers"))?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Detects the stage of every field in `fields_path` concurrently and appends
/// one row per detection to `output`. Fields share nothing but the detector.
#[tracing::instrument(skip(detector))]
async fn detect_all(
    detector: Arc<HttpDetector>,
    fields_path: &str,
    output: &str,
    concurrency: usize,
) -> Result<()> {
    let mut reader = csv::Reader::from_path(fields_path)
        .with_context(|| format!("failed to open field list '{fields_path}'"))?;
    let fields: Vec<FieldRow> = reader.deserialize().collect::<Result<_, _>>()?;

    info!(field_count = fields.len(), "Fields ready for stage detection");

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = vec![];

    for field in fields {
        let sem = semaphore.clone();
        let detector = detector.clone();

        let field_span = tracing::info_span!(
            "detect_field",
            field_id = %field.field_id,
            crop_type = %field.crop_type,
        );

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire().await?;
                let detection = detector
                    .detect_crop_stage(
                        &field.field_id,
                        &field.crop_type,
                        GeoPoint::new(field.lat, field.lon),
                        field.planting_date,
                        None,
                    )
                    .await?;
                info!(stage = %detection.current_stage.name, "Field processed successfully");
                Ok::<_, anyhow::Error>(StageRecord::from(&detection))
            }
            .instrument(field_span),
        );

        tasks.push(task);
    }

    let mut written = 0usize;
    let mut failed = 0usize;
    for task in tasks {
        match task.await {
            Ok(Ok(record)) => {
                append_record(output, &record)?;
                written += 1;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Stage detection failed");
                failed += 1;
            }
            Err(e) => {
                error!(error = %e, "Stage detection task aborted");
                failed += 1;
            }
        }
    }

    info!(written, failed, output, "Finished stage detection");
    Ok(())
}
