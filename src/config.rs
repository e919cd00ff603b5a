//! Tunable engine parameters and collaborator settings.
//!
//! Every numeric constant the calculators, assessor and detector rely on lives
//! here so it can be tuned per crop or region without touching code. All
//! structs default to the built-in values, and a JSON file only needs to name
//! the fields it overrides:
//!
//! ```json
//! {
//!   "indices": { "soil_adjustment": 0.5 },
//!   "health": { "ndvi_cut_points": [0.7, 0.45, 0.3, 0.15] },
//!   "detector": { "max_cloud_cover_percent": 25.0 }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indices: IndexParameters,
    pub health: HealthThresholds,
    pub detector: DetectorParams,
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config '{path}'"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config '{path}'"))?;
        Ok(config)
    }
}

/// Constants used by the vegetation index formulas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParameters {
    /// SAVI soil brightness correction factor (L).
    pub soil_adjustment: f64,
    /// GNDVI ≈ NDVI × scale when no green band is available.
    pub gndvi_scale: f64,
    /// NDWI ≈ NDVI − offset when no SWIR1 band is available.
    pub ndwi_offset: f64,
    /// NDMI ≈ NDVI − offset when no SWIR2 band is available.
    pub ndmi_offset: f64,
    /// NDVI of bare soil, the zero point of fractional cover.
    pub bare_soil_ndvi: f64,
    /// NDVI of full canopy, the one point of fractional cover.
    pub full_cover_ndvi: f64,
    /// Upper bound of the leaf area estimate.
    pub max_lai: f64,
}

impl Default for IndexParameters {
    fn default() -> Self {
        Self {
            soil_adjustment: 0.5,
            gndvi_scale: 0.9,
            ndwi_offset: 0.3,
            ndmi_offset: 0.35,
            bare_soil_ndvi: 0.2,
            full_cover_ndvi: 0.86,
            max_lai: 7.0,
        }
    }
}

/// Threshold rule for a single stress indicator.
///
/// A value below `threshold` is a breach. Its severity grows linearly from 0 at
/// the threshold to 1 at `floor`, and the indicator contributes between half
/// and all of its `weight` to the stress score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRule {
    pub threshold: f64,
    pub floor: f64,
    pub weight: f64,
}

impl IndicatorRule {
    pub const fn new(threshold: f64, floor: f64, weight: f64) -> Self {
        Self {
            threshold,
            floor,
            weight,
        }
    }
}

/// Cut points and weights for the health and stress assessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// NDVI lower bounds for excellent, good, moderate and poor, descending.
    pub ndvi_cut_points: [f64; 4],
    /// Normalised stress-score lower bounds for moderate, high and severe.
    /// Any positive score below the first is low.
    pub stress_cut_points: [f64; 3],
    /// Distance from an NDVI cut point at which boundary confidence saturates.
    pub boundary_margin: f64,
    pub ndvi: IndicatorRule,
    pub savi: IndicatorRule,
    pub evi: IndicatorRule,
    pub gndvi: IndicatorRule,
    pub lai: IndicatorRule,
    pub fvc: IndicatorRule,
    pub ndwi: IndicatorRule,
    pub ndmi: IndicatorRule,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            ndvi_cut_points: [0.7, 0.45, 0.3, 0.15],
            stress_cut_points: [0.15, 0.35, 0.6],
            boundary_margin: 0.1,
            ndvi: IndicatorRule::new(0.4, 0.0, 3.0),
            savi: IndicatorRule::new(0.3, 0.0, 1.5),
            evi: IndicatorRule::new(0.25, 0.0, 1.5),
            gndvi: IndicatorRule::new(0.35, 0.0, 1.0),
            lai: IndicatorRule::new(1.0, 0.0, 1.5),
            fvc: IndicatorRule::new(0.4, 0.0, 1.0),
            ndwi: IndicatorRule::new(0.05, -0.2, 2.0),
            ndmi: IndicatorRule::new(0.1, -0.2, 1.0),
        }
    }
}

/// Longest history window the detector will request.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Upper bound on `max_heat_adjustment`; at 1.0 a stage could stretch forever.
pub const MAX_HEAT_ADJUSTMENT: f64 = 0.9;

/// Parameters for the growth stage detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Satellite samples above this cloud cover are ignored.
    pub max_cloud_cover_percent: f64,
    /// Largest relative change heat accumulation may apply to a stage length.
    pub max_heat_adjustment: f64,
    /// Days of satellite history used for the current NDVI and its trend.
    pub ndvi_window_days: i64,
    /// Days of recent weather used for transition forecasts.
    pub weather_window_days: i64,
    /// Timeout applied to each collaborator call, in seconds.
    pub provider_timeout_secs: u64,
    /// Weight of the calendar/heat estimate when matching a stage.
    pub time_weight: f64,
    /// Weight of the NDVI fit when matching a stage.
    pub ndvi_weight: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            max_cloud_cover_percent: 30.0,
            max_heat_adjustment: 0.25,
            ndvi_window_days: 30,
            weather_window_days: 14,
            provider_timeout_secs: 10,
            time_weight: 0.6,
            ndvi_weight: 0.4,
        }
    }
}

impl DetectorParams {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// `max_heat_adjustment` bounded to `[0, MAX_HEAT_ADJUSTMENT]`.
    pub fn heat_bound(&self) -> f64 {
        if self.max_heat_adjustment.is_finite() {
            self.max_heat_adjustment.clamp(0.0, MAX_HEAT_ADJUSTMENT)
        } else {
            0.0
        }
    }

    pub fn ndvi_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.ndvi_window_days.clamp(0, MAX_WINDOW_DAYS))
    }

    pub fn weather_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.weather_window_days.clamp(0, MAX_WINDOW_DAYS))
    }
}

/// Endpoints and credentials for the HTTP satellite and weather collaborators.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub satellite_url: String,
    pub satellite_api_key: Option<String>,
    pub weather_url: String,
    pub weather_api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Reads the provider settings from the environment.
    ///
    /// `SATELLITE_API_URL` and `WEATHER_API_URL` are required; the API keys
    /// are optional and `PROVIDER_TIMEOUT_SECS` defaults to 10.
    pub fn from_env() -> Result<Self> {
        let satellite_url =
            std::env::var("SATELLITE_API_URL").context("SATELLITE_API_URL must be set")?;
        let weather_url =
            std::env::var("WEATHER_API_URL").context("WEATHER_API_URL must be set")?;
        let timeout_secs = match std::env::var("PROVIDER_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("PROVIDER_TIMEOUT_SECS is not a number: '{raw}'"))?,
            Err(_) => DetectorParams::default().provider_timeout_secs,
        };

        Ok(Self {
            satellite_url,
            satellite_api_key: std::env::var("SATELLITE_API_KEY").ok(),
            weather_url,
            weather_api_key: std::env::var("WEATHER_API_KEY").ok(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
