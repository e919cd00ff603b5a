//! Results produced by the growth stage detector.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::definitions::CropStageDefinition;

/// Which collaborator data backed an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Full,
    SatelliteOnly,
    WeatherOnly,
    PlantingDateOnly,
}

impl DataQuality {
    pub fn from_availability(satellite: bool, weather: bool) -> Self {
        match (satellite, weather) {
            (true, true) => DataQuality::Full,
            (true, false) => DataQuality::SatelliteOnly,
            (false, true) => DataQuality::WeatherOnly,
            (false, false) => DataQuality::PlantingDateOnly,
        }
    }

    /// Multiplier applied to confidence for the missing inputs.
    pub fn confidence_factor(&self) -> f64 {
        match self {
            DataQuality::Full => 1.0,
            DataQuality::SatelliteOnly => 0.9,
            DataQuality::WeatherOnly => 0.8,
            DataQuality::PlantingDateOnly => 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropStageDetection {
    pub field_id: String,
    pub crop_type: String,
    pub current_stage: CropStageDefinition,
    pub stage_index: usize,
    pub stage_confidence: f64,
    pub days_in_stage: i64,
    pub expected_stage_duration: i64,
    pub stage_transition_probability: f64,
    /// Latest cloud-free NDVI, when satellite data was available.
    pub current_ndvi: Option<f64>,
    /// NDVI change per day over the observation window.
    pub ndvi_trend: Option<f64>,
    pub days_since_planting: i64,
    pub data_quality: DataQuality,
    pub detected_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConditions {
    pub avg_ndvi: Option<f64>,
    pub avg_temperature: Option<f64>,
    pub total_precipitation: Option<f64>,
    pub growing_degree_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub stage: String,
    pub start_date: NaiveDate,
    /// Weather-adjusted length of the stage window in days.
    pub duration_days: i64,
    pub conditions: StageConditions,
    pub detection_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropStageHistory {
    pub field_id: String,
    pub crop_type: String,
    pub planting_date: NaiveDate,
    pub current_date: NaiveDate,
    pub stage_history: Vec<StageHistoryEntry>,
    pub projected_harvest_date: NaiveDate,
    pub season_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransitionPrediction {
    pub current_stage: String,
    pub next_stage: String,
    pub transition_probability: f64,
    pub expected_transition_date: NaiveDate,
    pub confidence_interval: ConfidenceInterval,
    pub triggering_factors: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub data_quality: DataQuality,
}

/// Flat CSV row for a [`CropStageDetection`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub detected_on: NaiveDate,
    pub field_id: String,
    pub crop_type: String,
    pub stage: String,
    pub stage_confidence: f64,
    pub days_since_planting: i64,
    pub days_in_stage: i64,
    pub expected_stage_duration: i64,
    pub stage_transition_probability: f64,
    pub current_ndvi: Option<f64>,
    pub ndvi_trend: Option<f64>,
    pub data_quality: DataQuality,
}

impl From<&CropStageDetection> for StageRecord {
    fn from(d: &CropStageDetection) -> Self {
        Self {
            detected_on: d.detected_on,
            field_id: d.field_id.clone(),
            crop_type: d.crop_type.clone(),
            stage: d.current_stage.name.clone(),
            stage_confidence: d.stage_confidence,
            days_since_planting: d.days_since_planting,
            days_in_stage: d.days_in_stage,
            expected_stage_duration: d.expected_stage_duration,
            stage_transition_probability: d.stage_transition_probability,
            current_ndvi: d.current_ndvi,
            ndvi_trend: d.ndvi_trend,
            data_quality: d.data_quality,
        }
    }
}
