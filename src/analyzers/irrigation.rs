//! Irrigation advice from a soil water balance and the week's forecast.
//!
//! | Available water | Urgency  | Depth (mm)                    | Timing         |
//! |-----------------|----------|-------------------------------|----------------|
//! | < 0.3           | critical | (capacity - soil) * 1000      | immediate      |
//! | < 0.5           | high     | (capacity - soil) * 800       | within 24h     |
//! | < 0.7           | moderate | adjusted requirement * 600    | within 3 days  |
//! | otherwise       | low      | 0                             | monitor        |
//!
//! Expected rainfall is subtracted from the depth. When it covers more than
//! 80% of the depth the application is deferred.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyzers::utility::mean;
use crate::services::DailyForecast;
use crate::stages::MoistureRequirement;

/// Forecast days considered.
pub const FORECAST_HORIZON_DAYS: usize = 7;

const DEFAULT_TEMPERATURE_C: f64 = 25.0;
const DEFAULT_HUMIDITY_PERCENT: f64 = 60.0;

/// Volumetric soil water content, all as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilMoisture {
    pub soil_moisture: f64,
    pub field_capacity: f64,
    pub wilting_point: f64,
}

impl Default for SoilMoisture {
    fn default() -> Self {
        Self {
            soil_moisture: 0.3,
            field_capacity: 0.4,
            wilting_point: 0.15,
        }
    }
}

impl SoilMoisture {
    /// Share of plant-available water remaining, 0 when the soil holds none.
    pub fn available_fraction(&self) -> f64 {
        let available = (self.soil_moisture - self.wilting_point).max(0.0);
        let max_available = self.field_capacity - self.wilting_point;
        if max_available > 0.0 {
            available / max_available
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Urgency::Low => "low",
            Urgency::Moderate => "moderate",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Immediate,
    Within24h,
    Within3Days,
    Monitor,
    DelayForRain,
}

/// Forecast conditions over the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherFactors {
    pub expected_rainfall_mm: f64,
    pub avg_temperature_c: f64,
    pub avg_humidity_percent: f64,
    pub evapotranspiration_factor: f64,
}

impl WeatherFactors {
    fn from_forecast(forecast: &[DailyForecast]) -> Self {
        let window = &forecast[..forecast.len().min(FORECAST_HORIZON_DAYS)];
        let (rain, temp, humidity) = if window.is_empty() {
            (0.0, DEFAULT_TEMPERATURE_C, DEFAULT_HUMIDITY_PERCENT)
        } else {
            let temps: Vec<f64> = window.iter().map(|d| d.temperature_c).collect();
            let hums: Vec<f64> = window.iter().map(|d| d.humidity_percent).collect();
            (
                window.iter().map(|d| d.precipitation_mm.max(0.0)).sum(),
                mean(&temps),
                mean(&hums),
            )
        };

        let mut et = 1.0;
        if temp > 30.0 {
            et += 0.2;
        } else if temp < 15.0 {
            et -= 0.2;
        }
        if humidity > 80.0 {
            et -= 0.1;
        } else if humidity < 40.0 {
            et += 0.1;
        }

        Self {
            expected_rainfall_mm: rain,
            avg_temperature_c: temp,
            avg_humidity_percent: humidity,
            evapotranspiration_factor: et,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationPlan {
    pub irrigation_needed: bool,
    pub recommended_amount_mm: f64,
    pub urgency: Urgency,
    pub timing: Timing,
    /// Available-water fraction; lower is drier.
    pub available_water: f64,
    pub base_requirement: f64,
    pub adjusted_requirement: f64,
    pub weather: WeatherFactors,
    pub efficiency_tips: Vec<String>,
}

/// Plans irrigation for a field in a stage with the given water demand.
pub fn optimize_irrigation(
    moisture: &SoilMoisture,
    requirement: MoistureRequirement,
    forecast: &[DailyForecast],
) -> IrrigationPlan {
    let available = moisture.available_fraction();
    let weather = WeatherFactors::from_forecast(forecast);
    let base_requirement = requirement.water_demand();
    let adjusted_requirement = base_requirement * weather.evapotranspiration_factor;
    let deficit = (moisture.field_capacity - moisture.soil_moisture).max(0.0);

    let (mut urgency, mut amount, mut timing) = match available {
        a if a < 0.3 => (Urgency::Critical, deficit * 1000.0, Timing::Immediate),
        a if a < 0.5 => (Urgency::High, deficit * 800.0, Timing::Within24h),
        a if a < 0.7 => (
            Urgency::Moderate,
            adjusted_requirement * 600.0,
            Timing::Within3Days,
        ),
        _ => (Urgency::Low, 0.0, Timing::Monitor),
    };

    let rain = weather.expected_rainfall_mm;
    if amount > 0.0 && rain > amount * 0.8 {
        amount = 0.0;
        timing = Timing::DelayForRain;
        urgency = Urgency::Low;
    } else {
        amount = (amount - rain).max(0.0);
    }

    let mut efficiency_tips = Vec::new();
    if urgency >= Urgency::High {
        efficiency_tips.push("Apply during early morning or evening to reduce evaporation".to_string());
    }
    if weather.avg_temperature_c > 30.0 {
        efficiency_tips.push("Consider mulching to retain soil moisture".to_string());
    }
    if rain > 10.0 {
        efficiency_tips.push("Delay irrigation until after expected rainfall".to_string());
    }

    IrrigationPlan {
        irrigation_needed: amount > 0.0,
        recommended_amount_mm: (amount * 10.0).round() / 10.0,
        urgency,
        timing,
        available_water: available,
        base_requirement,
        adjusted_requirement,
        weather,
        efficiency_tips,
    }
}
