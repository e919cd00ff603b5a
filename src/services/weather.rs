//! Trait and types for a weather history provider.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureExtremes {
    pub min_c: f64,
    pub max_c: f64,
}

/// Aggregate weather over a date range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub average_temp_c: f64,
    pub total_rainfall_mm: f64,
    pub growing_degree_days: f64,
    pub extremes: TemperatureExtremes,
    /// Number of days the summary covers.
    pub days: u32,
}

impl WeatherSummary {
    /// Mean heat accumulation per day, or `None` for an empty summary.
    pub fn daily_gdd(&self) -> Option<f64> {
        if self.days == 0 || !self.growing_degree_days.is_finite() {
            None
        } else {
            Some(self.growing_degree_days / self.days as f64)
        }
    }

    /// Summarises daily observations, accumulating GDD above `base_temp_c`
    /// with the simple averaging method `max(0, (Tmax + Tmin) / 2 - Tbase)`.
    pub fn from_daily(observations: &[DailyObservation], base_temp_c: f64) -> Option<Self> {
        if observations.is_empty() {
            return None;
        }

        let mut gdd = 0.0;
        let mut rain = 0.0;
        let mut temp_sum = 0.0;
        let mut min_c = f64::INFINITY;
        let mut max_c = f64::NEG_INFINITY;

        for obs in observations {
            let mean = (obs.max_c + obs.min_c) / 2.0;
            gdd += (mean - base_temp_c).max(0.0);
            rain += obs.precipitation_mm.max(0.0);
            temp_sum += mean;
            min_c = min_c.min(obs.min_c);
            max_c = max_c.max(obs.max_c);
        }

        Some(Self {
            average_temp_c: temp_sum / observations.len() as f64,
            total_rainfall_mm: rain,
            growing_degree_days: gdd,
            extremes: TemperatureExtremes { min_c, max_c },
            days: observations.len() as u32,
        })
    }
}

/// A single day of observed weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub min_c: f64,
    pub max_c: f64,
    pub precipitation_mm: f64,
}

/// A single day of forecast weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub humidity_percent: f64,
}

/// Abstraction over a weather history and forecast provider.
#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Summarises observed weather at `location` between `start` and `end`
    /// inclusive, accumulating growing degree days above `base_temp_c`.
    async fn weather_summary(
        &self,
        location: GeoPoint,
        base_temp_c: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeatherSummary>;

    /// Returns up to `days` of forecast starting tomorrow.
    async fn forecast(&self, location: GeoPoint, days: u32) -> Result<Vec<DailyForecast>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn obs(day: u32, min_c: f64, max_c: f64, rain: f64) -> DailyObservation {
        DailyObservation {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            min_c,
            max_c,
            precipitation_mm: rain,
        }
    }

    #[test]
    fn test_from_daily_accumulates_gdd() {
        let days = [obs(1, 12.0, 28.0, 0.0), obs(2, 6.0, 12.0, 4.5), obs(3, 15.0, 31.0, 10.0)];
        let summary = WeatherSummary::from_daily(&days, 10.0).unwrap();

        // 10 + 0 + 13
        assert_abs_diff_eq!(summary.growing_degree_days, 23.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.total_rainfall_mm, 14.5, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.average_temp_c, (20.0 + 9.0 + 23.0) / 3.0, epsilon = 1e-12);
        assert_eq!(summary.extremes.min_c, 6.0);
        assert_eq!(summary.extremes.max_c, 31.0);
        assert_eq!(summary.days, 3);
        assert_abs_diff_eq!(summary.daily_gdd().unwrap(), 23.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_daily_empty() {
        assert!(WeatherSummary::from_daily(&[], 10.0).is_none());
    }
}
