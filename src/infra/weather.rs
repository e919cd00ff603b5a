//! Client for an Open-Meteo compatible daily weather API.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use crop_health_engine::fetch::{HttpClient, fetch_json};
use crop_health_engine::services::{
    DailyForecast, DailyObservation, GeoPoint, WeatherProvider, WeatherSummary,
};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::endpoint;

const HISTORY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";
const FORECAST_FIELDS: &str =
    "temperature_2m_mean,temperature_2m_max,temperature_2m_min,precipitation_sum,relative_humidity_2m_mean";
const DEFAULT_HUMIDITY_PERCENT: f64 = 60.0;

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: DailySeries,
}

/// Column-oriented daily values; gaps are `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    temperature_2m_mean: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    relative_humidity_2m_mean: Vec<Option<f64>>,
}

fn at(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

impl DailySeries {
    /// Days with both temperature extremes reported.
    fn observations(&self) -> Vec<DailyObservation> {
        self.time
            .iter()
            .enumerate()
            .filter_map(|(i, &date)| {
                Some(DailyObservation {
                    date,
                    max_c: at(&self.temperature_2m_max, i)?,
                    min_c: at(&self.temperature_2m_min, i)?,
                    precipitation_mm: at(&self.precipitation_sum, i).unwrap_or(0.0),
                })
            })
            .collect()
    }

    fn forecast(&self) -> Vec<DailyForecast> {
        self.time
            .iter()
            .enumerate()
            .filter_map(|(i, &date)| {
                let temperature_c = at(&self.temperature_2m_mean, i).or_else(|| {
                    Some((at(&self.temperature_2m_max, i)? + at(&self.temperature_2m_min, i)?) / 2.0)
                })?;
                Some(DailyForecast {
                    date,
                    temperature_c,
                    precipitation_mm: at(&self.precipitation_sum, i).unwrap_or(0.0),
                    humidity_percent: at(&self.relative_humidity_2m_mean, i)
                        .unwrap_or(DEFAULT_HUMIDITY_PERCENT),
                })
            })
            .collect()
    }
}

pub struct HttpWeatherProvider {
    client: Arc<dyn HttpClient>,
    base_url: Url,
}

impl HttpWeatherProvider {
    pub fn new(client: Arc<dyn HttpClient>, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn daily_url(&self, location: GeoPoint, fields: &str) -> Result<Url> {
        let mut url = endpoint(&self.base_url, &["v1", "forecast"])?;
        url.query_pairs_mut()
            .append_pair("latitude", &location.lat.to_string())
            .append_pair("longitude", &location.lon.to_string())
            .append_pair("daily", fields)
            .append_pair("timezone", "UTC");
        Ok(url)
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn weather_summary(
        &self,
        location: GeoPoint,
        base_temp_c: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeatherSummary> {
        let mut url = self.daily_url(location, HISTORY_FIELDS)?;
        url.query_pairs_mut()
            .append_pair("start_date", &start.to_string())
            .append_pair("end_date", &end.to_string());

        let body: DailyResponse = fetch_json(self.client.as_ref(), url).await?;
        let observations = body.daily.observations();
        debug!(days = observations.len(), %start, %end, "Daily weather received");

        WeatherSummary::from_daily(&observations, base_temp_c)
            .ok_or_else(|| anyhow!("no daily weather reported between {start} and {end}"))
    }

    async fn forecast(&self, location: GeoPoint, days: u32) -> Result<Vec<DailyForecast>> {
        let mut url = self.daily_url(location, FORECAST_FIELDS)?;
        url.query_pairs_mut()
            .append_pair("forecast_days", &days.to_string());

        let body: DailyResponse = fetch_json(self.client.as_ref(), url).await?;
        Ok(body.daily.forecast())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"daily": {
        "time": ["2024-06-01", "2024-06-02", "2024-06-03"],
        "temperature_2m_max": [28.0, null, 30.0],
        "temperature_2m_min": [14.0, 15.0, 16.0],
        "precipitation_sum": [0.0, 12.5, null]
    }}"#;

    #[test]
    fn test_observations_skip_incomplete_days() {
        let body: DailyResponse = serde_json::from_str(BODY).unwrap();
        let obs = body.daily.observations();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].max_c, 30.0);
        assert_eq!(obs[1].precipitation_mm, 0.0);
    }

    #[test]
    fn test_forecast_falls_back_to_extremes_mean() {
        let body: DailyResponse = serde_json::from_str(BODY).unwrap();
        let days = body.daily.forecast();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].temperature_c, 21.0);
        assert_eq!(days[0].humidity_percent, DEFAULT_HUMIDITY_PERCENT);
    }
}
