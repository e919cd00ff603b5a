//! Client for the imagery service's per-field NDVI endpoints.
//!
//! - `GET {base}/fields/{id}/ndvi?start=&end=[&bbox=]` returns
//!   `{"samples": [{"date", "ndvi", "cloud_cover"}]}`
//! - `GET {base}/fields/{id}/ndvi/pixels?date=` returns `{"pixels": [...]}`
//!   where masked pixels are `null`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use crop_health_engine::fetch::{HttpClient, fetch_json};
use crop_health_engine::services::{FieldBounds, NdviSample, SatelliteProvider};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::endpoint;

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    samples: Vec<SampleDto>,
}

#[derive(Debug, Deserialize)]
struct SampleDto {
    date: NaiveDate,
    ndvi: f64,
    #[serde(default)]
    cloud_cover: f64,
}

#[derive(Debug, Deserialize)]
struct PixelsResponse {
    pixels: Vec<Option<f64>>,
}

impl From<SampleDto> for NdviSample {
    fn from(s: SampleDto) -> Self {
        NdviSample {
            date: s.date,
            ndvi: s.ndvi,
            cloud_cover_percent: s.cloud_cover,
        }
    }
}

/// `min_lon,min_lat,max_lon,max_lat` of the polygon ring.
fn bbox(bounds: &FieldBounds) -> Option<String> {
    let first = bounds.ring.first()?;
    let (mut min_lon, mut min_lat, mut max_lon, mut max_lat) =
        (first.lon, first.lat, first.lon, first.lat);
    for p in &bounds.ring {
        min_lon = min_lon.min(p.lon);
        max_lon = max_lon.max(p.lon);
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
    }
    Some(format!("{min_lon},{min_lat},{max_lon},{max_lat}"))
}

pub struct HttpSatelliteProvider {
    client: Arc<dyn HttpClient>,
    base_url: Url,
}

impl HttpSatelliteProvider {
    pub fn new(client: Arc<dyn HttpClient>, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }
}

#[async_trait]
impl SatelliteProvider for HttpSatelliteProvider {
    async fn ndvi_series(
        &self,
        field_id: &str,
        bounds: Option<&FieldBounds>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NdviSample>> {
        let mut url = endpoint(&self.base_url, &["fields", field_id, "ndvi"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("start", &start.to_string())
                .append_pair("end", &end.to_string());
            if let Some(bbox) = bounds.and_then(bbox) {
                query.append_pair("bbox", &bbox);
            }
        }

        let body: SeriesResponse = fetch_json(self.client.as_ref(), url).await?;
        debug!(field_id, samples = body.samples.len(), "NDVI series received");
        Ok(body.samples.into_iter().map(NdviSample::from).collect())
    }

    async fn ndvi_pixels(&self, field_id: &str, date: NaiveDate) -> Result<Vec<f64>> {
        let mut url = endpoint(&self.base_url, &["fields", field_id, "ndvi", "pixels"])?;
        url.query_pairs_mut().append_pair("date", &date.to_string());

        let body: PixelsResponse = fetch_json(self.client.as_ref(), url).await?;
        Ok(body
            .pixels
            .into_iter()
            .map(|p| p.unwrap_or(f64::NAN))
            .collect())
    }
}
