//! Trait and types for a satellite index provider.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::FieldBounds;

/// One field-average NDVI observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviSample {
    pub date: NaiveDate,
    pub ndvi: f64,
    pub cloud_cover_percent: f64,
}

impl NdviSample {
    /// Usable when the value is a real NDVI and cloud cover is at most `max_cloud_percent`.
    pub fn is_clear(&self, max_cloud_percent: f64) -> bool {
        self.ndvi.is_finite()
            && (-1.0..=1.0).contains(&self.ndvi)
            && self.cloud_cover_percent <= max_cloud_percent
    }
}

/// Abstraction over a satellite imagery provider.
#[async_trait::async_trait]
pub trait SatelliteProvider: Send + Sync {
    /// Returns field-average NDVI samples between `start` and `end` inclusive.
    async fn ndvi_series(
        &self,
        field_id: &str,
        bounds: Option<&FieldBounds>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NdviSample>>;

    /// Returns the per-pixel NDVI array of the scene closest to `date`.
    async fn ndvi_pixels(&self, field_id: &str, date: NaiveDate) -> Result<Vec<f64>>;
}
