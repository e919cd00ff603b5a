use serde::{Deserialize, Serialize};

use crate::analyzers::utility::{mean, median_sorted, stddev};

/// Fill value used by imagery providers for pixels without data.
pub const NODATA_SENTINEL: f64 = -999.0;

/// Upper bound of the bare-soil NDVI class.
pub const BARE_SOIL_MAX_NDVI: f64 = 0.2;

/// Summary of an NDVI pixel collection for one field.
///
/// `cloudy_pixels` counts every pixel excluded from the statistics (NaN,
/// infinite, the no-data sentinel or out of `[-1, 1]`). Water and bare-soil
/// pixels are a sub-partition of the valid pixels and count toward
/// `valid_pixels` too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NdviStatistics {
    pub valid_pixels: usize,
    pub cloudy_pixels: usize,
    pub water_pixels: usize,
    pub baresoil_pixels: usize,

    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

fn is_valid_ndvi(value: f64) -> bool {
    value.is_finite() && value != NODATA_SENTINEL && (-1.0..=1.0).contains(&value)
}

impl NdviStatistics {
    pub fn from_pixels(values: &[f64]) -> Self {
        let mut s = NdviStatistics::default();

        let mut valid: Vec<f64> = Vec::with_capacity(values.len());

        for &v in values {
            if !is_valid_ndvi(v) {
                s.cloudy_pixels += 1;
                continue;
            }

            if v < 0.0 {
                s.water_pixels += 1;
            } else if v < BARE_SOIL_MAX_NDVI {
                s.baresoil_pixels += 1;
            }

            valid.push(v);
        }

        s.valid_pixels = valid.len();
        if valid.is_empty() {
            return s;
        }

        valid.sort_by(f64::total_cmp);

        s.mean = mean(&valid);
        s.std = stddev(&valid, s.mean);
        s.min = valid[0];
        s.max = valid[valid.len() - 1];
        s.median = median_sorted(&valid);

        s
    }

    pub fn total_pixels(&self) -> usize {
        self.valid_pixels + self.cloudy_pixels
    }

    /// Valid pixels that are neither water nor bare soil.
    pub fn vegetation_pixels(&self) -> usize {
        self.valid_pixels - self.water_pixels - self.baresoil_pixels
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn cloud_pct(&self) -> f64 {
        Self::pct(self.cloudy_pixels, self.total_pixels())
    }
}

/// Aggregates an NDVI pixel array into [`NdviStatistics`].
pub fn calculate_ndvi_statistics(values: &[f64]) -> NdviStatistics {
    NdviStatistics::from_pixels(values)
}
