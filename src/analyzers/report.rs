//! Single-field pipeline: indices, pixel statistics and assessment together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzers::health::HealthAssessor;
use crate::analyzers::types::HealthAssessment;
use crate::indices::{IndexCalculator, SpectralBands, VegetationIndices};
use crate::stats::NdviStatistics;

/// Below this share of usable pixels the assessment confidence is scaled down.
pub const MIN_VALID_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHealthReport {
    pub field_id: String,
    pub indices: VegetationIndices,
    pub statistics: Option<NdviStatistics>,
    pub assessment: HealthAssessment,
    pub generated_at: DateTime<Utc>,
}

impl FieldHealthReport {
    /// Share of pixels that were usable, when pixels were supplied.
    pub fn valid_fraction(&self) -> Option<f64> {
        let stats = self.statistics.as_ref()?;
        let total = stats.total_pixels();
        (total > 0).then(|| stats.valid_pixels as f64 / total as f64)
    }
}

/// Flat CSV row for a [`FieldHealthReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHealthRecord {
    pub timestamp: String,
    pub field_id: String,
    pub ndvi: f64,
    pub savi: f64,
    pub evi: f64,
    pub gndvi: f64,
    pub ndwi: f64,
    pub ndmi: f64,
    pub lai: f64,
    pub fvc: f64,
    pub measured_indices: usize,
    pub valid_pixels: usize,
    pub cloudy_pixels: usize,
    pub vegetation_pixels: usize,
    pub cloud_pct: f64,
    pub mean_ndvi: Option<f64>,
    pub overall: String,
    pub stress_level: String,
    pub stress_score: f64,
    pub confidence: f64,
    pub stress_factors: String,
}

impl From<&FieldHealthReport> for FieldHealthRecord {
    fn from(r: &FieldHealthReport) -> Self {
        let i = &r.indices;
        let stats = r.statistics.as_ref();
        Self {
            timestamp: r.generated_at.to_rfc3339(),
            field_id: r.field_id.clone(),
            ndvi: i.ndvi,
            savi: i.savi,
            evi: i.evi,
            gndvi: i.gndvi,
            ndwi: i.ndwi,
            ndmi: i.ndmi,
            lai: i.lai,
            fvc: i.fvc,
            measured_indices: i.provenance.measured_count(),
            valid_pixels: stats.map_or(0, |s| s.valid_pixels),
            cloudy_pixels: stats.map_or(0, |s| s.cloudy_pixels),
            vegetation_pixels: stats.map_or(0, |s| s.vegetation_pixels()),
            cloud_pct: stats.map_or(0.0, |s| s.cloud_pct()),
            mean_ndvi: stats.filter(|s| s.valid_pixels > 0).map(|s| s.mean),
            overall: r.assessment.overall.to_string(),
            stress_level: r.assessment.stress_level.to_string(),
            stress_score: r.assessment.stress_score,
            confidence: r.assessment.confidence,
            stress_factors: r.assessment.stress_factors.join("; "),
        }
    }
}

/// Runs the calculator, aggregator and assessor for one field.
#[derive(Debug, Clone, Default)]
pub struct FieldAnalyzer {
    calculator: IndexCalculator,
    assessor: HealthAssessor,
}

impl FieldAnalyzer {
    pub fn new(calculator: IndexCalculator, assessor: HealthAssessor) -> Self {
        Self {
            calculator,
            assessor,
        }
    }

    pub fn assess(
        &self,
        field_id: &str,
        bands: &SpectralBands,
        pixels: Option<&[f64]>,
    ) -> FieldHealthReport {
        let indices = self.calculator.calculate(bands);
        let statistics = pixels.map(NdviStatistics::from_pixels);
        let mut assessment = self.assessor.assess(&indices);

        if let Some(stats) = statistics.as_ref() {
            let total = stats.total_pixels();
            if total > 0 {
                let valid = stats.valid_pixels as f64 / total as f64;
                if valid < MIN_VALID_FRACTION {
                    warn!(
                        field_id,
                        valid_pct = valid * 100.0,
                        "Mostly cloud-covered scene, lowering confidence"
                    );
                    assessment = assessment.with_confidence_scale(valid / MIN_VALID_FRACTION);
                }
            }
        }

        debug!(
            field_id,
            overall = %assessment.overall,
            stress = %assessment.stress_level,
            confidence = assessment.confidence,
            "Field assessed"
        );

        FieldHealthReport {
            field_id: field_id.to_string(),
            indices,
            statistics,
            assessment,
            generated_at: Utc::now(),
        }
    }
}

/// Assesses one field with the default parameters.
pub fn assess_field(
    field_id: &str,
    bands: &SpectralBands,
    pixels: Option<&[f64]>,
) -> FieldHealthReport {
    FieldAnalyzer::default().assess(field_id, bands, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::HealthCategory;
    use crate::stats::NODATA_SENTINEL;
    use approx::assert_relative_eq;

    fn bands() -> SpectralBands {
        SpectralBands::new(0.05, 0.5)
            .with_blue(0.04)
            .with_green(0.08)
            .with_swir(0.25, 0.15)
    }

    #[test]
    fn test_without_pixels() {
        let report = assess_field("north-40", &bands(), None);
        assert!(report.statistics.is_none());
        assert_eq!(report.valid_fraction(), None);
        assert!(report.indices.provenance.is_fully_measured());
        assert!(report.assessment.overall <= HealthCategory::Good);
    }

    #[test]
    fn test_clear_scene_keeps_confidence() {
        let clear = assess_field("north-40", &bands(), None);
        let pixels = [0.6, 0.7, 0.8, 0.75];
        let report = assess_field("north-40", &bands(), Some(&pixels));

        assert_eq!(report.valid_fraction(), Some(1.0));
        assert_relative_eq!(report.assessment.confidence, clear.assessment.confidence);
    }

    #[test]
    fn test_cloudy_scene_lowers_confidence() {
        let clear = assess_field("north-40", &bands(), None);
        let pixels = [0.7, f64::NAN, NODATA_SENTINEL, NODATA_SENTINEL];
        let report = assess_field("north-40", &bands(), Some(&pixels));

        assert_eq!(report.valid_fraction(), Some(0.25));
        assert!(report.assessment.confidence < clear.assessment.confidence);
        assert!(report.assessment.confidence > 0.0);
        assert_eq!(report.assessment.overall, clear.assessment.overall);
    }

    #[test]
    fn test_record_flattens_report() {
        let pixels = [0.6, 0.7, f64::NAN];
        let report = assess_field("south-12", &bands(), Some(&pixels));
        let record = FieldHealthRecord::from(&report);

        assert_eq!(record.field_id, "south-12");
        assert_eq!(record.valid_pixels, 2);
        assert_eq!(record.cloudy_pixels, 1);
        assert_eq!(record.vegetation_pixels, 2);
        assert_eq!(record.measured_indices, 8);
        assert_relative_eq!(record.mean_ndvi.unwrap(), 0.65, epsilon = 1e-12);
        assert_eq!(record.overall, report.assessment.overall.to_string());
    }
}
