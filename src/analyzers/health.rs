//! Health and stress assessment from a vegetation index bundle.
//!
//! Each indicator is checked against its own threshold; breaches accumulate a
//! weighted stress score, and the overall category comes from NDVI. The two
//! are then reconciled so the worst detected condition dominates.

use tracing::debug;

use crate::analyzers::grade::{category_ceiling, health_category, stress_floor, stress_level};
use crate::analyzers::types::{HealthAssessment, HealthCategory, StressFactor, StressLevel};
use crate::config::{HealthThresholds, IndicatorRule};
use crate::indices::VegetationIndices;

const INSPECTION_ACTIONS: &[&str] = &[
    "Conduct an on-site field inspection to diagnose the cause of decline",
    "Investigate potential pest or disease issues",
];

/// Assesses an index bundle with the default thresholds.
pub fn assess_crop_health(indices: &VegetationIndices) -> HealthAssessment {
    HealthAssessor::default().assess(indices)
}

#[derive(Debug, Clone, Default)]
pub struct HealthAssessor {
    thresholds: HealthThresholds,
}

/// Severity of a breach in `[0, 1]`, or `None` when the value meets the threshold.
fn breach_severity(value: f64, rule: &IndicatorRule) -> Option<f64> {
    if value >= rule.threshold {
        return None;
    }
    let span = rule.threshold - rule.floor;
    let severity = if span > 0.0 {
        (rule.threshold - value) / span
    } else {
        1.0
    };
    Some(severity.clamp(0.0, 1.0))
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

impl HealthAssessor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(&self, indices: &VegetationIndices) -> HealthAssessment {
        let t = &self.thresholds;
        let ndvi = sanitize(indices.ndvi);

        let checks = [
            (StressFactor::LowVigor, ndvi, t.ndvi),
            (StressFactor::LowSoilAdjustedVigor, sanitize(indices.savi), t.savi),
            (StressFactor::WeakCanopyActivity, sanitize(indices.evi), t.evi),
            (StressFactor::ChlorophyllDeficit, sanitize(indices.gndvi), t.gndvi),
            (StressFactor::LowLeafArea, sanitize(indices.lai), t.lai),
            (StressFactor::SparseCanopy, sanitize(indices.fvc), t.fvc),
            (StressFactor::WaterStress, sanitize(indices.ndwi), t.ndwi),
            (StressFactor::LowCanopyMoisture, sanitize(indices.ndmi), t.ndmi),
        ];

        let mut factors = Vec::new();
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;

        for (factor, value, rule) in checks {
            weight_sum += rule.weight;
            if let Some(severity) = breach_severity(value, &rule) {
                weighted += rule.weight * (0.5 + 0.5 * severity);
                factors.push(factor);
            }
        }

        let score = if weight_sum > 0.0 {
            (weighted / weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut overall = health_category(ndvi, &t.ndvi_cut_points);

        // A poor or critical field always carries at least the vigor factor,
        // even when custom thresholds would not flag it.
        if overall >= HealthCategory::Poor && !factors.contains(&StressFactor::LowVigor) {
            factors.insert(0, StressFactor::LowVigor);
        }

        let mut level = if factors.is_empty() {
            StressLevel::None
        } else {
            stress_level(score, &t.stress_cut_points).max(StressLevel::Low)
        };
        level = level.max(stress_floor(overall));
        overall = overall.worst(category_ceiling(level));

        let confidence = self.confidence(ndvi, indices);

        debug!(
            ndvi,
            score,
            overall = %overall,
            stress = %level,
            factors = factors.len(),
            confidence,
            "Crop health assessed"
        );

        HealthAssessment {
            overall,
            stress_level: level,
            stress_score: score,
            stress_factors: factors.iter().map(|f| f.description().to_string()).collect(),
            recommendations: recommendations(&factors, overall, level),
            confidence,
        }
    }

    /// Lower near an NDVI cut point and when fewer indices came from real bands.
    fn confidence(&self, ndvi: f64, indices: &VegetationIndices) -> f64 {
        let t = &self.thresholds;
        let distance = t
            .ndvi_cut_points
            .iter()
            .map(|c| (ndvi - c).abs())
            .fold(f64::INFINITY, f64::min);

        let boundary = if t.boundary_margin > 0.0 {
            0.6 + 0.4 * (distance / t.boundary_margin).min(1.0)
        } else {
            1.0
        };
        let coverage = 0.5 + 0.5 * indices.provenance.measured_count() as f64 / 8.0;

        (boundary * coverage).clamp(0.05, 1.0)
    }
}

fn recommendations(
    factors: &[StressFactor],
    overall: HealthCategory,
    level: StressLevel,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|r| r == s) {
            out.push(s.to_string());
        }
    };

    if overall == HealthCategory::Critical || level == StressLevel::Severe {
        for action in INSPECTION_ACTIONS {
            push(*action);
        }
    }

    for factor in factors {
        for rec in factor.recommendations() {
            push(*rec);
        }
    }

    match level {
        StressLevel::High => push("Monitor for pest and disease pressure"),
        StressLevel::Moderate => push("Monitor crop development closely"),
        StressLevel::None => push("Continue current management practices"),
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indices::{
        IndexProvenance, IndexSource, SpectralBands, calculate_vegetation_indices,
    };

    fn healthy() -> VegetationIndices {
        VegetationIndices {
            ndvi: 0.95,
            savi: 0.9,
            evi: 0.9,
            gndvi: 0.9,
            ndwi: 0.6,
            ndmi: 0.6,
            lai: 7.0,
            fvc: 1.0,
            provenance: IndexProvenance::default(),
        }
    }

    #[test]
    fn test_maximal_indices_are_excellent() {
        let a = assess_crop_health(&healthy());
        assert_eq!(a.overall, HealthCategory::Excellent);
        assert_eq!(a.stress_level, StressLevel::None);
        assert!(a.stress_factors.is_empty());
        assert_eq!(a.confidence, 1.0);
    }

    #[test]
    fn test_all_zero_indices_are_severe() {
        let a = assess_crop_health(&VegetationIndices::default());
        assert_eq!(a.overall, HealthCategory::Critical);
        assert_eq!(a.stress_level, StressLevel::Severe);
        assert!(!a.recommendations.is_empty());
        assert!(a.recommendations.iter().any(|r| r.contains("inspection")));
        assert!(a.confidence > 0.0 && a.confidence <= 1.0);
    }

    #[test]
    fn test_moderate_ndvi_from_bands_is_good() {
        let indices = calculate_vegetation_indices(&SpectralBands::new(0.15, 0.45));
        let a = assess_crop_health(&indices);
        assert!(matches!(
            a.overall,
            HealthCategory::Good | HealthCategory::Excellent
        ));
        assert!(matches!(a.stress_level, StressLevel::None | StressLevel::Low));
    }

    #[test]
    fn test_water_stress_only() {
        let indices = VegetationIndices {
            ndwi: -0.15,
            ..healthy()
        };
        let a = assess_crop_health(&indices);
        assert_eq!(a.stress_factors, vec!["Canopy water stress".to_string()]);
        assert_ne!(a.stress_level, StressLevel::None);
        assert!(a.recommendations.iter().any(|r| r.contains("irrigation")));
    }

    #[test]
    fn test_factors_empty_exactly_when_no_stress() {
        for ndvi in [-0.3, 0.0, 0.1, 0.2, 0.35, 0.5, 0.75, 0.9] {
            let indices = VegetationIndices {
                ndvi,
                ..healthy()
            };
            let a = assess_crop_health(&indices);
            assert_eq!(
                a.stress_factors.is_empty(),
                a.stress_level == StressLevel::None,
                "ndvi {ndvi}"
            );
            if a.overall == HealthCategory::Critical {
                assert_ne!(a.stress_level, StressLevel::None);
            }
        }
    }

    #[test]
    fn test_severe_stress_caps_overall() {
        // High NDVI but every other indicator collapsed.
        let indices = VegetationIndices {
            ndvi: 0.75,
            ..VegetationIndices::default()
        };
        let a = assess_crop_health(&indices);
        assert!(a.stress_level >= StressLevel::High);
        assert!(a.overall >= HealthCategory::Moderate);
    }

    #[test]
    fn test_confidence_drops_near_boundary_and_with_fallbacks() {
        let far = assess_crop_health(&VegetationIndices {
            ndvi: 0.58,
            ..healthy()
        });
        let near = assess_crop_health(&VegetationIndices {
            ndvi: 0.451,
            ..healthy()
        });
        assert!(near.confidence < far.confidence);

        let approximated = assess_crop_health(&VegetationIndices {
            ndvi: 0.58,
            provenance: IndexProvenance {
                evi: IndexSource::Approximated,
                gndvi: IndexSource::Approximated,
                ndwi: IndexSource::Approximated,
                ndmi: IndexSource::Approximated,
            },
            ..healthy()
        });
        assert!(approximated.confidence < far.confidence);
    }

    #[test]
    fn test_non_finite_indices_do_not_panic() {
        let indices = VegetationIndices {
            ndvi: f64::NAN,
            lai: f64::INFINITY,
            ..healthy()
        };
        let a = assess_crop_health(&indices);
        assert_eq!(a.overall, HealthCategory::Critical);
        assert!(a.confidence > 0.0);
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let a = assess_crop_health(&VegetationIndices::default());
        let mut sorted = a.recommendations.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), a.recommendations.len());
    }
}
