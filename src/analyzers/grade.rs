use crate::analyzers::types::{HealthCategory, StressLevel};

/// Converts an NDVI value into a health category against descending cut points.
///
/// With the default cut points:
///
/// | NDVI        | Category  |
/// |-------------|-----------|
/// | >= 0.70     | excellent |
/// | >= 0.45     | good      |
/// | >= 0.30     | moderate  |
/// | >= 0.15     | poor      |
/// | < 0.15      | critical  |
pub fn health_category(ndvi: f64, cuts: &[f64; 4]) -> HealthCategory {
    match ndvi {
        v if v >= cuts[0] => HealthCategory::Excellent,
        v if v >= cuts[1] => HealthCategory::Good,
        v if v >= cuts[2] => HealthCategory::Moderate,
        v if v >= cuts[3] => HealthCategory::Poor,
        _ => HealthCategory::Critical,
    }
}

/// Converts a normalised stress score (0.0–1.0) into a stress level.
///
/// With the default cut points:
///
/// | Score       | Level    |
/// |-------------|----------|
/// | 0           | none     |
/// | < 0.15      | low      |
/// | >= 0.15     | moderate |
/// | >= 0.35     | high     |
/// | >= 0.60     | severe   |
pub fn stress_level(score: f64, cuts: &[f64; 3]) -> StressLevel {
    match score {
        s if s >= cuts[2] => StressLevel::Severe,
        s if s >= cuts[1] => StressLevel::High,
        s if s >= cuts[0] => StressLevel::Moderate,
        s if s > 0.0 => StressLevel::Low,
        _ => StressLevel::None,
    }
}

/// The mildest stress level consistent with a health category.
pub fn stress_floor(category: HealthCategory) -> StressLevel {
    match category {
        HealthCategory::Critical => StressLevel::High,
        HealthCategory::Poor => StressLevel::Low,
        _ => StressLevel::None,
    }
}

/// The best health category consistent with a stress level.
pub fn category_ceiling(level: StressLevel) -> HealthCategory {
    match level {
        StressLevel::Severe => HealthCategory::Poor,
        StressLevel::High => HealthCategory::Moderate,
        _ => HealthCategory::Excellent,
    }
}
