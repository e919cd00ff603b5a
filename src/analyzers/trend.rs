//! Stress-pattern analysis over an NDVI time series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analyzers::types::StressLevel;
use crate::analyzers::utility::{linear_slope, mean, stddev};
use crate::error::AnalysisError;
use crate::services::NdviSample;

/// Fewest observations a trend can be fitted to.
pub const MIN_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Low,
    High,
}

/// An observation further than two standard deviations from the series mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub ndvi: f64,
    pub deviation: f64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// NDVI change per observation.
    pub slope: f64,
    pub significance: Significance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressPatternAnalysis {
    pub stress_level: StressLevel,
    pub confidence: f64,
    pub statistics: SeriesStatistics,
    pub trend: Trend,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<String>,
    pub observations: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Classifies mean NDVI of a series into a stress level.
fn series_stress(mean_ndvi: f64) -> StressLevel {
    match mean_ndvi {
        m if m > 0.7 => StressLevel::Low,
        m if m > 0.5 => StressLevel::Moderate,
        m if m > 0.3 => StressLevel::High,
        _ => StressLevel::Severe,
    }
}

fn trend_direction(slope: f64) -> TrendDirection {
    if slope > 0.01 {
        TrendDirection::Improving
    } else if slope < -0.01 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

fn significance(slope: f64) -> Significance {
    match slope.abs() {
        s if s > 0.02 => Significance::High,
        s if s > 0.005 => Significance::Moderate,
        _ => Significance::Low,
    }
}

/// Analyses stress patterns in a field's NDVI history.
///
/// Samples are sorted by date and non-finite values are dropped.
///
/// # Errors
///
/// Returns [`AnalysisError::InsufficientObservations`] when fewer than
/// [`MIN_OBSERVATIONS`] usable samples remain.
pub fn analyze_stress_pattern(
    samples: &[NdviSample],
) -> Result<StressPatternAnalysis, AnalysisError> {
    let mut usable: Vec<NdviSample> = samples.iter().filter(|s| s.ndvi.is_finite()).copied().collect();
    if usable.len() < MIN_OBSERVATIONS {
        return Err(AnalysisError::InsufficientObservations {
            required: MIN_OBSERVATIONS,
            actual: usable.len(),
        });
    }
    usable.sort_by_key(|s| s.date);

    let values: Vec<f64> = usable.iter().map(|s| s.ndvi).collect();
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();

    let m = mean(&values);
    let sd = stddev(&values, m);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let slope = linear_slope(&xs, &values);
    let cv = if m > 0.0 { sd / m } else { 0.0 };

    let anomalies: Vec<Anomaly> = usable
        .iter()
        .filter(|s| (s.ndvi - m).abs() > 2.0 * sd)
        .map(|s| Anomaly {
            date: s.date,
            ndvi: s.ndvi,
            deviation: (s.ndvi - m).abs(),
            kind: if s.ndvi < m {
                AnomalyKind::Low
            } else {
                AnomalyKind::High
            },
        })
        .collect();

    let stress_level = series_stress(m);
    let direction = trend_direction(slope);

    Ok(StressPatternAnalysis {
        stress_level,
        confidence: (0.7 + (1.0 - cv) * 0.25).clamp(0.05, 0.95),
        statistics: SeriesStatistics {
            mean: m,
            std: sd,
            min,
            max,
            coefficient_of_variation: cv,
        },
        trend: Trend {
            direction,
            slope,
            significance: significance(slope),
        },
        recommendations: pattern_recommendations(stress_level, direction, anomalies.len()),
        anomalies,
        observations: usable.len(),
        first_date: usable[0].date,
        last_date: usable[usable.len() - 1].date,
    })
}

/// NDVI change per calendar day across the samples, 0.0 when undetermined.
pub fn daily_slope(samples: &[NdviSample]) -> f64 {
    let Some(first) = samples.iter().map(|s| s.date).min() else {
        return 0.0;
    };
    let xs: Vec<f64> = samples
        .iter()
        .map(|s| (s.date - first).num_days() as f64)
        .collect();
    let ys: Vec<f64> = samples.iter().map(|s| s.ndvi).collect();
    linear_slope(&xs, &ys)
}

fn pattern_recommendations(
    level: StressLevel,
    direction: TrendDirection,
    anomaly_count: usize,
) -> Vec<String> {
    let mut recs: Vec<&str> = Vec::new();

    match level {
        StressLevel::Severe => recs.extend([
            "Immediate irrigation required to prevent crop damage",
            "Consider emergency nutrient application",
            "Investigate potential pest or disease issues",
        ]),
        StressLevel::High => recs.extend([
            "Increase irrigation frequency",
            "Monitor for pest and disease pressure",
            "Consider stress-reducing treatments",
        ]),
        StressLevel::Moderate => recs.extend([
            "Optimize irrigation timing",
            "Monitor crop development closely",
        ]),
        _ => {}
    }

    match direction {
        TrendDirection::Declining => recs.extend([
            "Investigate causes of declining vegetation health",
            "Consider soil testing for nutrient deficiencies",
        ]),
        TrendDirection::Improving => recs.push("Continue current management practices"),
        TrendDirection::Stable => {}
    }

    if anomaly_count > 2 {
        recs.extend([
            "High variability detected - investigate field uniformity",
            "Consider precision management approaches",
        ]);
    }

    recs.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn series(values: &[f64]) -> Vec<NdviSample> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &ndvi)| NdviSample {
                date: start + chrono::Duration::days(5 * i as i64),
                ndvi,
                cloud_cover_percent: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_requires_three_observations() {
        let err = analyze_stress_pattern(&series(&[0.5, 0.6])).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientObservations {
                required: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_declining_series() {
        let a = analyze_stress_pattern(&series(&[0.62, 0.58, 0.53, 0.47, 0.41])).unwrap();

        assert_eq!(a.trend.direction, TrendDirection::Declining);
        assert_eq!(a.trend.significance, Significance::High);
        assert_eq!(a.stress_level, StressLevel::Moderate);
        assert!(a.recommendations.iter().any(|r| r.contains("declining")));
        assert_eq!(a.observations, 5);
        assert!(a.first_date < a.last_date);
    }

    #[test]
    fn test_stable_healthy_series() {
        let a = analyze_stress_pattern(&series(&[0.81, 0.82, 0.81, 0.82])).unwrap();

        assert_eq!(a.trend.direction, TrendDirection::Stable);
        assert_eq!(a.stress_level, StressLevel::Low);
        assert!(a.anomalies.is_empty());
        assert!(a.recommendations.is_empty());
        assert!(a.confidence <= 0.95 && a.confidence > 0.9);
    }

    #[test]
    fn test_anomaly_detection() {
        let mut values = vec![0.7; 12];
        values[6] = 0.1;
        let a = analyze_stress_pattern(&series(&values)).unwrap();

        assert_eq!(a.anomalies.len(), 1);
        assert_eq!(a.anomalies[0].kind, AnomalyKind::Low);
        assert_abs_diff_eq!(a.anomalies[0].ndvi, 0.1);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let mut s = series(&[0.3, 0.4, 0.5]);
        s.reverse();
        let a = analyze_stress_pattern(&s).unwrap();
        assert_eq!(a.trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_daily_slope() {
        // 5 days apart, +0.05 per sample
        let s = series(&[0.3, 0.35, 0.4]);
        assert_abs_diff_eq!(daily_slope(&s), 0.01, epsilon = 1e-12);
        assert_eq!(daily_slope(&[]), 0.0);
    }
}
