//! Data types produced by the health and stress assessor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall field health, best first. Later variants compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Excellent,
    Good,
    Moderate,
    Poor,
    Critical,
}

impl HealthCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCategory::Excellent => "excellent",
            HealthCategory::Good => "good",
            HealthCategory::Moderate => "moderate",
            HealthCategory::Poor => "poor",
            HealthCategory::Critical => "critical",
        }
    }

    /// Return the worse of two categories
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stress severity, mildest first. Later variants compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    None,
    Low,
    Moderate,
    High,
    Severe,
}

impl StressLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::None => "none",
            StressLevel::Low => "low",
            StressLevel::Moderate => "moderate",
            StressLevel::High => "high",
            StressLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indicator that breached its individual threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressFactor {
    /// NDVI
    LowVigor,
    /// SAVI
    LowSoilAdjustedVigor,
    /// EVI
    WeakCanopyActivity,
    /// GNDVI
    ChlorophyllDeficit,
    /// LAI
    LowLeafArea,
    /// FVC
    SparseCanopy,
    /// NDWI
    WaterStress,
    /// NDMI
    LowCanopyMoisture,
}

impl StressFactor {
    pub fn description(&self) -> &'static str {
        match self {
            StressFactor::LowVigor => "Low vegetation vigor",
            StressFactor::LowSoilAdjustedVigor => "Low soil-adjusted vegetation vigor",
            StressFactor::WeakCanopyActivity => "Weak canopy photosynthetic activity",
            StressFactor::ChlorophyllDeficit => "Possible chlorophyll or nitrogen deficiency",
            StressFactor::LowLeafArea => "Low leaf area",
            StressFactor::SparseCanopy => "Sparse canopy cover",
            StressFactor::WaterStress => "Canopy water stress",
            StressFactor::LowCanopyMoisture => "Low canopy moisture content",
        }
    }

    /// Remediation advice for this factor, most important first.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            StressFactor::LowVigor => &[
                "Scout low-vigor zones to confirm the extent of the problem",
                "Review the nitrogen program and consider a split application",
            ],
            StressFactor::LowSoilAdjustedVigor => {
                &["Check stand establishment and replant gaps where still feasible"]
            }
            StressFactor::WeakCanopyActivity => {
                &["Inspect the canopy for nutrient deficiency or disease symptoms"]
            }
            StressFactor::ChlorophyllDeficit => {
                &["Take leaf tissue samples to check nitrogen and chlorophyll status"]
            }
            StressFactor::LowLeafArea => {
                &["Evaluate plant population and early-season growing conditions"]
            }
            StressFactor::SparseCanopy => &[
                "Control weeds in open canopy gaps",
                "Map sparse zones for variable-rate management",
            ],
            StressFactor::WaterStress => &[
                "Check soil moisture and schedule irrigation",
                "Irrigate in the early morning or evening to reduce evaporation",
            ],
            StressFactor::LowCanopyMoisture => {
                &["Track canopy moisture over the next satellite passes"]
            }
        }
    }
}

impl fmt::Display for StressFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Health classification for one field's index bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub overall: HealthCategory,
    pub stress_level: StressLevel,
    /// Weighted stress score in `[0, 1]` the level was derived from.
    pub stress_score: f64,
    pub stress_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

impl HealthAssessment {
    /// Scales confidence down by `factor`, keeping it in `(0, 1]`.
    pub fn with_confidence_scale(mut self, factor: f64) -> Self {
        self.confidence = (self.confidence * factor.clamp(0.0, 1.0)).clamp(0.05, 1.0);
        self
    }
}
