//! Static crop stage reference table.
//!
//! The table is loaded once at startup (built in, or from a JSON file) and
//! passed to the detector explicitly; nothing reads it through global state.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::DetectorParams;
use crate::error::StageError;

/// A min / max / optimal envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub optimal: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64, optimal: f64) -> Self {
        Self { min, max, optimal }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// How well `value` fits the range, in `[0, 1]`.
    ///
    /// 1 at the optimum, falling linearly to 0.5 at either bound, then to 0 one
    /// half-width beyond it.
    pub fn fit(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        let (bound, half_width) = if value <= self.optimal {
            (self.min, self.optimal - self.min)
        } else {
            (self.max, self.max - self.optimal)
        };
        if half_width <= 0.0 {
            return if value == self.optimal { 1.0 } else { 0.0 };
        }

        let inside = (value - self.optimal).abs();
        if inside <= half_width {
            1.0 - 0.5 * inside / half_width
        } else {
            let outside = (value - bound).abs();
            (0.5 - 0.5 * outside / half_width).max(0.0)
        }
    }
}

/// Relative water demand of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoistureRequirement {
    Low,
    Moderate,
    High,
    Critical,
}

impl MoistureRequirement {
    /// Fraction of field capacity the stage draws on.
    pub fn water_demand(&self) -> f64 {
        match self {
            MoistureRequirement::Low => 0.4,
            MoistureRequirement::Moderate => 0.6,
            MoistureRequirement::High => 0.7,
            MoistureRequirement::Critical => 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropStageDefinition {
    /// Stable key, e.g. `"vegetative"`.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub typical_duration_days: u32,
    pub critical_factors: Vec<String>,
    pub management_actions: Vec<String>,
    pub vulnerabilities: Vec<String>,
    pub ndvi_range: ValueRange,
    pub temperature_range: ValueRange,
    pub moisture_requirement: MoistureRequirement,
}

impl CropStageDefinition {
    /// Stage length when heat accumulates `heat_factor` times the reference
    /// rate. Never shorter than one day.
    pub fn adjusted_duration(&self, heat_factor: f64) -> i64 {
        ((self.typical_duration_days as f64 / heat_factor).round() as i64).max(1)
    }
}

/// Inclusive bounds on a plausible planting-to-harvest season, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRange {
    pub min_days: u32,
    pub max_days: u32,
}

impl SeasonRange {
    pub fn contains(&self, days: i64) -> bool {
        days >= self.min_days as i64 && days <= self.max_days as i64
    }
}

/// Everything the detector knows about one crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropProfile {
    pub crop_type: String,
    /// Base temperature for growing degree days.
    pub base_temperature_c: f64,
    /// Heat accumulation per day at which stages run their typical duration.
    pub reference_daily_gdd: f64,
    pub season_range: SeasonRange,
    /// Ordered from the first to the terminal stage.
    pub stages: Vec<CropStageDefinition>,
}

impl CropProfile {
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// The stage after `index`, or `None` at the terminal stage.
    pub fn next_stage(&self, index: usize) -> Option<&CropStageDefinition> {
        self.stages.get(index + 1)
    }

    pub fn typical_season_days(&self) -> u32 {
        self.stages.iter().map(|s| s.typical_duration_days).sum()
    }

    /// Shortest and longest season the stages can add up to while every
    /// stage's heat factor stays within `1 ± max_heat_adjustment`.
    pub fn season_span(&self, max_heat_adjustment: f64) -> (i64, i64) {
        let total = |factor: f64| -> i64 {
            self.stages.iter().map(|s| s.adjusted_duration(factor)).sum()
        };
        (total(1.0 + max_heat_adjustment), total(1.0 - max_heat_adjustment))
    }

    /// Day offset from planting at which stage `index` typically starts.
    pub fn typical_stage_start(&self, index: usize) -> u32 {
        self.stages[..index.min(self.stages.len())]
            .iter()
            .map(|s| s.typical_duration_days)
            .sum()
    }
}

/// Read-only table of crop profiles keyed by crop type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTable {
    crops: BTreeMap<String, CropProfile>,
}

impl StageTable {
    pub fn new(profiles: Vec<CropProfile>) -> Result<Self> {
        let table = Self {
            crops: profiles
                .into_iter()
                .map(|p| (p.crop_type.to_lowercase(), p))
                .collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Loads a table from a JSON array of [`CropProfile`] records.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stage table '{path}'"))?;
        let profiles: Vec<CropProfile> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse stage table '{path}'"))?;
        Self::new(profiles)
    }

    /// Looks up a crop, case-insensitively.
    pub fn crop(&self, crop_type: &str) -> Result<&CropProfile, StageError> {
        self.crops
            .get(&crop_type.to_lowercase())
            .ok_or_else(|| StageError::UnsupportedCrop(crop_type.to_string()))
    }

    pub fn crop_types(&self) -> impl Iterator<Item = &str> {
        self.crops.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &CropProfile> {
        self.crops.values()
    }

    /// Fails when a heat adjustment up to `max_heat_adjustment` could push a
    /// crop's season outside its [`SeasonRange`].
    pub fn check_heat_bound(&self, max_heat_adjustment: f64) -> Result<()> {
        for (crop, profile) in &self.crops {
            let (fastest, slowest) = profile.season_span(max_heat_adjustment);
            let range = profile.season_range;
            if !range.contains(fastest) || !range.contains(slowest) {
                bail!(
                    "season of '{crop}' spans {fastest}-{slowest} days at a heat adjustment of {max_heat_adjustment}, outside its range {}-{}",
                    range.min_days,
                    range.max_days
                );
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (crop, profile) in &self.crops {
            if profile.stages.is_empty() {
                bail!("crop '{crop}' has no stages");
            }
            if let Some(stage) = profile.stages.iter().find(|s| s.typical_duration_days == 0) {
                bail!("stage '{}' of '{crop}' has zero duration", stage.name);
            }
            if profile.season_range.min_days > profile.season_range.max_days {
                bail!("season range of '{crop}' is inverted");
            }
            if profile.reference_daily_gdd <= 0.0 {
                bail!("reference daily GDD of '{crop}' must be positive");
            }
            let mut names: Vec<&str> = profile.stages.iter().map(|s| s.name.as_str()).collect();
            names.sort_unstable();
            if names.windows(2).any(|w| w[0] == w[1]) {
                bail!("crop '{crop}' defines a stage twice");
            }
        }
        self.check_heat_bound(DetectorParams::default().heat_bound())
    }

    /// Corn, soybean, wheat and rice with temperate-season defaults.
    pub fn builtin() -> Self {
        Self {
            crops: [corn(), soybean(), wheat(), rice()]
                .into_iter()
                .map(|p| (p.crop_type.clone(), p))
                .collect(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn stage(
    name: &str,
    display_name: &str,
    description: &str,
    days: u32,
    ndvi: ValueRange,
    temperature: ValueRange,
    moisture: MoistureRequirement,
    critical_factors: &[&str],
    management_actions: &[&str],
    vulnerabilities: &[&str],
) -> CropStageDefinition {
    CropStageDefinition {
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: description.to_string(),
        typical_duration_days: days,
        critical_factors: strings(critical_factors),
        management_actions: strings(management_actions),
        vulnerabilities: strings(vulnerabilities),
        ndvi_range: ndvi,
        temperature_range: temperature,
        moisture_requirement: moisture,
    }
}

fn corn() -> CropProfile {
    use MoistureRequirement::*;
    CropProfile {
        crop_type: "corn".into(),
        base_temperature_c: 10.0,
        reference_daily_gdd: 12.0,
        season_range: SeasonRange {
            min_days: 100,
            max_days: 200,
        },
        stages: vec![
            stage(
                "emergence",
                "Emergence (VE)",
                "Coleoptile breaks the soil surface and the first leaves unfold",
                10,
                ValueRange::new(0.1, 0.3, 0.2),
                ValueRange::new(10.0, 30.0, 20.0),
                Moderate,
                &["soil temperature", "seedbed moisture", "crusting"],
                &["Check stand counts", "Scout for cutworms and seedling disease"],
                &["frost", "soil crusting", "seedling blight"],
            ),
            stage(
                "vegetative",
                "Vegetative (V3-V12)",
                "Rapid leaf and stalk development; ear size is being determined",
                45,
                ValueRange::new(0.3, 0.75, 0.6),
                ValueRange::new(15.0, 32.0, 25.0),
                High,
                &["nitrogen availability", "weed competition", "soil moisture"],
                &["Side-dress nitrogen", "Complete post-emergence weed control"],
                &["nitrogen deficiency", "weed pressure", "hail"],
            ),
            stage(
                "flowering",
                "Tasseling and Silking (VT-R1)",
                "Pollen shed and silking; kernel number is set",
                15,
                ValueRange::new(0.7, 0.9, 0.82),
                ValueRange::new(18.0, 32.0, 26.0),
                Critical,
                &["water availability", "heat above 35C", "pollination"],
                &["Maintain irrigation", "Scout for rootworm beetles clipping silks"],
                &["drought", "heat stress", "silk clipping"],
            ),
            stage(
                "grain_fill",
                "Grain Fill (R2-R5)",
                "Kernels accumulate starch from blister through dent",
                40,
                ValueRange::new(0.55, 0.85, 0.72),
                ValueRange::new(15.0, 30.0, 22.0),
                High,
                &["water availability", "foliar disease", "canopy duration"],
                &["Scout for foliar disease", "Plan fungicide if disease pressure is high"],
                &["drought", "gray leaf spot", "early frost"],
            ),
            stage(
                "maturity",
                "Physiological Maturity (R6)",
                "Black layer formed; grain dries down toward harvest moisture",
                20,
                ValueRange::new(0.2, 0.55, 0.35),
                ValueRange::new(5.0, 28.0, 18.0),
                Low,
                &["grain moisture", "stalk strength"],
                &["Monitor grain moisture", "Schedule harvest"],
                &["stalk lodging", "ear drop"],
            ),
        ],
    }
}

fn soybean() -> CropProfile {
    use MoistureRequirement::*;
    CropProfile {
        crop_type: "soybean".into(),
        base_temperature_c: 10.0,
        reference_daily_gdd: 11.0,
        season_range: SeasonRange {
            min_days: 85,
            max_days: 160,
        },
        stages: vec![
            stage(
                "emergence",
                "Emergence (VE-VC)",
                "Hypocotyl pulls the cotyledons above the soil",
                10,
                ValueRange::new(0.1, 0.3, 0.2),
                ValueRange::new(10.0, 30.0, 22.0),
                Moderate,
                &["soil temperature", "seedbed moisture"],
                &["Check stand counts"],
                &["crusting", "damping off"],
            ),
            stage(
                "vegetative",
                "Vegetative (V1-V6)",
                "Trifoliate leaves develop and nodulation establishes",
                35,
                ValueRange::new(0.3, 0.7, 0.55),
                ValueRange::new(15.0, 32.0, 26.0),
                Moderate,
                &["nodulation", "weed competition"],
                &["Complete weed control", "Scout for aphids"],
                &["weed pressure", "iron deficiency chlorosis"],
            ),
            stage(
                "flowering",
                "Flowering (R1-R2)",
                "Flowers open at the main stem nodes",
                20,
                ValueRange::new(0.65, 0.9, 0.8),
                ValueRange::new(18.0, 32.0, 26.0),
                High,
                &["water availability", "heat"],
                &["Maintain irrigation", "Scout for aphids and stink bugs"],
                &["drought", "flower abortion"],
            ),
            stage(
                "pod_fill",
                "Pod and Seed Fill (R3-R6)",
                "Pods elongate and seeds fill",
                30,
                ValueRange::new(0.6, 0.88, 0.78),
                ValueRange::new(15.0, 30.0, 24.0),
                Critical,
                &["water availability", "foliar disease", "insect feeding"],
                &["Scout for stink bugs and pod feeders", "Consider fungicide at R3"],
                &["drought", "frogeye leaf spot", "pod feeding"],
            ),
            stage(
                "maturity",
                "Maturity (R7-R8)",
                "Leaves yellow and drop; pods reach mature color",
                15,
                ValueRange::new(0.2, 0.55, 0.3),
                ValueRange::new(5.0, 28.0, 18.0),
                Low,
                &["seed moisture", "shatter"],
                &["Schedule harvest at 13-15% seed moisture"],
                &["pod shatter", "weathering"],
            ),
        ],
    }
}

fn wheat() -> CropProfile {
    use MoistureRequirement::*;
    CropProfile {
        crop_type: "wheat".into(),
        base_temperature_c: 0.0,
        reference_daily_gdd: 15.0,
        season_range: SeasonRange {
            min_days: 85,
            max_days: 160,
        },
        stages: vec![
            stage(
                "emergence",
                "Emergence",
                "Coleoptile and first leaf emerge",
                12,
                ValueRange::new(0.1, 0.3, 0.2),
                ValueRange::new(4.0, 25.0, 15.0),
                Moderate,
                &["seedbed moisture", "seeding depth"],
                &["Check stand uniformity"],
                &["crusting", "wireworms"],
            ),
            stage(
                "tillering",
                "Tillering and Stem Extension",
                "Tillers form and the stem elongates through jointing",
                30,
                ValueRange::new(0.3, 0.75, 0.6),
                ValueRange::new(5.0, 25.0, 16.0),
                Moderate,
                &["nitrogen availability", "weed competition"],
                &["Top-dress nitrogen", "Apply herbicide before jointing"],
                &["nitrogen deficiency", "rust"],
            ),
            stage(
                "heading",
                "Heading and Flowering",
                "Heads emerge from the boot and anthesis occurs",
                20,
                ValueRange::new(0.65, 0.9, 0.8),
                ValueRange::new(12.0, 28.0, 20.0),
                Critical,
                &["water availability", "heat above 30C", "fusarium risk"],
                &["Protect flag leaf with fungicide", "Scout for head blight"],
                &["head blight", "heat stress"],
            ),
            stage(
                "grain_fill",
                "Grain Fill",
                "Kernels pass through milk and dough stages",
                30,
                ValueRange::new(0.45, 0.8, 0.65),
                ValueRange::new(12.0, 28.0, 20.0),
                High,
                &["water availability", "canopy duration"],
                &["Monitor for late-season disease"],
                &["drought", "heat stress"],
            ),
            stage(
                "maturity",
                "Ripening",
                "Kernels harden and the crop dries down",
                15,
                ValueRange::new(0.15, 0.45, 0.25),
                ValueRange::new(10.0, 30.0, 22.0),
                Low,
                &["grain moisture", "pre-harvest sprouting"],
                &["Schedule harvest"],
                &["lodging", "sprouting"],
            ),
        ],
    }
}

fn rice() -> CropProfile {
    use MoistureRequirement::*;
    CropProfile {
        crop_type: "rice".into(),
        base_temperature_c: 10.0,
        reference_daily_gdd: 14.0,
        season_range: SeasonRange {
            min_days: 90,
            max_days: 180,
        },
        stages: vec![
            stage(
                "emergence",
                "Seedling",
                "Seedlings establish after germination or transplanting",
                15,
                ValueRange::new(0.05, 0.3, 0.2),
                ValueRange::new(18.0, 35.0, 28.0),
                High,
                &["water depth", "temperature"],
                &["Manage flood depth for establishment"],
                &["cold injury", "seedling disease"],
            ),
            stage(
                "tillering",
                "Tillering",
                "Tillers multiply and canopy closes",
                35,
                ValueRange::new(0.3, 0.75, 0.6),
                ValueRange::new(20.0, 35.0, 28.0),
                High,
                &["nitrogen availability", "weed competition"],
                &["Apply nitrogen before permanent flood", "Control weeds"],
                &["weed pressure", "nitrogen deficiency"],
            ),
            stage(
                "flowering",
                "Panicle Initiation to Flowering",
                "Panicle develops and flowers",
                25,
                ValueRange::new(0.7, 0.9, 0.82),
                ValueRange::new(22.0, 33.0, 28.0),
                Critical,
                &["water availability", "night temperature", "blast risk"],
                &["Maintain flood", "Scout for blast"],
                &["blast", "cold-induced sterility"],
            ),
            stage(
                "grain_fill",
                "Grain Fill",
                "Grains fill from milk to hard dough",
                30,
                ValueRange::new(0.5, 0.85, 0.7),
                ValueRange::new(20.0, 32.0, 26.0),
                High,
                &["water availability", "sheath blight"],
                &["Maintain flood until hard dough"],
                &["sheath blight", "stink bugs"],
            ),
            stage(
                "maturity",
                "Maturity",
                "Panicles turn golden and grain dries",
                15,
                ValueRange::new(0.2, 0.5, 0.3),
                ValueRange::new(18.0, 32.0, 25.0),
                Low,
                &["grain moisture"],
                &["Drain field", "Schedule harvest"],
                &["lodging", "shattering"],
            ),
        ],
    }
}
