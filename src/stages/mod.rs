pub mod definitions;
pub mod detector;
pub mod types;

pub use definitions::{
    CropProfile, CropStageDefinition, MoistureRequirement, SeasonRange, StageTable, ValueRange,
};
pub use detector::GrowthStageDetector;
pub use types::{
    ConfidenceInterval, CropStageDetection, CropStageHistory, DataQuality, StageConditions,
    StageHistoryEntry, StageRecord, StageTransitionPrediction,
};
