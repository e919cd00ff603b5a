//! Error types callers are expected to match on.
//!
//! Degenerate remote-sensing input never produces an error; these cover
//! caller mistakes against the stage table and the few cases where no
//! estimate can be made at all.

use thiserror::Error;

/// Errors raised by the growth stage detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The crop type has no entry in the stage table.
    #[error("unsupported crop type '{0}'")]
    UnsupportedCrop(String),

    /// The stage name is not defined for the crop.
    #[error("'{stage}' is not a defined stage for {crop_type}")]
    InvalidStageName { crop_type: String, stage: String },

    /// The stage is the last one for the crop, so there is nothing to transition to.
    #[error("'{stage}' is the terminal stage for {crop_type}")]
    TerminalStage { crop_type: String, stage: String },

    /// Neither collaborator data nor a planting date was available.
    #[error("satellite and weather data temporarily unavailable for field {field_id}")]
    DataUnavailable { field_id: String },

    /// The heat-adjusted season left the crop's plausible range. Points at a
    /// stage table that was not checked against the detector's heat bound.
    #[error("projected {crop_type} season of {projected_days} days is outside {min_days}-{max_days}")]
    SeasonOutOfRange {
        crop_type: String,
        projected_days: i64,
        min_days: u32,
        max_days: u32,
    },
}

impl StageError {
    /// Returns `true` for errors caused by the caller's input rather than missing data.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StageError::UnsupportedCrop(_)
                | StageError::InvalidStageName { .. }
                | StageError::TerminalStage { .. }
        )
    }
}

/// Errors raised by the time-series analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("at least {required} observations required, got {actual}")]
    InsufficientObservations { required: usize, actual: usize },
}
