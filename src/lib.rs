//! Crop health and growth-stage analytics.
//!
//! Turns multispectral reflectance into vegetation indices, summarises NDVI
//! rasters, classifies field health and stress, and tracks where a crop is in
//! its growth cycle using satellite NDVI and weather history.

pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod indices;
pub mod output;
pub mod services;
pub mod stages;
pub mod stats;

pub use analyzers::health::{HealthAssessor, assess_crop_health};
pub use analyzers::report::{FieldHealthReport, assess_field};
pub use analyzers::types::{HealthAssessment, HealthCategory, StressLevel};
pub use error::{AnalysisError, StageError};
pub use indices::{SpectralBands, VegetationIndices, calculate_ndvi, calculate_vegetation_indices};
pub use stages::{GrowthStageDetector, StageTable};
pub use stats::{NdviStatistics, calculate_ndvi_statistics};
