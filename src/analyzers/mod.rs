//! Field health analysis.
//!
//! Classifies vegetation index bundles into health and stress levels, looks
//! for stress patterns in NDVI history, plans irrigation and ties the index
//! calculator, pixel aggregator and assessor together for one field.

pub mod grade;
pub mod health;
pub mod irrigation;
pub mod report;
pub mod trend;
pub mod types;
pub mod utility;
