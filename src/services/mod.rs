//! Collaborator interfaces the engine consumes.
//!
//! The engine never performs I/O itself; satellite imagery and weather
//! history arrive through these traits, so callers can back them with HTTP
//! services, a database, or in-memory fixtures.

pub mod satellite;
pub mod weather;

use serde::{Deserialize, Serialize};

pub use satellite::{NdviSample, SatelliteProvider};
pub use weather::{
    DailyForecast, DailyObservation, TemperatureExtremes, WeatherProvider, WeatherSummary,
};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Outer ring of a field polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub ring: Vec<GeoPoint>,
}
