//! Growth stage detection, stage history and transition forecasting.
//!
//! Stages of a crop form a linear sequence, so the detector works with stage
//! indices: a transition always goes from `i` to `i + 1`, and the terminal
//! stage is the last index. Development time is measured in "thermal days",
//! calendar days scaled by how fast heat accumulated relative to the crop's
//! reference rate, bounded by `max_heat_adjustment`.
//!
//! Satellite and weather collaborators are called with a timeout. A failure
//! or timeout degrades the estimate (lower confidence, tagged
//! [`DataQuality`]) instead of failing the call.

use chrono::{Duration, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analyzers::trend::daily_slope;
use crate::analyzers::utility::mean;
use crate::config::DetectorParams;
use crate::error::StageError;
use crate::services::{
    FieldBounds, GeoPoint, NdviSample, SatelliteProvider, WeatherProvider, WeatherSummary,
};
use crate::stages::definitions::{CropProfile, CropStageDefinition, StageTable};
use crate::stages::types::{
    ConfidenceInterval, CropStageDetection, CropStageHistory, DataQuality, StageConditions,
    StageHistoryEntry, StageTransitionPrediction,
};

/// Confidence when no NDVI is available to check the stage against.
const UNCHECKED_STAGE_CONFIDENCE: f64 = 0.45;

pub struct GrowthStageDetector<S, W> {
    table: Arc<StageTable>,
    satellite: S,
    weather: W,
    params: DetectorParams,
    timeout: std::time::Duration,
}

/// Collaborator data gathered for one estimate.
struct Observations {
    /// Cloud-free samples, sorted by date. `None` when the provider failed.
    samples: Option<Vec<NdviSample>>,
    weather: Option<WeatherSummary>,
}

impl Observations {
    fn latest_ndvi(&self) -> Option<f64> {
        self.samples.as_ref()?.last().map(|s| s.ndvi)
    }

    fn ndvi_trend(&self) -> Option<f64> {
        match self.samples.as_deref() {
            Some(samples) if samples.len() >= 2 => Some(daily_slope(samples)),
            _ => None,
        }
    }

    fn quality(&self) -> DataQuality {
        DataQuality::from_availability(self.latest_ndvi().is_some(), self.weather.is_some())
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Index of the stage whose typical window contains `thermal_days`.
fn time_stage_index(profile: &CropProfile, thermal_days: f64) -> usize {
    let mut end = 0.0;
    for (i, stage) in profile.stages.iter().enumerate() {
        end += stage.typical_duration_days as f64;
        if thermal_days < end {
            return i;
        }
    }
    profile.stages.len() - 1
}

/// `today - window`, saturating at the earliest representable date.
fn days_before(today: NaiveDate, window: Duration) -> NaiveDate {
    today.checked_sub_signed(window).unwrap_or(NaiveDate::MIN)
}

impl<S, W> GrowthStageDetector<S, W>
where
    S: SatelliteProvider,
    W: WeatherProvider,
{
    pub fn new(table: Arc<StageTable>, satellite: S, weather: W) -> Self {
        let params = DetectorParams::default();
        Self {
            table,
            satellite,
            weather,
            timeout: params.provider_timeout(),
            params,
        }
    }

    pub fn with_params(mut self, params: DetectorParams) -> Self {
        self.timeout = params.provider_timeout();
        self.params = params;
        self
    }

    /// Overrides the timeout applied to each collaborator call.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &StageTable {
        &self.table
    }

    /// Detects the current stage of a field as of today (UTC).
    pub async fn detect_crop_stage(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        planting_date: NaiveDate,
        bounds: Option<&FieldBounds>,
    ) -> Result<CropStageDetection, StageError> {
        let today = Utc::now().date_naive();
        self.detect_crop_stage_on(field_id, crop_type, location, planting_date, bounds, today)
            .await
    }

    /// Detects the current stage of a field as of `today`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::UnsupportedCrop`] when the crop has no stage definitions.
    #[tracing::instrument(skip(self, location, bounds))]
    pub async fn detect_crop_stage_on(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        planting_date: NaiveDate,
        bounds: Option<&FieldBounds>,
        today: NaiveDate,
    ) -> Result<CropStageDetection, StageError> {
        let profile = self.table.crop(crop_type)?;

        let window_start = days_before(today, self.params.ndvi_window()).max(planting_date);
        let obs = self
            .observe(field_id, profile, location, bounds, window_start, planting_date, today)
            .await;

        let days_since_planting = days_between(planting_date, today).max(0);
        let heat = self.heat_factor(profile, obs.weather.as_ref());
        let thermal_days = days_since_planting as f64 * heat;

        let current_ndvi = obs.latest_ndvi();
        let index = self.locate_stage(profile, thermal_days, current_ndvi);
        let stage = &profile.stages[index];

        let stage_start = profile.typical_stage_start(index) as f64;
        let days_in_stage = (((thermal_days - stage_start) / heat).round() as i64).max(0);
        let expected_stage_duration = stage.adjusted_duration(heat);

        let quality = obs.quality();
        let stage_confidence = stage_confidence(stage, current_ndvi, quality);

        let trend = obs.ndvi_trend();
        let progress = days_in_stage as f64 / expected_stage_duration as f64;
        let stage_transition_probability =
            transition_probability(progress, trend, current_ndvi, profile.next_stage(index));

        info!(
            field_id,
            stage = %stage.name,
            days_in_stage,
            confidence = stage_confidence,
            quality = ?quality,
            "Crop stage detected"
        );

        Ok(CropStageDetection {
            field_id: field_id.to_string(),
            crop_type: profile.crop_type.clone(),
            current_stage: stage.clone(),
            stage_index: index,
            stage_confidence,
            days_in_stage,
            expected_stage_duration,
            stage_transition_probability,
            current_ndvi,
            ndvi_trend: trend,
            days_since_planting,
            data_quality: quality,
            detected_on: today,
        })
    }

    /// Reconstructs the stage history of a field as of today (UTC).
    pub async fn get_crop_stage_history(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        planting_date: NaiveDate,
    ) -> Result<CropStageHistory, StageError> {
        let today = Utc::now().date_naive();
        self.get_crop_stage_history_on(field_id, crop_type, location, planting_date, today)
            .await
    }

    /// Reconstructs the stage history of a field as of `today`.
    ///
    /// Each stage that has started gets a window sized by its typical duration
    /// and adjusted by the heat observed during that window. Stages still ahead
    /// use the mean adjustment observed so far.
    ///
    /// # Errors
    ///
    /// - [`StageError::UnsupportedCrop`] for an unknown crop.
    /// - [`StageError::SeasonOutOfRange`] when the adjusted season leaves the
    ///   crop's range, which needs a heat bound wider than the table allows.
    #[tracing::instrument(skip(self, location))]
    pub async fn get_crop_stage_history_on(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        planting_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<CropStageHistory, StageError> {
        let profile = self.table.crop(crop_type)?;

        let samples = if planting_date <= today {
            self.fetch("satellite", field_id, async {
                self.satellite
                    .ndvi_series(field_id, None, planting_date, today)
                    .await
            })
            .await
            .map(|s| self.clear_samples(s))
        } else {
            None
        };

        let mut stage_history = Vec::new();
        let mut observed_factors = Vec::new();
        let mut cursor = planting_date;
        let mut total_days = 0i64;

        for stage in &profile.stages {
            if cursor > today {
                let factor = if observed_factors.is_empty() {
                    1.0
                } else {
                    mean(&observed_factors)
                };
                let duration = stage.adjusted_duration(factor);
                cursor += Duration::days(duration);
                total_days += duration;
                continue;
            }

            let window_end = (cursor + Duration::days(stage.typical_duration_days as i64 - 1)).min(today);
            let weather = self
                .fetch("weather", field_id, async {
                    self.weather
                        .weather_summary(location, profile.base_temperature_c, cursor, window_end)
                        .await
                })
                .await;

            let factor = self.heat_factor(profile, weather.as_ref());
            if weather.is_some() {
                observed_factors.push(factor);
            }
            let duration = stage.adjusted_duration(factor);
            let stage_end = cursor + Duration::days(duration);

            let window_ndvi: Vec<f64> = samples
                .iter()
                .flatten()
                .filter(|s| s.date >= cursor && s.date < stage_end)
                .map(|s| s.ndvi)
                .collect();
            let avg_ndvi = (!window_ndvi.is_empty()).then(|| mean(&window_ndvi));

            let mut detection_confidence = 0.5;
            if weather.is_some() {
                detection_confidence += 0.25;
            }
            if let Some(ndvi) = avg_ndvi {
                detection_confidence += 0.2 * stage.ndvi_range.fit(ndvi);
            }

            stage_history.push(StageHistoryEntry {
                stage: stage.name.clone(),
                start_date: cursor,
                duration_days: duration,
                conditions: StageConditions {
                    avg_ndvi,
                    avg_temperature: weather.map(|w| w.average_temp_c),
                    total_precipitation: weather.map(|w| w.total_rainfall_mm),
                    growing_degree_days: weather.map(|w| w.growing_degree_days),
                },
                detection_confidence,
            });

            cursor = stage_end;
            total_days += duration;
        }

        let range = profile.season_range;
        if !range.contains(total_days) {
            warn!(
                field_id,
                total_days,
                min = range.min_days,
                max = range.max_days,
                "Projected season outside the crop's range"
            );
            return Err(StageError::SeasonOutOfRange {
                crop_type: profile.crop_type.clone(),
                projected_days: total_days,
                min_days: range.min_days,
                max_days: range.max_days,
            });
        }

        let elapsed = days_between(planting_date, today).max(0);
        let season_progress = (elapsed as f64 / total_days as f64).min(1.0);

        debug!(field_id, stages = stage_history.len(), total_days, "Stage history built");

        Ok(CropStageHistory {
            field_id: field_id.to_string(),
            crop_type: profile.crop_type.clone(),
            planting_date,
            current_date: today,
            stage_history,
            projected_harvest_date: cursor,
            season_progress,
        })
    }

    /// Forecasts the transition out of `current_stage_name` as of today (UTC).
    pub async fn predict_stage_transition(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        current_stage_name: &str,
        planting_date: Option<NaiveDate>,
    ) -> Result<StageTransitionPrediction, StageError> {
        let today = Utc::now().date_naive();
        self.predict_stage_transition_on(
            field_id,
            crop_type,
            location,
            current_stage_name,
            planting_date,
            today,
        )
        .await
    }

    /// Forecasts the transition out of `current_stage_name` as of `today`.
    ///
    /// With a planting date the time already spent in the stage comes from heat
    /// accumulation since planting; without one it is read from the latest
    /// NDVI and its trend (see `ndvi_position`), which requires satellite data.
    ///
    /// # Errors
    ///
    /// - [`StageError::UnsupportedCrop`] for an unknown crop.
    /// - [`StageError::InvalidStageName`] when the stage is not defined for the crop.
    /// - [`StageError::TerminalStage`] when the stage is the crop's last.
    /// - [`StageError::DataUnavailable`] with no planting date and no satellite data.
    #[tracing::instrument(skip(self, location))]
    pub async fn predict_stage_transition_on(
        &self,
        field_id: &str,
        crop_type: &str,
        location: GeoPoint,
        current_stage_name: &str,
        planting_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<StageTransitionPrediction, StageError> {
        let profile = self.table.crop(crop_type)?;
        let index =
            profile
                .stage_index(current_stage_name)
                .ok_or_else(|| StageError::InvalidStageName {
                    crop_type: profile.crop_type.clone(),
                    stage: current_stage_name.to_string(),
                })?;
        let Some(next) = profile.next_stage(index) else {
            return Err(StageError::TerminalStage {
                crop_type: profile.crop_type.clone(),
                stage: current_stage_name.to_string(),
            });
        };
        let current = &profile.stages[index];

        let ndvi_start = days_before(today, self.params.ndvi_window());
        let weather_start = planting_date
            .filter(|p| *p <= today)
            .unwrap_or_else(|| days_before(today, self.params.weather_window()));
        let obs = self
            .observe(field_id, profile, location, None, ndvi_start, weather_start, today)
            .await;

        let heat = self.heat_factor(profile, obs.weather.as_ref());
        let expected = current.adjusted_duration(heat);
        let current_ndvi = obs.latest_ndvi();
        let trend = obs.ndvi_trend();
        let quality = obs.quality();

        let (days_in_stage, position_factor) = match (planting_date, current_ndvi) {
            (Some(planted), _) => {
                let thermal_days = days_between(planted, today).max(0) as f64 * heat;
                let start = profile.typical_stage_start(index) as f64;
                ((((thermal_days - start) / heat).round() as i64).max(0), 1.0)
            }
            (None, Some(ndvi)) => {
                let position = ndvi_position(current, next, ndvi, trend);
                ((position * expected as f64).round() as i64, 0.85)
            }
            (None, None) => {
                return Err(StageError::DataUnavailable {
                    field_id: field_id.to_string(),
                });
            }
        };

        let remaining = (expected - days_in_stage).max(1);
        let expected_transition_date = today + Duration::days(remaining);

        let confidence =
            (stage_confidence(current, current_ndvi, quality) * position_factor).clamp(0.05, 1.0);
        let spread = (2.0 + (1.0 - confidence) * (remaining as f64 * 0.5 + 7.0)).ceil() as i64;
        let confidence_interval = ConfidenceInterval {
            earliest: (expected_transition_date - Duration::days(spread)).max(today),
            latest: expected_transition_date + Duration::days(spread),
        };

        let progress = days_in_stage as f64 / expected as f64;
        let transition_probability =
            transition_probability(progress, trend, current_ndvi, Some(next)).max(0.05);

        let triggering_factors = triggering_factors(
            profile,
            current,
            next,
            trend,
            obs.weather.as_ref(),
            days_in_stage,
            expected,
        );
        let recommended_actions = next
            .critical_factors
            .iter()
            .map(|f| format!("Prepare for {}: monitor {}", next.display_name, f))
            .chain(next.management_actions.iter().cloned())
            .collect();

        info!(
            field_id,
            from = %current.name,
            to = %next.name,
            expected = %expected_transition_date,
            probability = transition_probability,
            "Stage transition predicted"
        );

        Ok(StageTransitionPrediction {
            current_stage: current.name.clone(),
            next_stage: next.name.clone(),
            transition_probability,
            expected_transition_date,
            confidence_interval,
            triggering_factors,
            recommended_actions,
            data_quality: quality,
        })
    }

    /// Fetches satellite samples from `ndvi_start` and weather from
    /// `weather_start` up to `today`, concurrently.
    #[allow(clippy::too_many_arguments)]
    async fn observe(
        &self,
        field_id: &str,
        profile: &CropProfile,
        location: GeoPoint,
        bounds: Option<&FieldBounds>,
        ndvi_start: NaiveDate,
        weather_start: NaiveDate,
        today: NaiveDate,
    ) -> Observations {
        let satellite = async {
            if ndvi_start > today {
                return None;
            }
            self.fetch("satellite", field_id, async {
                self.satellite
                    .ndvi_series(field_id, bounds, ndvi_start, today)
                    .await
            })
            .await
            .map(|s| self.clear_samples(s))
            .filter(|s| !s.is_empty())
        };
        let weather = async {
            if weather_start > today {
                return None;
            }
            self.fetch("weather", field_id, async {
                self.weather
                    .weather_summary(location, profile.base_temperature_c, weather_start, today)
                    .await
            })
            .await
        };

        let (samples, weather) = tokio::join!(satellite, weather);
        Observations { samples, weather }
    }

    /// Runs a collaborator call under the configured timeout, logging and
    /// discarding failures.
    async fn fetch<T>(
        &self,
        source: &'static str,
        field_id: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(field_id, source, error = %e, "Collaborator request failed, degrading estimate");
                None
            }
            Err(_) => {
                warn!(
                    field_id,
                    source,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Collaborator request timed out, degrading estimate"
                );
                None
            }
        }
    }

    fn clear_samples(&self, mut samples: Vec<NdviSample>) -> Vec<NdviSample> {
        samples.retain(|s| s.is_clear(self.params.max_cloud_cover_percent));
        samples.sort_by_key(|s| s.date);
        samples
    }

    /// Observed heat accumulation relative to the crop's reference rate.
    fn heat_factor(&self, profile: &CropProfile, weather: Option<&WeatherSummary>) -> f64 {
        let bound = self.params.heat_bound();
        weather
            .and_then(WeatherSummary::daily_gdd)
            .map(|gdd| (gdd / profile.reference_daily_gdd).clamp(1.0 - bound, 1.0 + bound))
            .unwrap_or(1.0)
    }

    /// Picks the stage that best matches elapsed development time and NDVI.
    fn locate_stage(&self, profile: &CropProfile, thermal_days: f64, ndvi: Option<f64>) -> usize {
        let time_index = time_stage_index(profile, thermal_days);
        let Some(ndvi) = ndvi else {
            return time_index;
        };

        let mut best = time_index;
        let mut best_score = f64::NEG_INFINITY;
        for (i, stage) in profile.stages.iter().enumerate() {
            let time_score = match i.abs_diff(time_index) {
                0 => 1.0,
                1 => 0.5,
                _ => 0.1,
            };
            let score = self.params.time_weight * time_score
                + self.params.ndvi_weight * stage.ndvi_range.fit(ndvi);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }
}

/// Closer to the stage's optimal NDVI means higher confidence.
fn stage_confidence(stage: &CropStageDefinition, ndvi: Option<f64>, quality: DataQuality) -> f64 {
    let base = match ndvi {
        Some(v) => 0.4 + 0.55 * stage.ndvi_range.fit(v),
        None => UNCHECKED_STAGE_CONFIDENCE,
    };
    (base * quality.confidence_factor()).clamp(0.05, 1.0)
}

/// Fraction of `current` a field has already gone through, judged by where
/// its NDVI sits on the way from the far edge of the current stage's range to
/// the next stage's optimum. A trend of more than 0.001/day moves the estimate
/// by a tenth toward or away from the next stage.
fn ndvi_position(
    current: &CropStageDefinition,
    next: &CropStageDefinition,
    ndvi: f64,
    trend: Option<f64>,
) -> f64 {
    let target = next.ndvi_range.optimal;
    let origin = if target >= current.ndvi_range.optimal {
        current.ndvi_range.min
    } else {
        current.ndvi_range.max
    };
    let span = target - origin;
    if span.abs() < f64::EPSILON || !ndvi.is_finite() {
        return 0.5;
    }

    let nudge = match trend {
        Some(slope) if slope.abs() > 0.001 => 0.1 * (slope * span).signum(),
        _ => 0.0,
    };
    ((ndvi - origin) / span + nudge).clamp(0.0, 1.0)
}

/// Grows with progress through the stage, nudged by an NDVI trend heading
/// toward (or away from) the next stage's optimum. 0 at the terminal stage.
fn transition_probability(
    progress: f64,
    trend: Option<f64>,
    ndvi: Option<f64>,
    next: Option<&CropStageDefinition>,
) -> f64 {
    let Some(next) = next else {
        return 0.0;
    };
    let base = 0.85 * progress.clamp(0.0, 1.0);

    let nudge = match (trend, ndvi) {
        (Some(slope), Some(v)) if slope.is_finite() => {
            let magnitude = (slope.abs() / 0.01).min(1.0) * 0.15;
            let toward = next.ndvi_range.optimal - v;
            if slope * toward > 0.0 {
                magnitude
            } else {
                -magnitude
            }
        }
        _ => 0.0,
    };

    (base + nudge).clamp(0.0, 1.0)
}

fn triggering_factors(
    profile: &CropProfile,
    current: &CropStageDefinition,
    next: &CropStageDefinition,
    trend: Option<f64>,
    weather: Option<&WeatherSummary>,
    days_in_stage: i64,
    expected: i64,
) -> Vec<String> {
    let mut factors = vec![format!(
        "Accumulated heat reaching about {:.0} GDD to complete {}",
        current.typical_duration_days as f64 * profile.reference_daily_gdd,
        current.display_name
    )];

    if let Some(slope) = trend.filter(|s| s.abs() > 0.001) {
        let direction = if slope > 0.0 { "rising" } else { "falling" };
        factors.push(format!("NDVI {direction} at {slope:+.3} per day"));
    }

    if let Some(w) = weather {
        if next.temperature_range.contains(w.average_temp_c) {
            factors.push(format!(
                "Average temperature {:.1}C within the range for {}",
                w.average_temp_c, next.display_name
            ));
        } else {
            factors.push(format!(
                "Average temperature {:.1}C outside the range for {} may delay the transition",
                w.average_temp_c, next.display_name
            ));
        }
    }

    if days_in_stage >= expected {
        factors.push(format!("Stage has run past its expected {expected} days"));
    }

    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use crate::services::{DailyForecast, TemperatureExtremes};

    struct FixedSatellite(Vec<NdviSample>);

    #[async_trait]
    impl SatelliteProvider for FixedSatellite {
        async fn ndvi_series(
            &self,
            _field_id: &str,
            _bounds: Option<&FieldBounds>,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<NdviSample>> {
            Ok(self
                .0
                .iter()
                .filter(|s| s.date >= start && s.date <= end)
                .copied()
                .collect())
        }

        async fn ndvi_pixels(&self, _field_id: &str, _date: NaiveDate) -> Result<Vec<f64>> {
            Ok(vec![])
        }
    }

    struct FailingSatellite;

    #[async_trait]
    impl SatelliteProvider for FailingSatellite {
        async fn ndvi_series(
            &self,
            _field_id: &str,
            _bounds: Option<&FieldBounds>,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<NdviSample>> {
            Err(anyhow!("scene catalog unavailable"))
        }

        async fn ndvi_pixels(&self, _field_id: &str, _date: NaiveDate) -> Result<Vec<f64>> {
            Err(anyhow!("scene catalog unavailable"))
        }
    }

    /// Weather with a constant daily GDD.
    struct SteadyWeather {
        daily_gdd: f64,
    }

    #[async_trait]
    impl WeatherProvider for SteadyWeather {
        async fn weather_summary(
            &self,
            _location: GeoPoint,
            base_temp_c: f64,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<WeatherSummary> {
            let days = ((end - start).num_days() + 1).max(0) as u32;
            Ok(WeatherSummary {
                average_temp_c: base_temp_c + self.daily_gdd,
                total_rainfall_mm: 2.0 * days as f64,
                growing_degree_days: self.daily_gdd * days as f64,
                extremes: TemperatureExtremes {
                    min_c: base_temp_c,
                    max_c: base_temp_c + 2.0 * self.daily_gdd,
                },
                days,
            })
        }

        async fn forecast(&self, _location: GeoPoint, _days: u32) -> Result<Vec<DailyForecast>> {
            Ok(vec![])
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn here() -> GeoPoint {
        GeoPoint::new(41.6, -93.6)
    }

    fn detector<S: SatelliteProvider, W: WeatherProvider>(s: S, w: W) -> GrowthStageDetector<S, W> {
        GrowthStageDetector::new(Arc::new(StageTable::builtin()), s, w)
    }

    #[test]
    fn test_time_stage_index() {
        let table = StageTable::builtin();
        let corn = table.crop("corn").unwrap();
        assert_eq!(time_stage_index(corn, 0.0), 0);
        assert_eq!(time_stage_index(corn, 9.9), 0);
        assert_eq!(time_stage_index(corn, 10.0), 1);
        assert_eq!(time_stage_index(corn, 60.0), 2);
        assert_eq!(time_stage_index(corn, 400.0), 4);
    }

    #[test]
    fn test_transition_probability_monotonic_in_progress() {
        let table = StageTable::builtin();
        let next = &table.crop("corn").unwrap().stages[2];
        let mut last = -1.0;
        for step in 0..=12 {
            let p = transition_probability(step as f64 / 10.0, None, None, Some(next));
            assert!(p >= last);
            last = p;
        }
        assert_eq!(transition_probability(0.5, None, None, None), 0.0);
    }

    #[test]
    fn test_trend_toward_next_stage_raises_probability() {
        let table = StageTable::builtin();
        let flowering = &table.crop("corn").unwrap().stages[2];
        let flat = transition_probability(0.5, Some(0.0), Some(0.6), Some(flowering));
        let rising = transition_probability(0.5, Some(0.008), Some(0.6), Some(flowering));
        let falling = transition_probability(0.5, Some(-0.008), Some(0.6), Some(flowering));
        assert!(rising > flat);
        assert!(falling < flat);
    }

    #[tokio::test]
    async fn test_detect_flowering_corn() {
        let today = date(2024, 7, 10);
        let planted = today - Duration::days(60);
        let samples = vec![
            NdviSample { date: today - Duration::days(20), ndvi: 0.7, cloud_cover_percent: 5.0 },
            NdviSample { date: today - Duration::days(10), ndvi: 0.76, cloud_cover_percent: 10.0 },
            NdviSample { date: today - Duration::days(5), ndvi: 0.2, cloud_cover_percent: 90.0 },
            NdviSample { date: today - Duration::days(2), ndvi: 0.8, cloud_cover_percent: 0.0 },
        ];
        let d = detector(FixedSatellite(samples), SteadyWeather { daily_gdd: 12.0 });

        let det = d
            .detect_crop_stage_on("f-1", "corn", here(), planted, None, today)
            .await
            .unwrap();

        assert_eq!(det.current_stage.name, "flowering");
        assert_eq!(det.days_in_stage, 5);
        assert_eq!(det.expected_stage_duration, 15);
        assert_eq!(det.current_ndvi, Some(0.8));
        assert_eq!(det.data_quality, DataQuality::Full);
        assert!(det.stage_confidence > 0.8 && det.stage_confidence <= 1.0);
        assert!(det.ndvi_trend.unwrap() > 0.0);
        assert!((0.0..=1.0).contains(&det.stage_transition_probability));
    }

    #[tokio::test]
    async fn test_unsupported_crop() {
        let d = detector(FixedSatellite(vec![]), SteadyWeather { daily_gdd: 12.0 });
        let err = d
            .detect_crop_stage_on("f-1", "quinoa", here(), date(2024, 5, 1), None, date(2024, 6, 1))
            .await
            .unwrap_err();
        assert_eq!(err, StageError::UnsupportedCrop("quinoa".into()));
    }

    #[tokio::test]
    async fn test_warm_season_advances_stage() {
        let today = date(2024, 6, 20);
        let planted = today - Duration::days(50);

        let cool = detector(FailingSatellite, SteadyWeather { daily_gdd: 12.0 })
            .detect_crop_stage_on("f-1", "corn", here(), planted, None, today)
            .await
            .unwrap();
        let warm = detector(FailingSatellite, SteadyWeather { daily_gdd: 15.0 })
            .detect_crop_stage_on("f-1", "corn", here(), planted, None, today)
            .await
            .unwrap();

        assert_eq!(cool.current_stage.name, "vegetative");
        assert_eq!(warm.current_stage.name, "flowering");
        assert_eq!(warm.data_quality, DataQuality::WeatherOnly);
        assert!(warm.expected_stage_duration < 15);
    }

    #[tokio::test]
    async fn test_future_planting_date() {
        let d = detector(FixedSatellite(vec![]), SteadyWeather { daily_gdd: 12.0 });
        let today = date(2024, 4, 1);
        let det = d
            .detect_crop_stage_on("f-1", "soybean", here(), date(2024, 5, 1), None, today)
            .await
            .unwrap();
        assert_eq!(det.stage_index, 0);
        assert_eq!(det.days_in_stage, 0);
        assert_eq!(det.days_since_planting, 0);
    }

    #[tokio::test]
    async fn test_history_projection_within_season_range() {
        let today = date(2024, 7, 1);
        let planted = date(2024, 5, 1);
        for gdd in [5.0, 12.0, 30.0] {
            let d = detector(FailingSatellite, SteadyWeather { daily_gdd: gdd });
            let h = d
                .get_crop_stage_history_on("f-1", "corn", here(), planted, today)
                .await
                .unwrap();

            let season = (h.projected_harvest_date - planted).num_days();
            assert!(h.projected_harvest_date > planted);
            assert!((100..=200).contains(&season), "gdd {gdd}: {season} days");
            assert!((0.0..=1.0).contains(&h.season_progress));
            assert!(!h.stage_history.is_empty());
            assert_eq!(h.stage_history[0].start_date, planted);
        }
    }

    #[tokio::test]
    async fn test_history_windows_are_contiguous() {
        let today = date(2024, 9, 30);
        let planted = date(2024, 5, 1);
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 10.0 });
        let h = d
            .get_crop_stage_history_on("f-1", "corn", here(), planted, today)
            .await
            .unwrap();

        for pair in h.stage_history.windows(2) {
            assert_eq!(
                pair[0].start_date + Duration::days(pair[0].duration_days),
                pair[1].start_date
            );
        }
        // Cooler than reference lengthens every window.
        assert!(h.stage_history[1].duration_days > 45);
    }

    #[tokio::test]
    async fn test_history_season_progress_caps_at_one() {
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 12.0 });
        let h = d
            .get_crop_stage_history_on("f-1", "wheat", here(), date(2023, 3, 1), date(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(h.season_progress, 1.0);
        assert_eq!(h.stage_history.len(), 5);

        let last = h.stage_history.last().unwrap();
        assert_eq!(
            h.projected_harvest_date,
            last.start_date + Duration::days(last.duration_days)
        );
    }

    #[tokio::test]
    async fn test_history_harvest_follows_every_started_stage() {
        let planted = date(2024, 5, 1);
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 9.0 });
        let h = d
            .get_crop_stage_history_on("f-1", "corn", here(), planted, date(2024, 8, 1))
            .await
            .unwrap();

        let last = h.stage_history.last().unwrap();
        assert!(h.projected_harvest_date >= last.start_date + Duration::days(last.duration_days));
        let season = (h.projected_harvest_date - planted).num_days();
        assert!(StageTable::builtin().crop("corn").unwrap().season_range.contains(season));
    }

    #[tokio::test]
    async fn test_history_rejects_season_beyond_range() {
        let params = DetectorParams {
            max_heat_adjustment: 0.9,
            ..DetectorParams::default()
        };
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 1.2 }).with_params(params);

        let err = d
            .get_crop_stage_history_on("f-1", "corn", here(), date(2024, 5, 1), date(2024, 7, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::SeasonOutOfRange { .. }));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_predict_rejects_unknown_and_terminal_stage() {
        let d = detector(FixedSatellite(vec![]), SteadyWeather { daily_gdd: 12.0 });
        let today = date(2024, 7, 1);

        let err = d
            .predict_stage_transition_on("f-1", "corn", here(), "blooming", None, today)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidStageName { .. }));

        let err = d
            .predict_stage_transition_on("f-1", "corn", here(), "maturity", None, today)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::TerminalStage { .. }));
    }

    #[tokio::test]
    async fn test_predict_with_planting_date() {
        let today = date(2024, 6, 20);
        let planted = today - Duration::days(40);
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 12.0 });

        let p = d
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", Some(planted), today)
            .await
            .unwrap();

        assert_eq!(p.next_stage, "flowering");
        // 30 of 45 days in stage
        assert_eq!(p.expected_transition_date, today + Duration::days(15));
        assert!(p.confidence_interval.earliest < p.expected_transition_date);
        assert!(p.expected_transition_date < p.confidence_interval.latest);
        assert!(p.expected_transition_date > today);
        assert!(p.transition_probability > 0.0 && p.transition_probability <= 1.0);
        assert!(p.recommended_actions.iter().any(|a| a.contains("water availability")));
        assert!(!p.triggering_factors.is_empty());
    }

    fn series(today: NaiveDate, points: &[(i64, f64)]) -> FixedSatellite {
        FixedSatellite(
            points
                .iter()
                .map(|&(ago, ndvi)| NdviSample {
                    date: today - Duration::days(ago),
                    ndvi,
                    cloud_cover_percent: 0.0,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_predict_without_planting_date_reads_position_from_ndvi() {
        let today = date(2024, 7, 1);
        let weather = || SteadyWeather { daily_gdd: 12.0 };

        let early = detector(series(today, &[(10, 0.30), (2, 0.32)]), weather())
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", None, today)
            .await
            .unwrap();
        let late = detector(series(today, &[(10, 0.70), (2, 0.74)]), weather())
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", None, today)
            .await
            .unwrap();

        assert!(late.expected_transition_date < early.expected_transition_date);
        assert_eq!(early.expected_transition_date, today + Duration::days(39));
        assert_eq!(late.expected_transition_date, today + Duration::days(2));
    }

    #[test]
    fn test_ndvi_position_follows_direction_of_next_stage() {
        let table = StageTable::builtin();
        let corn = table.crop("corn").unwrap();
        let (vegetative, flowering) = (&corn.stages[1], &corn.stages[2]);
        let (grain_fill, maturity) = (&corn.stages[3], &corn.stages[4]);

        assert_eq!(ndvi_position(vegetative, flowering, 0.3, None), 0.0);
        assert_eq!(ndvi_position(vegetative, flowering, 0.9, None), 1.0);
        assert!(
            ndvi_position(vegetative, flowering, 0.5, Some(0.01))
                > ndvi_position(vegetative, flowering, 0.5, Some(-0.01))
        );
        // Senescence: falling NDVI moves toward maturity.
        assert!(
            ndvi_position(grain_fill, maturity, 0.4, None)
                > ndvi_position(grain_fill, maturity, 0.7, None)
        );
    }

    #[tokio::test]
    async fn test_interval_widens_as_ndvi_leaves_stage_range() {
        let today = date(2024, 6, 20);
        let planted = today - Duration::days(40);
        let width = |p: &StageTransitionPrediction| {
            (p.confidence_interval.latest - p.confidence_interval.earliest).num_days()
        };

        let near = detector(series(today, &[(2, 0.6)]), SteadyWeather { daily_gdd: 12.0 })
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", Some(planted), today)
            .await
            .unwrap();
        let far = detector(series(today, &[(2, 0.1)]), SteadyWeather { daily_gdd: 12.0 })
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", Some(planted), today)
            .await
            .unwrap();

        assert_eq!(near.expected_transition_date, far.expected_transition_date);
        assert!(width(&far) > width(&near));
        assert_eq!(width(&near), 6);
        assert_eq!(width(&far), 20);
    }

    #[tokio::test]
    async fn test_extreme_windows_do_not_overflow() {
        let today = date(2024, 7, 1);
        let params = DetectorParams {
            ndvi_window_days: i64::MAX,
            weather_window_days: i64::MAX,
            ..DetectorParams::default()
        };
        let d = detector(series(today, &[(2, 0.6)]), SteadyWeather { daily_gdd: 12.0 })
            .with_params(params);

        let p = d
            .predict_stage_transition_on("f-1", "corn", here(), "vegetative", None, today)
            .await
            .unwrap();
        assert!(p.expected_transition_date > today);

        let det = d
            .detect_crop_stage_on("f-1", "corn", here(), date(2024, 5, 1), None, today)
            .await
            .unwrap();
        assert_eq!(det.current_ndvi, Some(0.6));
    }

    #[tokio::test]
    async fn test_predict_overdue_stage_still_in_future() {
        let today = date(2024, 8, 1);
        let planted = today - Duration::days(120);
        let d = detector(FailingSatellite, SteadyWeather { daily_gdd: 12.0 });

        let p = d
            .predict_stage_transition_on("f-1", "corn", here(), "emergence", Some(planted), today)
            .await
            .unwrap();

        assert_eq!(p.expected_transition_date, today + Duration::days(1));
        assert!(p.confidence_interval.earliest < p.expected_transition_date);
        assert!(p.triggering_factors.iter().any(|f| f.contains("past its expected")));
    }

    #[tokio::test]
    async fn test_predict_without_any_data_is_unavailable() {
        struct NoWeather;

        #[async_trait]
        impl WeatherProvider for NoWeather {
            async fn weather_summary(
                &self,
                _location: GeoPoint,
                _base_temp_c: f64,
                _start: NaiveDate,
                _end: NaiveDate,
            ) -> Result<WeatherSummary> {
                Err(anyhow!("station offline"))
            }

            async fn forecast(&self, _location: GeoPoint, _days: u32) -> Result<Vec<DailyForecast>> {
                Err(anyhow!("station offline"))
            }
        }

        let d = detector(FailingSatellite, NoWeather);
        let err = d
            .predict_stage_transition_on("f-9", "rice", here(), "tillering", None, date(2024, 7, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StageError::DataUnavailable {
                field_id: "f-9".into()
            }
        );
    }
}
