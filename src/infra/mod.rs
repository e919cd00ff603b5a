//! HTTP-backed collaborators for the CLI.

pub mod satellite;
pub mod weather;

use anyhow::{Result, anyhow};
use crop_health_engine::config::ProviderConfig;
use crop_health_engine::fetch::{BasicClient, HttpClient, auth::ApiKey, auth::UrlParam};
use reqwest::Url;
use std::sync::Arc;

use self::satellite::HttpSatelliteProvider;
use self::weather::HttpWeatherProvider;

/// Builds both providers, wrapping the transport with each service's key.
///
/// The satellite service takes a bearer token; the weather service takes
/// its key as an `apikey` query parameter.
pub fn build_providers(
    config: &ProviderConfig,
) -> Result<(HttpSatelliteProvider, HttpWeatherProvider)> {
    let transport = BasicClient::with_timeout(config.timeout)?;

    let satellite_client: Arc<dyn HttpClient> = match &config.satellite_api_key {
        Some(key) => Arc::new(ApiKey::bearer(transport.clone(), key)?),
        None => Arc::new(transport.clone()),
    };
    let weather_client: Arc<dyn HttpClient> = match &config.weather_api_key {
        Some(key) => Arc::new(UrlParam {
            inner: transport,
            param_name: "apikey".to_string(),
            key: key.clone(),
        }),
        None => Arc::new(transport),
    };

    Ok((
        HttpSatelliteProvider::new(satellite_client, &config.satellite_url)?,
        HttpWeatherProvider::new(weather_client, &config.weather_url)?,
    ))
}

/// `base` with `segments` appended as escaped path segments.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
