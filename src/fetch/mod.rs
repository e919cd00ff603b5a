//! HTTP plumbing shared by the provider clients.
//!
//! Everything goes through [`HttpClient`] so authentication can be layered
//! on as wrappers and tests can swap the transport.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

/// GETs `url` and decodes the JSON body, failing on non-success status.
pub async fn fetch_json<C, T>(client: &C, url: Url) -> Result<T>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let req = reqwest::Request::new(reqwest::Method::GET, url.clone());

    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("request to {} failed", url.path()))?
        .error_for_status()?;
    debug!(path = url.path(), status = %resp.status(), "Provider responded");

    Ok(resp.json::<T>().await?)
}
