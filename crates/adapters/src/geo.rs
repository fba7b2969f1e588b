// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Location-name geocoding with a persistent cache.
//!
//! Resolution is a single JSON call against a Nominatim-style endpoint.
//! Cached results never expire: coordinates of a named place are stable
//! for this purpose, and the cache is what keeps the daemon bootable
//! without network access once a location has resolved.

use lume_storage::{GeoEntry, Geocache};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding returned status {0}")]
    Status(u16),
    #[error("no result for location '{0}'")]
    NoResult(String),
    #[error("storage error: {0}")]
    Storage(#[from] lume_storage::StorageError),
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub use_cache: bool,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
            use_cache: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResult {
    display_name: String,
    /// Nominatim serializes coordinates as strings
    lat: String,
    lon: String,
}

/// Resolves location names to coordinates.
pub struct Geocoder {
    client: reqwest::Client,
    config: GeocoderConfig,
    cache: Option<Geocache>,
}

impl Geocoder {
    pub fn new(config: GeocoderConfig, cache: Option<Geocache>) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config, cache })
    }

    /// Resolve `name` to `(display_name, lat, lon)`, consulting the
    /// persistent cache first when enabled.
    pub async fn resolve(&self, name: &str, now: i64) -> Result<GeoEntry, GeoError> {
        if self.config.use_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.lookup(name)? {
                    debug!(name, "geocode cache hit");
                    return Ok(hit);
                }
            }
        }

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[("q", name), ("format", "json"), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, "lume")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status.as_u16()));
        }
        let results: Vec<NominatimResult> = response.json().await?;
        let first = results.into_iter().next().ok_or_else(|| GeoError::NoResult(name.into()))?;

        let entry = GeoEntry {
            display_name: first.display_name,
            latitude: first.lat.parse().map_err(|_| GeoError::NoResult(name.to_string()))?,
            longitude: first.lon.parse().map_err(|_| GeoError::NoResult(name.to_string()))?,
        };
        info!(name, lat = entry.latitude, lon = entry.longitude, "location resolved");

        if let Some(cache) = &self.cache {
            cache.store(name, &entry, now)?;
        }
        Ok(entry)
    }
}

#[cfg(test)]
#[path = "geo_tests.rs"]
mod tests;
