// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML configuration with environment substitution.
//!
//! `${VAR}` and `${VAR:default}` are replaced in the raw text before the
//! YAML parse, so substitution works anywhere a value can appear.
//! Durations are Go-style strings ("5s", "1h30m", "250ms"). Unknown
//! fields are rejected to catch typos at startup.

use lume_core::parse_duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("environment variable '{0}' is not set and has no default")]
    MissingVar(String),
    #[error("unterminated ${{...}} substitution")]
    UnterminatedVar,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub hue: HueSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub reconciler: ReconcilerSection,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub kv: KvSection,
    #[serde(default)]
    pub database: DatabaseSection,
    /// How long shutdown may take before the process gives up waiting
    #[serde(default = "defaults::shutdown_timeout", with = "duration_str")]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HueSection {
    #[serde(default)]
    pub bridge: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "defaults::hue_timeout", with = "duration_str")]
    pub timeout: Duration,
}

impl Default for HueSection {
    fn default() -> Self {
        Self {
            bridge: String::new(),
            token: String::new(),
            timeout: defaults::hue_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsSection {
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub sse: SseSection,
    #[serde(default)]
    pub webhook: WebhookSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusSection {
    #[serde(default = "defaults::bus_workers")]
    pub workers: usize,
    #[serde(default = "defaults::bus_queue_size")]
    pub queue_size: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self { workers: defaults::bus_workers(), queue_size: defaults::bus_queue_size() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SseSection {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default = "defaults::min_retry_backoff", with = "duration_str")]
    pub min_retry_backoff: Duration,
    #[serde(default = "defaults::max_retry_backoff", with = "duration_str")]
    pub max_retry_backoff: Duration,
    #[serde(default = "defaults::retry_multiplier")]
    pub retry_multiplier: f64,
    /// 0 retries forever; exceeding a positive limit is fatal
    #[serde(default)]
    pub max_reconnects: u32,
}

impl Default for SseSection {
    fn default() -> Self {
        Self {
            enabled: true,
            min_retry_backoff: defaults::min_retry_backoff(),
            max_retry_backoff: defaults::max_retry_backoff(),
            retry_multiplier: defaults::retry_multiplier(),
            max_reconnects: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::webhook_host")]
    pub host: String,
    #[serde(default = "defaults::webhook_port")]
    pub port: u16,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self { enabled: false, host: defaults::webhook_host(), port: defaults::webhook_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub geo: GeoSection,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { enabled: true, geo: GeoSection::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoSection {
    /// Enables solar time expressions
    #[serde(default)]
    pub enabled: bool,
    /// Location name to geocode; ignored when lat/lon are set
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default = "defaults::timezone")]
    pub timezone: String,
    #[serde(default = "defaults::geo_timeout", with = "duration_str")]
    pub http_timeout: Duration,
    #[serde(default = "defaults::enabled")]
    pub use_cache: bool,
}

impl Default for GeoSection {
    fn default() -> Self {
        Self {
            enabled: false,
            name: String::new(),
            lat: None,
            lon: None,
            timezone: defaults::timezone(),
            http_timeout: defaults::geo_timeout(),
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerSection {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// 0 disables the periodic full pass
    #[serde(default = "defaults::periodic_interval", with = "duration_str")]
    pub periodic_interval: Duration,
    #[serde(default = "defaults::rate_limit_rps")]
    pub rate_limit_rps: f64,
    #[serde(default = "defaults::debounce", with = "duration_str")]
    pub debounce: Duration,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            periodic_interval: defaults::periodic_interval(),
            rate_limit_rps: defaults::rate_limit_rps(),
            debounce: defaults::debounce(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default = "defaults::retention_period", with = "duration_str")]
    pub retention_period: Duration,
    #[serde(default = "defaults::retention_interval", with = "duration_str")]
    pub retention_interval: Duration,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_period: defaults::retention_period(),
            retention_interval: defaults::retention_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvSection {
    #[serde(default = "defaults::kv_cleanup_interval", with = "duration_str")]
    pub cleanup_interval: Duration,
}

impl Default for KvSection {
    fn default() -> Self {
        Self { cleanup_interval: defaults::kv_cleanup_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default = "defaults::database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: defaults::database_path() }
    }
}

mod defaults {
    use std::path::PathBuf;
    use std::time::Duration;

    pub(super) fn enabled() -> bool {
        true
    }
    pub(super) fn shutdown_timeout() -> Duration {
        Duration::from_secs(10)
    }
    pub(super) fn hue_timeout() -> Duration {
        Duration::from_secs(5)
    }
    pub(super) fn bus_workers() -> usize {
        4
    }
    pub(super) fn bus_queue_size() -> usize {
        100
    }
    pub(super) fn min_retry_backoff() -> Duration {
        Duration::from_secs(1)
    }
    pub(super) fn max_retry_backoff() -> Duration {
        Duration::from_secs(60)
    }
    pub(super) fn retry_multiplier() -> f64 {
        2.0
    }
    pub(super) fn webhook_host() -> String {
        "127.0.0.1".to_string()
    }
    pub(super) fn webhook_port() -> u16 {
        8787
    }
    pub(super) fn timezone() -> String {
        "UTC".to_string()
    }
    pub(super) fn geo_timeout() -> Duration {
        Duration::from_secs(10)
    }
    pub(super) fn periodic_interval() -> Duration {
        Duration::from_secs(60)
    }
    pub(super) fn rate_limit_rps() -> f64 {
        10.0
    }
    pub(super) fn debounce() -> Duration {
        Duration::from_millis(250)
    }
    pub(super) fn retention_period() -> Duration {
        Duration::from_secs(30 * 24 * 3600)
    }
    pub(super) fn retention_interval() -> Duration {
        Duration::from_secs(3600)
    }
    pub(super) fn kv_cleanup_interval() -> Duration {
        Duration::from_secs(60)
    }
    pub(super) fn database_path() -> PathBuf {
        PathBuf::from("lume.db")
    }
}

/// Serde adapter for Go-style duration strings.
mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Load a config file, applying environment substitution first.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_str(&raw)
    }

    /// Parse config text, applying environment substitution first.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env(raw, |name| std::env::var(name).ok())?;
        Ok(serde_yaml::from_str(&substituted)?)
    }
}

/// Replace `${VAR}` and `${VAR:default}` using the provided lookup.
pub(crate) fn substitute_env(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedVar)?;
        let expr = &after[..end];
        let (name, default) = match expr.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => match default {
                Some(default) => out.push_str(default),
                None => return Err(ConfigError::MissingVar(name.to_string())),
            },
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
