//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]. A deployment can replace the
//! embedded set with its own directory of TOML files ([`load_services`]).

use std::path::Path;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors from loading service configurations from disk.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// I/O error while reading the directory or a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file is not a valid service definition.
    #[error("invalid service config {file}: {source}")]
    Toml {
        /// File that failed to parse.
        file: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// Which direction a service geocodes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceRole {
    /// Address to coordinates. Forward services form the provider chain.
    Forward,
    /// Coordinates to address. The first enabled reverse service is used.
    Reverse,
}

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"census"`, `"nominatim"`). Recorded as the
    /// `source` of matched outcomes.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service is active in the geocoding pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order — lower values run first.
    pub priority: u32,
    /// Forward or reverse.
    pub role: ServiceRole,
    /// Minimum delay between requests in milliseconds.
    #[serde(default)]
    pub rate_limit_ms: u64,
    /// Attempts and backoff for transient failures.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// US Census Bureau single-address geocoder.
    Census {
        /// API base URL (e.g., `"https://geocoding.geo.census.gov/geocoder"`).
        base_url: String,
        /// Benchmark name (e.g., `"Public_AR_Current"`).
        benchmark: String,
    },
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// API base URL (e.g., `"https://nominatim.openstreetmap.org"`).
        base_url: String,
    },
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Census { base_url, .. } | ProviderConfig::Nominatim { base_url } => {
                base_url
            }
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("census", include_str!("../services/census.toml")),
    ("nominatim", include_str!("../services/nominatim.toml")),
    (
        "nominatim_reverse",
        include_str!("../services/nominatim_reverse.toml"),
    ),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 3;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services of `role`, sorted by priority (ascending).
#[must_use]
pub fn enabled_services(role: ServiceRole) -> Vec<GeocodingService> {
    select(all_services(), role)
}

/// Loads every `*.toml` service definition in `dir`.
///
/// # Errors
///
/// Returns [`RegistryError`] if the directory cannot be read or a file is
/// not a valid service definition.
pub fn load_services(dir: &Path) -> Result<Vec<GeocodingService>, RegistryError> {
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "toml"));
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)?;
            toml::de::from_str(&text).map_err(|source| RegistryError::Toml {
                file: path.display().to_string(),
                source,
            })
        })
        .collect()
}

/// Filters `services` to enabled ones of `role`, sorted by priority.
#[must_use]
pub fn select(services: Vec<GeocodingService>, role: ServiceRole) -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> = services
        .into_iter()
        .filter(|s| s.enabled && s.role == role)
        .collect();
    services.sort_by_key(|s| s.priority);
    services
}
