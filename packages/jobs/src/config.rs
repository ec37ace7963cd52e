//! Runtime settings.
//!
//! Resolution order, later wins:
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config`, or `geobatch.toml` in the working
//!    directory when present),
//! 3. `GEOBATCH_*` environment variables,
//! 4. command-line flags (applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::scheduler::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "geobatch.toml";

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Settings`].
    #[error("invalid config {}: {source}", path.display())]
    Toml {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// An environment variable holds a value of the wrong type.
    #[error("invalid value for {var}: {value:?}")]
    Env {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

/// Settings shared by the CLI and the job coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Queries per chunk.
    pub batch_size: usize,
    /// Concurrent resolutions inside a chunk.
    pub concurrency: usize,
    /// Directory receiving `<job_id>_<suffix>.csv` files.
    pub output_dir: PathBuf,
    /// ZIP centroid CSV (`postcode,lat,long,place`).
    pub zip_lookup_path: PathBuf,
    /// ESRI ASCII elevation grid.
    pub elevation_grid_path: PathBuf,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// `User-Agent` sent to every provider.
    pub user_agent: String,
    /// Directory of service TOML files replacing the built-in providers.
    pub services_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("outputs"),
            zip_lookup_path: PathBuf::from("usa_postcode_lookup.csv"),
            elevation_grid_path: PathBuf::from("elevation.asc"),
            request_timeout_secs: 5,
            user_agent: format!("geobatch/{}", env!("CARGO_PKG_VERSION")),
            services_dir: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or [`DEFAULT_CONFIG_FILE`] if it exists)
    /// and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly given file is missing, a file
    /// is invalid, or an environment variable cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    /// Reads settings from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Applies `GEOBATCH_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a numeric variable does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GEOBATCH_BATCH_SIZE") {
            self.batch_size = parse_env("GEOBATCH_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("GEOBATCH_CONCURRENCY") {
            self.concurrency = parse_env("GEOBATCH_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("GEOBATCH_REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_env("GEOBATCH_REQUEST_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("GEOBATCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GEOBATCH_ZIP_LOOKUP") {
            self.zip_lookup_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GEOBATCH_ELEVATION_GRID") {
            self.elevation_grid_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GEOBATCH_SERVICES_DIR") {
            self.services_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// HTTP timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert!(settings.user_agent.starts_with("geobatch/"));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join(format!("geobatch_config_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("geobatch.toml");
        std::fs::write(&path, "batch_size = 50\noutput_dir = \"/tmp/out\"\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/out"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn env_overrides_file_values() {
        let env: BTreeMap<&str, &str> = [
            ("GEOBATCH_CONCURRENCY", "8"),
            ("GEOBATCH_ZIP_LOOKUP", "/data/zips.csv"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings {
            concurrency: 2,
            ..Settings::default()
        };
        settings
            .apply_env(|var| env.get(var).map(ToString::to_string))
            .unwrap();

        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.zip_lookup_path, PathBuf::from("/data/zips.csv"));
        assert_eq!(settings.batch_size, 10);
    }

    #[test]
    fn rejects_non_numeric_env() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|var| (var == "GEOBATCH_BATCH_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "GEOBATCH_BATCH_SIZE"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("geobatch_missing_config.toml");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Io { .. })
        ));
    }
}
