//! Builds the shared geocoding context from [`Settings`].
//!
//! Missing reference data is not fatal: without a ZIP table forward lookups
//! simply never fall back, and without an elevation grid elevation lookups
//! report `data_unavailable`.

use std::path::Path;
use std::sync::Arc;

use geobatch_geocoder::context::GeocodingContext;
use geobatch_geocoder::elevation::ElevationGrid;
use geobatch_geocoder::lookup::ZipLookup;
use geobatch_geocoder::service_registry::{
    GeocodingService, RegistryError, all_services, load_services,
};
use geobatch_jobs::config::Settings;

/// Service definitions from `services_dir` when set, else the built-in set.
///
/// # Errors
///
/// Returns [`RegistryError`] if the override directory cannot be read.
pub fn load_service_set(settings: &Settings) -> Result<Vec<GeocodingService>, RegistryError> {
    match &settings.services_dir {
        Some(dir) => {
            let services = load_services(dir)?;
            log::info!(
                "Loaded {} service definition(s) from {}",
                services.len(),
                dir.display()
            );
            Ok(services)
        }
        None => Ok(all_services()),
    }
}

/// Loads the ZIP centroid table, or an empty one if it cannot be read.
pub fn load_lookup(path: &Path) -> ZipLookup {
    match ZipLookup::load(path) {
        Ok(lookup) => {
            log::info!("Loaded {} ZIP centroids from {}", lookup.len(), path.display());
            lookup
        }
        Err(e) => {
            log::warn!("ZIP fallback disabled: {e}");
            ZipLookup::empty()
        }
    }
}

/// Loads the elevation grid, or `None` if it cannot be read.
pub fn load_grid(path: &Path) -> Option<ElevationGrid> {
    match ElevationGrid::load(path) {
        Ok(grid) => Some(grid),
        Err(e) => {
            log::warn!("Elevation lookups disabled: {e}");
            None
        }
    }
}

/// Builds the HTTP client, providers, and reference data for one process.
///
/// # Errors
///
/// Returns an error if the service definitions cannot be loaded or the HTTP
/// client cannot be built.
pub fn build_context(settings: &Settings) -> Result<GeocodingContext, Box<dyn std::error::Error>> {
    let services = load_service_set(settings)?;
    let client =
        geobatch_geocoder::build_http_client(&settings.user_agent, settings.request_timeout())?;

    let lookup = Arc::new(load_lookup(&settings.zip_lookup_path));
    let grid = load_grid(&settings.elevation_grid_path).map(Arc::new);

    let context = GeocodingContext::from_services(services, &client, lookup, grid);
    log::debug!("{context:?}");
    Ok(context)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("geobatch_cli_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_reference_data_degrades() {
        let dir = temp_dir();
        assert!(load_lookup(&dir.join("zips.csv")).is_empty());
        assert!(load_grid(&dir.join("grid.asc")).is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn builtin_services_without_override() {
        let services = load_service_set(&Settings::default()).unwrap();
        assert!(services.iter().any(|s| s.id == "census"));
    }

    #[test]
    fn services_dir_replaces_builtin_set() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("local.toml"),
            r#"
id = "local"
name = "Local Nominatim"
priority = 1
role = "forward"

[provider]
type = "nominatim"
base_url = "http://localhost:8080"
"#,
        )
        .unwrap();

        let settings = Settings {
            services_dir: Some(dir.clone()),
            ..Settings::default()
        };
        let services = load_service_set(&settings).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "local");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn context_without_data_files() {
        let dir = temp_dir();
        let settings = Settings {
            zip_lookup_path: dir.join("zips.csv"),
            elevation_grid_path: dir.join("grid.asc"),
            ..Settings::default()
        };
        let context = build_context(&settings).unwrap();
        assert!(!context.has_elevation());
        assert_eq!(context.forward_providers(), vec!["census", "nominatim"]);
        assert_eq!(context.reverse_provider(), Some("nominatim_reverse"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
