//! Nominatim / OpenStreetMap geocoder client.
//!
//! Serves both directions:
//! - structured forward search (`/search`), used as a secondary provider in
//!   the forward chain;
//! - reverse lookup (`/reverse`), the single reverse-geocoding provider.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum on the
//! public instance, and it answers HTTP 403 once a client is blocked. The
//! caller is responsible for rate limiting (see `rate_limit_ms` in the
//! service TOML configuration).
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/> and
//! <https://nominatim.org/release-docs/develop/api/Reverse/>

use async_trait::async_trait;
use geobatch_geocoder_models::{AddressQuery, CoordinateQuery, ForwardMatch, ReverseMatch};

use crate::retry::{self, RetryPolicy};
use crate::{ForwardProvider, GeocodeError, ReverseProvider, non_empty};

/// Nominatim client for forward and reverse lookups.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    id: String,
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl NominatimClient {
    /// Creates a client for `base_url` (e.g.
    /// `"https://nominatim.openstreetmap.org"`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }
}

#[async_trait]
impl ForwardProvider for NominatimClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn geocode(&self, address: &AddressQuery) -> Result<Option<ForwardMatch>, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let zip = address.zip.clone().unwrap_or_default();

        let mut params = vec![
            ("street", address.street.as_str()),
            ("countrycodes", "us"),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("limit", "1"),
        ];
        for (key, value) in [
            ("city", address.city.as_str()),
            ("state", address.state.as_str()),
            ("postalcode", zip.as_str()),
        ] {
            if !value.is_empty() {
                params.push((key, value));
            }
        }

        let body = retry::send_json(|| self.client.get(&url).query(&params), &self.retry).await?;
        parse_search_response(&body)
    }
}

#[async_trait]
impl ReverseProvider for NominatimClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reverse(&self, point: CoordinateQuery) -> Result<Option<ReverseMatch>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = point.latitude.to_string();
        let lon = point.longitude.to_string();

        let params = [
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("accept-language", "en"),
        ];

        let body = retry::send_json(|| self.client.get(&url).query(&params), &self.retry).await?;
        parse_reverse_response(&body)
    }
}

/// Parses a `/search` response (a JSON array of places).
fn parse_search_response(body: &serde_json::Value) -> Result<Option<ForwardMatch>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = parse_degrees(&first["lat"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in Nominatim response".to_string(),
    })?;
    let lon = parse_degrees(&first["lon"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lon in Nominatim response".to_string(),
    })?;

    let address = &first["address"];
    let field = |key: &str| non_empty(address[key].as_str());

    Ok(Some(ForwardMatch {
        matched_address: first["display_name"].as_str().unwrap_or_default().to_string(),
        latitude: lat,
        longitude: lon,
        building_range: None,
        street_name: field("road"),
        suffix_type: None,
        city: field("city").or_else(|| field("town")).or_else(|| field("village")),
        state: field("state"),
        postal_code: field("postcode"),
    }))
}

/// Parses a `/reverse` response (a single place object).
///
/// Nominatim reports "nothing here" as `{"error": "Unable to geocode"}`
/// with status 200.
fn parse_reverse_response(body: &serde_json::Value) -> Result<Option<ReverseMatch>, GeocodeError> {
    if !body.is_object() {
        return Err(GeocodeError::Parse {
            message: "Nominatim reverse response is not an object".to_string(),
        });
    }
    if let Some(error) = body["error"].as_str() {
        log::debug!("Nominatim reverse: {error}");
        return Ok(None);
    }

    let Some(full_address) = non_empty(body["display_name"].as_str()) else {
        return Ok(None);
    };

    let address = &body["address"];
    let field = |key: &str| non_empty(address[key].as_str());

    Ok(Some(ReverseMatch {
        full_address,
        street: field("road"),
        locality: field("suburb").or_else(|| field("locality")),
        district: field("district"),
        city: field("city"),
        town: field("town").or_else(|| field("suburb")),
        state: field("state"),
        country: field("country"),
        postcode: field("postcode"),
        province: field("province"),
    }))
}

/// Nominatim encodes coordinates as strings; accept numbers too.
fn parse_degrees(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
}
