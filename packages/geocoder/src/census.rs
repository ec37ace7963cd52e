//! US Census Bureau Geocoder client.
//!
//! Free single-address geocoding via the Census Bureau's structured
//! endpoint. No API key required.
//!
//! - `GET /geocoder/locations/address`
//!
//! See <https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html>

use async_trait::async_trait;
use geobatch_geocoder_models::{AddressQuery, ForwardMatch};

use crate::retry::{self, RetryPolicy};
use crate::{ForwardProvider, GeocodeError, non_empty, states};

/// Census Bureau forward geocoder.
#[derive(Debug, Clone)]
pub struct CensusGeocoder {
    id: String,
    client: reqwest::Client,
    base_url: String,
    benchmark: String,
    retry: RetryPolicy,
}

impl CensusGeocoder {
    /// Creates a client for `base_url` (e.g.
    /// `"https://geocoding.geo.census.gov/geocoder"`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        benchmark: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            benchmark: benchmark.into(),
            retry,
        }
    }
}

#[async_trait]
impl ForwardProvider for CensusGeocoder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn geocode(&self, address: &AddressQuery) -> Result<Option<ForwardMatch>, GeocodeError> {
        let url = format!("{}/locations/address", self.base_url);
        let state = states::abbreviate(&address.state);
        let zip = address.zip.clone().unwrap_or_default();

        let params = [
            ("street", address.street.as_str()),
            ("city", address.city.as_str()),
            ("state", state.as_str()),
            ("zip", zip.as_str()),
            ("benchmark", self.benchmark.as_str()),
            ("format", "json"),
        ];

        let body = retry::send_json(|| self.client.get(&url).query(&params), &self.retry).await?;
        parse_single_response(&body)
    }
}

/// Parses the JSON response from the single-address endpoint.
fn parse_single_response(body: &serde_json::Value) -> Result<Option<ForwardMatch>, GeocodeError> {
    let matches = body["result"]["addressMatches"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing addressMatches array".to_string(),
        })?;

    let Some(first) = matches.first() else {
        return Ok(None);
    };

    let x = first["coordinates"]["x"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing x coordinate".to_string(),
        })?;
    let y = first["coordinates"]["y"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing y coordinate".to_string(),
        })?;

    let components = &first["addressComponents"];
    let component = |key: &str| non_empty(components[key].as_str());

    let building_range = match (component("fromAddress"), component("toAddress")) {
        (Some(from), Some(to)) => Some(format!("{from}-{to}")),
        _ => None,
    };

    Ok(Some(ForwardMatch {
        matched_address: first["matchedAddress"].as_str().unwrap_or_default().to_string(),
        latitude: y,
        longitude: x,
        building_range,
        street_name: component("streetName"),
        suffix_type: component("suffixType"),
        city: component("city"),
        state: component("state"),
        postal_code: component("zip"),
    }))
}
