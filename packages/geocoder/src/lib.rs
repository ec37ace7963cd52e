#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding building blocks for geobatch.
//!
//! Turns raw input lines into structured queries ([`address`]) and resolves
//! each query into exactly one [`Outcome`](geobatch_geocoder_models::Outcome)
//! through the [`resolver::Resolver`] contract:
//!
//! 1. **Forward geocoding** walks an ordered [`chain::ProviderChain`] of
//!    providers (US Census Bureau, Nominatim) configured via TOML files in
//!    `services/`, then falls back to a ZIP centroid from [`lookup`].
//! 2. **Reverse geocoding** validates coordinates and sends them to a single
//!    rate-limited provider through a retrying HTTP helper ([`retry`]).
//! 3. **Elevation** samples a preloaded [`elevation::ElevationGrid`].
//!
//! [`context::GeocodingContext`] owns the process-wide pieces (HTTP client,
//! per-provider rate limiters, datasets) and hands out a fresh resolver per
//! run.
//!
//! Every failure below the resolver is a [`GeocodeError`]; the resolver
//! classifies it into an outcome and never returns an error itself.

pub mod address;
pub mod census;
pub mod chain;
pub mod context;
pub mod elevation;
pub mod lookup;
pub mod nominatim;
pub mod rate_limit;
pub mod resolver;
pub mod retry;
pub mod service_registry;
pub mod states;

use std::time::Duration;

use async_trait::async_trait;
use geobatch_geocoder_models::{
    AddressQuery, CoordinateQuery, FailureCause, ForwardMatch, ReverseMatch,
};
use thiserror::Error;

/// Substrings that mark a provider response as an explicit refusal.
const BLOCK_KEYWORDS: &[&str] = &["blocked", "forbidden", "access denied"];

/// Errors from a single provider call.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP status {status}")]
    Status {
        /// Numeric status code.
        status: u16,
    },

    /// The provider refused to serve us.
    #[error("Blocked by provider: {message}")]
    Blocked {
        /// What the provider said.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl GeocodeError {
    /// Whether the provider signalled that it is refusing our requests.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        match self {
            Self::Blocked { .. } | Self::Status { status: 403 } => true,
            Self::Status { .. } | Self::RateLimited | Self::Parse { .. } => false,
            Self::Http(e) => {
                if e.status().is_some_and(|s| s.as_u16() == 403) {
                    return true;
                }
                let text = e.to_string().to_lowercase();
                BLOCK_KEYWORDS.iter().any(|k| text.contains(k))
            }
        }
    }

    /// Whether the failure is transient and worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if self.is_blocked() {
            return false;
        }
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::RateLimited => true,
            Self::Blocked { .. } | Self::Parse { .. } => false,
        }
    }

    /// Maps this error to the cause recorded on an error outcome.
    #[must_use]
    pub fn cause(&self) -> FailureCause {
        if self.is_blocked() {
            FailureCause::ProviderBlocked
        } else if matches!(self, Self::Parse { .. }) {
            FailureCause::Unexpected
        } else {
            FailureCause::ProviderUnavailable
        }
    }
}

/// A provider that turns a structured address into coordinates.
#[async_trait]
pub trait ForwardProvider: Send + Sync {
    /// Identifier recorded as the outcome source (e.g. `"census"`).
    fn id(&self) -> &str;

    /// Geocodes one address.
    ///
    /// Returns `Ok(None)` when the provider answered but found nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response cannot
    /// be parsed.
    async fn geocode(&self, address: &AddressQuery) -> Result<Option<ForwardMatch>, GeocodeError>;
}

/// A provider that turns coordinates into an address.
#[async_trait]
pub trait ReverseProvider: Send + Sync {
    /// Identifier recorded as the outcome source (e.g. `"nominatim"`).
    fn id(&self) -> &str;

    /// Reverse-geocodes one coordinate pair.
    ///
    /// Returns `Ok(None)` when the provider answered but found nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response cannot
    /// be parsed.
    async fn reverse(&self, point: CoordinateQuery) -> Result<Option<ReverseMatch>, GeocodeError>;
}

/// Builds the shared HTTP client used by every provider.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the TLS backend cannot be initialized.
pub fn build_http_client(
    user_agent: &str,
    timeout: Duration,
) -> Result<reqwest::Client, GeocodeError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}

/// Returns `Some(s)` for non-blank strings.
pub(crate) fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
