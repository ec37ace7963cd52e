#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Query and outcome types shared by the geobatch resolution pipeline.
//!
//! This crate contains only data types and simple conversions. It has no
//! network, file, or async dependencies.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which kind of lookup a query is resolved with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LookupKind {
    /// Address to coordinates.
    Forward,
    /// Coordinates to address.
    Reverse,
    /// Coordinates to elevation.
    Elevation,
}

/// One unit of work: a raw input line plus its structured interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// The input line exactly as it was read (trimmed).
    pub raw: String,
    /// Structured interpretation of `raw`.
    pub kind: QueryKind,
}

/// Structured interpretation of a raw input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryKind {
    /// A postal address to forward-geocode.
    Address(AddressQuery),
    /// A coordinate pair to reverse-geocode or sample for elevation.
    Coordinate(CoordinateQuery),
    /// Input that could not be interpreted. Still produces one output row.
    Malformed {
        /// Why the input was rejected.
        reason: String,
    },
}

/// A parsed postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    /// Street line (e.g. `"123 Main St"`).
    pub street: String,
    /// City name. Empty when the address could not be split.
    pub city: String,
    /// Two-letter state code or full state name. May be empty.
    pub state: String,
    /// Five-digit ZIP, optionally with a `-NNNN` extension.
    pub zip: Option<String>,
}

impl AddressQuery {
    /// Returns the five-digit ZIP prefix used for centroid lookups.
    #[must_use]
    pub fn zip5(&self) -> Option<&str> {
        self.zip
            .as_deref()
            .map(|zip| zip.split('-').next().unwrap_or(zip).trim())
            .filter(|zip| !zip.is_empty())
    }
}

/// A latitude/longitude pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateQuery {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl CoordinateQuery {
    /// Whether latitude is within `[-90, 90]` and longitude within
    /// `[-180, 180]`.
    #[must_use]
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Query {
    /// Creates a malformed query carrying the raw text and a reason.
    #[must_use]
    pub fn malformed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            kind: QueryKind::Malformed {
                reason: reason.into(),
            },
        }
    }
}

/// Immutable result of resolving one [`Query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// The query this outcome answers.
    pub query: Query,
    /// What happened.
    pub kind: OutcomeKind,
}

/// The tagged result of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A provider or dataset answered the query.
    Matched {
        /// Identifier of the provider or dataset that answered.
        source: String,
        /// The answer itself.
        answer: Answer,
    },
    /// Primary resolution failed and a ZIP centroid was substituted.
    FallbackUsed {
        /// The substituted centroid.
        centroid: Centroid,
        /// Error encountered before falling back, if any.
        note: Option<String>,
    },
    /// Resolution was attempted and produced no data.
    NotFound {
        /// Error encountered while trying, if any.
        note: Option<String>,
    },
    /// Resolution could not be attempted or failed unrecoverably.
    Error {
        /// Classified cause.
        cause: FailureCause,
        /// Human-readable message.
        message: String,
    },
}

/// Payload of a [`OutcomeKind::Matched`] outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// Forward geocoding match.
    Forward(ForwardMatch),
    /// Reverse geocoding match.
    Reverse(ReverseMatch),
    /// Elevation sample.
    Elevation {
        /// Sampled value in the dataset's units (meters for common DEMs).
        value: f64,
    },
}

/// A forward-geocoding match with normalized address components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardMatch {
    /// Canonical address as returned by the provider.
    pub matched_address: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// House number range of the matched segment (e.g. `"100-198"`).
    pub building_range: Option<String>,
    /// Street name without type suffix.
    pub street_name: Option<String>,
    /// Street type suffix (e.g. `"ST"`).
    pub suffix_type: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// Full state name (codes are expanded).
    pub state: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
}

/// A reverse-geocoding match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMatch {
    /// Full display address.
    pub full_address: String,
    /// Road name.
    pub street: Option<String>,
    /// Suburb or locality.
    pub locality: Option<String>,
    /// District.
    pub district: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Town (falls back to suburb).
    pub town: Option<String>,
    /// State.
    pub state: Option<String>,
    /// Country.
    pub country: Option<String>,
    /// Postal code.
    pub postcode: Option<String>,
    /// Province.
    pub province: Option<String>,
}

/// Approximate centre point of a ZIP code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// The ZIP code that was looked up.
    pub zip: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Place name associated with the ZIP.
    pub place: String,
}

/// Classified cause of an [`OutcomeKind::Error`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCause {
    /// The input text could not be parsed.
    MalformedInput,
    /// Coordinates were outside the valid range. No network call was made.
    InvalidCoordinates,
    /// Network failure, timeout, or server error after retries.
    ProviderUnavailable,
    /// The provider explicitly refused the request.
    ProviderBlocked,
    /// A required dataset is not loaded.
    DataUnavailable,
    /// Anything else (malformed provider payload, worker panic, ...).
    Unexpected,
}

/// Coarse status written to the `status` output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeStatus {
    /// [`OutcomeKind::Matched`].
    Matched,
    /// [`OutcomeKind::FallbackUsed`].
    Fallback,
    /// [`OutcomeKind::NotFound`].
    NotFound,
    /// [`OutcomeKind::Error`].
    Error,
}

impl Outcome {
    /// Builds a [`OutcomeKind::Matched`] outcome.
    #[must_use]
    pub fn matched(query: Query, source: impl Into<String>, answer: Answer) -> Self {
        Self {
            query,
            kind: OutcomeKind::Matched {
                source: source.into(),
                answer,
            },
        }
    }

    /// Builds a [`OutcomeKind::FallbackUsed`] outcome.
    #[must_use]
    pub const fn fallback(query: Query, centroid: Centroid, note: Option<String>) -> Self {
        Self {
            query,
            kind: OutcomeKind::FallbackUsed { centroid, note },
        }
    }

    /// Builds a [`OutcomeKind::NotFound`] outcome.
    #[must_use]
    pub const fn not_found(query: Query, note: Option<String>) -> Self {
        Self {
            query,
            kind: OutcomeKind::NotFound { note },
        }
    }

    /// Builds a [`OutcomeKind::Error`] outcome.
    #[must_use]
    pub fn error(query: Query, cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            query,
            kind: OutcomeKind::Error {
                cause,
                message: message.into(),
            },
        }
    }

    /// Coarse status of this outcome.
    #[must_use]
    pub const fn status(&self) -> OutcomeStatus {
        match self.kind {
            OutcomeKind::Matched { .. } => OutcomeStatus::Matched,
            OutcomeKind::FallbackUsed { .. } => OutcomeStatus::Fallback,
            OutcomeKind::NotFound { .. } => OutcomeStatus::NotFound,
            OutcomeKind::Error { .. } => OutcomeStatus::Error,
        }
    }

    /// Identifier of the provider or dataset that produced the data, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match &self.kind {
            OutcomeKind::Matched { source, .. } => Some(source),
            OutcomeKind::FallbackUsed { .. } => Some("zip_centroid"),
            OutcomeKind::NotFound { .. } | OutcomeKind::Error { .. } => None,
        }
    }

    /// Error text attached to this outcome, if any.
    ///
    /// Fallback and not-found outcomes may carry a note alongside their
    /// (possibly empty) answer.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match &self.kind {
            OutcomeKind::Matched { .. } => None,
            OutcomeKind::FallbackUsed { note, .. } | OutcomeKind::NotFound { note } => {
                note.clone()
            }
            OutcomeKind::Error { cause, message } => Some(format!("{cause}: {message}")),
        }
    }
}
