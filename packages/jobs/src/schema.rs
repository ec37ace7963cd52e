//! Fixed output column schemas and outcome → row mapping.
//!
//! Every outcome maps to exactly one row with the same column count as the
//! header. Absent values are written as empty cells.

use geobatch_geocoder_models::{Answer, LookupKind, Outcome, OutcomeKind, QueryKind};

/// Columns for forward geocoding output.
pub const FORWARD_COLUMNS: &[&str] = &[
    "input_address",
    "matched_address",
    "lat",
    "long",
    "building_range",
    "street_name",
    "suffix_type",
    "city_name",
    "state_name",
    "postal_code",
    "postcode_lat",
    "postcode_long",
    "place",
    "source",
    "status",
    "error",
];

/// Columns for reverse geocoding output.
pub const REVERSE_COLUMNS: &[&str] = &[
    "input_coordinates",
    "full_address",
    "street",
    "locality",
    "district",
    "city",
    "town",
    "state",
    "country",
    "postcode",
    "province",
    "source",
    "status",
    "error",
];

/// Columns for elevation output.
pub const ELEVATION_COLUMNS: &[&str] = &[
    "input_coordinates",
    "latitude",
    "longitude",
    "elevation",
    "source",
    "status",
    "error",
];

/// Header row for `kind`.
#[must_use]
pub const fn columns(kind: LookupKind) -> &'static [&'static str] {
    match kind {
        LookupKind::Forward => FORWARD_COLUMNS,
        LookupKind::Reverse => REVERSE_COLUMNS,
        LookupKind::Elevation => ELEVATION_COLUMNS,
    }
}

/// Output file name suffix for `kind` (`<job_id>_<suffix>.csv`).
#[must_use]
pub const fn file_suffix(kind: LookupKind) -> &'static str {
    match kind {
        LookupKind::Forward => "geocoded",
        LookupKind::Reverse => "reverse_geocoded",
        LookupKind::Elevation => "elevation",
    }
}

/// Maps one outcome to a row in `kind`'s column order.
#[must_use]
pub fn to_row(outcome: &Outcome, kind: LookupKind) -> Vec<String> {
    let mut row = match kind {
        LookupKind::Forward => forward_cells(outcome),
        LookupKind::Reverse => reverse_cells(outcome),
        LookupKind::Elevation => elevation_cells(outcome),
    };
    row.push(outcome.source().unwrap_or_default().to_string());
    row.push(outcome.status().to_string());
    row.push(outcome.error_message().unwrap_or_default());
    debug_assert_eq!(row.len(), columns(kind).len());
    row
}

fn text(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

fn number(value: f64) -> String {
    value.to_string()
}

fn forward_cells(outcome: &Outcome) -> Vec<String> {
    let mut cells = vec![String::new(); 13];
    cells[0].clone_from(&outcome.query.raw);

    match &outcome.kind {
        OutcomeKind::Matched {
            answer: Answer::Forward(m),
            ..
        } => {
            cells[1].clone_from(&m.matched_address);
            cells[2] = number(m.latitude);
            cells[3] = number(m.longitude);
            cells[4] = text(m.building_range.as_ref());
            cells[5] = text(m.street_name.as_ref());
            cells[6] = text(m.suffix_type.as_ref());
            cells[7] = text(m.city.as_ref());
            cells[8] = text(m.state.as_ref());
            cells[9] = text(m.postal_code.as_ref());
        }
        OutcomeKind::FallbackUsed { centroid, .. } => {
            cells[9].clone_from(&centroid.zip);
            cells[10] = number(centroid.latitude);
            cells[11] = number(centroid.longitude);
            cells[12].clone_from(&centroid.place);
        }
        OutcomeKind::Matched { .. } | OutcomeKind::NotFound { .. } | OutcomeKind::Error { .. } => {}
    }

    cells
}

fn reverse_cells(outcome: &Outcome) -> Vec<String> {
    let mut cells = vec![String::new(); 11];
    cells[0].clone_from(&outcome.query.raw);

    if let OutcomeKind::Matched {
        answer: Answer::Reverse(m),
        ..
    } = &outcome.kind
    {
        cells[1].clone_from(&m.full_address);
        cells[2] = text(m.street.as_ref());
        cells[3] = text(m.locality.as_ref());
        cells[4] = text(m.district.as_ref());
        cells[5] = text(m.city.as_ref());
        cells[6] = text(m.town.as_ref());
        cells[7] = text(m.state.as_ref());
        cells[8] = text(m.country.as_ref());
        cells[9] = text(m.postcode.as_ref());
        cells[10] = text(m.province.as_ref());
    }

    cells
}

fn elevation_cells(outcome: &Outcome) -> Vec<String> {
    let mut cells = vec![String::new(); 4];
    cells[0].clone_from(&outcome.query.raw);

    if let QueryKind::Coordinate(point) = &outcome.query.kind {
        cells[1] = number(point.latitude);
        cells[2] = number(point.longitude);
    }
    if let OutcomeKind::Matched {
        answer: Answer::Elevation { value },
        ..
    } = &outcome.kind
    {
        cells[3] = number(*value);
    }

    cells
}
