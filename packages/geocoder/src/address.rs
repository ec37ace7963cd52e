//! Query normalization for raw input lines.
//!
//! Input files carry one query per line in one of two shapes:
//! - Free-text addresses: `"123 Main St, Springfield, IL 62704"`
//! - Coordinate pairs: `"39.78,-89.65"`
//!
//! Normalization never fails. Input that cannot be interpreted becomes a
//! [`QueryKind::Malformed`] query so it still produces an output row.

use std::sync::LazyLock;

use geobatch_geocoder_models::{AddressQuery, CoordinateQuery, LookupKind, Query, QueryKind};
use regex::Regex;

use crate::states;

/// Trailing country names that carry no information for US geocoding.
static COUNTRY_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i),\s*(?:united states(?: of america)?|usa|u\.s\.a\.)\s*$")
        .expect("valid regex")
});

/// `<street>, <city>, <ST> <zip?>` with the street allowed to contain commas.
static STRICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?),\s*([^,]+?),\s*([A-Za-z]{2})\s*(\d{5}(?:-\d{4})?)?$").expect("valid regex")
});

/// Two-letter state code at the start of a fragment, optionally followed by
/// a ZIP. The code must not be the prefix of a longer word.
static STATE_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{2})\s*(\d{5}(?:-\d{4})?)?(?:[^A-Za-z]|$)").expect("valid regex")
});

/// Full state name optionally followed by a ZIP (e.g. `"New York 10001"`).
static STATE_NAME_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z .]*?)\s*(\d{5}(?:-\d{4})?)?$").expect("valid regex")
});

/// Normalizes one raw line according to the lookup it is destined for.
#[must_use]
pub fn normalize(line: &str, kind: LookupKind) -> Query {
    match kind {
        LookupKind::Forward => normalize_address(line),
        LookupKind::Reverse | LookupKind::Elevation => normalize_coordinates(line),
    }
}

/// Parses a free-text address into a structured query.
///
/// Tries the strict `<street>, <city>, <ST> <zip>` shape first, then a
/// comma split that scans the trailing part for a state and ZIP. When both
/// fail the whole line becomes the street with the other fields empty.
#[must_use]
pub fn normalize_address(line: &str) -> Query {
    let raw = line.trim();
    if raw.is_empty() {
        return Query::malformed(raw, "empty address");
    }

    let address = COUNTRY_SUFFIX_RE.replace(raw, "");
    let address = address.trim();

    let parsed = parse_strict(address)
        .or_else(|| parse_comma_split(address))
        .unwrap_or_else(|| AddressQuery {
            street: address.to_string(),
            ..AddressQuery::default()
        });

    Query {
        raw: raw.to_string(),
        kind: QueryKind::Address(parsed),
    }
}

fn parse_strict(address: &str) -> Option<AddressQuery> {
    let caps = STRICT_RE.captures(address)?;
    Some(AddressQuery {
        street: caps[1].trim().to_string(),
        city: caps[2].trim().to_string(),
        state: caps[3].trim().to_uppercase(),
        zip: caps.get(4).map(|m| m.as_str().to_string()),
    })
}

fn parse_comma_split(address: &str) -> Option<AddressQuery> {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }
    let last = parts[parts.len() - 1];

    let (state, zip) = if let Some(caps) = STATE_ZIP_RE.captures(last) {
        (caps[1].to_uppercase(), caps.get(2).map(|m| m.as_str().to_string()))
    } else {
        let caps = STATE_NAME_ZIP_RE.captures(last)?;
        let code = states::state_code(&caps[1])?;
        (code.to_string(), caps.get(2).map(|m| m.as_str().to_string()))
    };

    Some(AddressQuery {
        street: parts[0].to_string(),
        city: parts[1].to_string(),
        state,
        zip,
    })
}

/// Parses a `"lat,lon"` pair.
///
/// Splits on the first comma and parses both halves as floats. Range is not
/// checked here; out-of-range pairs are rejected by the resolver without a
/// network call.
#[must_use]
pub fn normalize_coordinates(line: &str) -> Query {
    let raw = line.trim();
    let Some((lat, lon)) = raw.split_once(',') else {
        return Query::malformed(raw, "expected \"latitude,longitude\"");
    };

    let latitude = match parse_degrees(lat) {
        Ok(v) => v,
        Err(reason) => return Query::malformed(raw, format!("latitude {reason}")),
    };
    let longitude = match parse_degrees(lon) {
        Ok(v) => v,
        Err(reason) => return Query::malformed(raw, format!("longitude {reason}")),
    };

    Query {
        raw: raw.to_string(),
        kind: QueryKind::Coordinate(CoordinateQuery {
            latitude,
            longitude,
        }),
    }
}

fn parse_degrees(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let value: f64 = s
        .parse()
        .map_err(|_| format!("{s:?} is not a number"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{s:?} is not finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(line: &str) -> AddressQuery {
        match normalize_address(line).kind {
            QueryKind::Address(a) => a,
            other => panic!("expected address, got {other:?}"),
        }
    }

    #[test]
    fn parses_strict_address() {
        assert_eq!(
            address("123 Main St, Springfield, IL 62704"),
            AddressQuery {
                street: "123 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: Some("62704".to_string()),
            }
        );
    }

    #[test]
    fn uppercases_state_code() {
        let a = address("1 Elm Ave, Austin, tx 78701-1234");
        assert_eq!(a.state, "TX");
        assert_eq!(a.zip.as_deref(), Some("78701-1234"));
    }

    #[test]
    fn zip_is_optional() {
        let a = address("1 Elm Ave, Austin, TX");
        assert_eq!(a.city, "Austin");
        assert_eq!(a.zip, None);
    }

    #[test]
    fn strips_country_suffix() {
        let a = address("123 Main St, Springfield, IL 62704, United States");
        assert_eq!(a.zip.as_deref(), Some("62704"));
        let a = address("123 Main St, Springfield, IL 62704, USA");
        assert_eq!(a.state, "IL");
    }

    #[test]
    fn country_suffix_match_ignores_case() {
        for line in [
            "9 Pine Rd, Boise, ID 83702, UNITED STATES OF AMERICA",
            "9 Pine Rd, Boise, ID 83702, usa",
            "9 Pine Rd, Boise, ID 83702, U.S.A.",
        ] {
            let a = address(line);
            assert_eq!(a.state, "ID", "{line}");
            assert_eq!(a.zip.as_deref(), Some("83702"), "{line}");
        }
    }

    #[test]
    fn street_may_contain_commas() {
        let a = address("Suite 4, 100 Oak St, Dallas, TX 75201");
        assert_eq!(a.street, "Suite 4, 100 Oak St");
        assert_eq!(a.city, "Dallas");
    }

    #[test]
    fn falls_back_to_comma_split_with_full_state_name() {
        let a = address("123 Main St, Springfield, Illinois 62704");
        assert_eq!(a.street, "123 Main St");
        assert_eq!(a.state, "IL");
        assert_eq!(a.zip.as_deref(), Some("62704"));
    }

    #[test]
    fn comma_split_does_not_take_prefix_of_state_name() {
        let a = address("1 Elm Ave, Austin, Texas");
        assert_eq!(a.state, "TX");
    }

    #[test]
    fn comma_split_scans_trailing_part() {
        let a = address("1 Elm Ave, Austin, TX 78701 extra");
        assert_eq!(a.city, "Austin");
        assert_eq!(a.state, "TX");
        assert_eq!(a.zip.as_deref(), Some("78701"));
    }

    #[test]
    fn unparseable_address_becomes_street() {
        let a = address("somewhere over the rainbow");
        assert_eq!(a.street, "somewhere over the rainbow");
        assert!(a.city.is_empty());
        assert!(a.state.is_empty());
        assert_eq!(a.zip, None);
    }

    #[test]
    fn empty_address_is_malformed() {
        assert!(matches!(
            normalize_address("   ").kind,
            QueryKind::Malformed { .. }
        ));
    }

    #[test]
    fn raw_text_is_preserved() {
        let q = normalize_address("  1 Elm Ave, Austin, TX  ");
        assert_eq!(q.raw, "1 Elm Ave, Austin, TX");
    }

    #[test]
    fn parses_coordinates() {
        assert_eq!(
            normalize_coordinates(" 39.78 , -89.65 ").kind,
            QueryKind::Coordinate(CoordinateQuery {
                latitude: 39.78,
                longitude: -89.65,
            })
        );
    }

    #[test]
    fn keeps_out_of_range_coordinates_for_the_resolver() {
        assert!(matches!(
            normalize_coordinates("95,-200").kind,
            QueryKind::Coordinate(_)
        ));
    }

    #[test]
    fn non_numeric_coordinates_are_malformed() {
        let q = normalize_coordinates("abc,def");
        assert_eq!(q.raw, "abc,def");
        let QueryKind::Malformed { reason } = q.kind else {
            panic!("expected malformed");
        };
        assert!(reason.starts_with("latitude"));
    }

    #[test]
    fn missing_comma_is_malformed() {
        assert!(matches!(
            normalize_coordinates("39.78").kind,
            QueryKind::Malformed { .. }
        ));
    }

    #[test]
    fn extra_fields_are_malformed() {
        assert!(matches!(
            normalize_coordinates("1,2,3").kind,
            QueryKind::Malformed { .. }
        ));
    }

    #[test]
    fn nan_is_malformed() {
        assert!(matches!(
            normalize_coordinates("NaN,1").kind,
            QueryKind::Malformed { .. }
        ));
    }

    #[test]
    fn normalize_dispatches_on_kind() {
        assert!(matches!(
            normalize("1,2", LookupKind::Elevation).kind,
            QueryKind::Coordinate(_)
        ));
        assert!(matches!(
            normalize("1 Elm Ave, Austin, TX", LookupKind::Forward).kind,
            QueryKind::Address(_)
        ));
    }
}
