//! ZIP code centroid lookup table.
//!
//! Loaded once at startup from a CSV file with `postcode,lat,long,place`
//! columns and read-only afterwards, so concurrent workers share it behind
//! an `Arc` without locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geobatch_geocoder_models::Centroid;
use serde::Deserialize;
use thiserror::Error;

/// Errors from loading the lookup table.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The lookup file does not exist.
    #[error("ZIP lookup file {} not found", path.display())]
    NotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// I/O error while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the lookup CSV.
#[derive(Debug, Deserialize)]
struct ZipRow {
    postcode: String,
    lat: f64,
    long: f64,
    #[serde(default)]
    place: String,
}

/// Coordinates and place name for one ZIP code.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipCentroid {
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub long: f64,
    /// Place name.
    pub place: String,
}

/// Immutable ZIP → centroid mapping.
#[derive(Debug, Default, Clone)]
pub struct ZipLookup {
    entries: BTreeMap<String, ZipCentroid>,
}

impl ZipLookup {
    /// An empty table; every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if the file is absent, or an I/O or
    /// CSV error if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        if !path.exists() {
            return Err(LookupError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parses the table from any CSV reader.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Csv`] if a row cannot be parsed.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, LookupError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = BTreeMap::new();
        for row in reader.deserialize() {
            let row: ZipRow = row?;
            entries.insert(
                normalize_zip(&row.postcode),
                ZipCentroid {
                    lat: row.lat,
                    long: row.long,
                    place: row.place,
                },
            );
        }

        Ok(Self { entries })
    }

    /// Builds a table from in-memory entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ZipCentroid)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(zip, centroid)| (normalize_zip(&zip), centroid))
                .collect(),
        }
    }

    /// Looks up a ZIP code. ZIP+4 codes match on their five-digit prefix.
    #[must_use]
    pub fn get(&self, zip: &str) -> Option<&ZipCentroid> {
        self.entries.get(&normalize_zip(zip))
    }

    /// Looks up a ZIP code and returns it as an outcome centroid.
    #[must_use]
    pub fn centroid(&self, zip: &str) -> Option<Centroid> {
        self.get(zip).map(|c| Centroid {
            zip: normalize_zip(zip),
            latitude: c.lat,
            longitude: c.long,
            place: c.place.clone(),
        })
    }

    /// Number of ZIP codes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical five-digit key: drops a `-NNNN` extension and restores leading
/// zeros lost by spreadsheet tools (`"2134"` → `"02134"`).
fn normalize_zip(zip: &str) -> String {
    let zip = zip.trim();
    let zip = zip.split('-').next().unwrap_or(zip);
    if !zip.is_empty() && zip.len() < 5 && zip.bytes().all(|b| b.is_ascii_digit()) {
        format!("{zip:0>5}")
    } else {
        zip.to_string()
    }
}
