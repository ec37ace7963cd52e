//! Reads raw query lines from a delimited input file.
//!
//! One query per record, no header. Address jobs take the first column.
//! Coordinate jobs take the first column when it already holds `lat,lon`
//! (a quoted cell), otherwise the first two columns joined with a comma.
//! Blank records are skipped.

use std::path::Path;

use geobatch_geocoder_models::LookupKind;
use thiserror::Error;

/// Errors from reading an input file.
#[derive(Debug, Error)]
pub enum InputError {
    /// I/O error while opening or reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Reads every query line from `path`.
///
/// # Errors
///
/// Returns [`InputError`] if the file cannot be opened or is not valid CSV.
pub fn read_lines(path: &Path, kind: LookupKind) -> Result<Vec<String>, InputError> {
    let file = std::fs::File::open(path)?;
    from_reader(file, kind)
}

/// Reads every query line from any reader.
///
/// # Errors
///
/// Returns [`InputError::Csv`] if a record cannot be parsed.
pub fn from_reader<R: std::io::Read>(
    reader: R,
    kind: LookupKind,
) -> Result<Vec<String>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        let first = record.get(0).unwrap_or_default();

        let line = match kind {
            LookupKind::Forward => first.to_string(),
            LookupKind::Reverse | LookupKind::Elevation => {
                match record.get(1).filter(|_| !first.contains(',')) {
                    Some(second) if !second.is_empty() => format!("{first},{second}"),
                    _ => first.to_string(),
                }
            }
        };

        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_jobs_use_first_column() {
        let csv = "\"123 Main St, Springfield, IL 62704\",ignored\n\
                   \"1 Elm St, Boston, MA 02108\"\n";
        let lines = from_reader(csv.as_bytes(), LookupKind::Forward).unwrap();
        assert_eq!(
            lines,
            vec![
                "123 Main St, Springfield, IL 62704".to_string(),
                "1 Elm St, Boston, MA 02108".to_string()
            ]
        );
    }

    #[test]
    fn coordinate_jobs_join_two_columns() {
        let csv = "40.1,-75.2\n\"38.9,-77.0\"\n";
        let lines = from_reader(csv.as_bytes(), LookupKind::Reverse).unwrap();
        assert_eq!(lines, vec!["40.1,-75.2".to_string(), "38.9,-77.0".to_string()]);
    }

    #[test]
    fn skips_blank_records() {
        let csv = "40.1,-75.2\n\n,\n39.0,-76.0\n";
        let lines = from_reader(csv.as_bytes(), LookupKind::Elevation).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn malformed_values_are_kept_as_lines() {
        let csv = "abc,def\n";
        let lines = from_reader(csv.as_bytes(), LookupKind::Reverse).unwrap();
        assert_eq!(lines, vec!["abc,def".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("geobatch_missing_input.csv");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            read_lines(&path, LookupKind::Forward),
            Err(InputError::Io(_))
        ));
    }
}
