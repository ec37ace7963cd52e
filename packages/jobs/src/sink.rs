//! Incremental output sinks.
//!
//! A [`CsvSink`] writes the header when it is created and then appends one
//! encoded chunk at a time. Each chunk is encoded fully in memory, written
//! with a single `write_all`, and synced before the call returns, so a crash
//! loses at most the chunk in flight and never leaves earlier rows torn.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use geobatch_geocoder_models::{LookupKind, Outcome};
use thiserror::Error;

use crate::schema;

/// Errors from writing output.
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O error while creating or appending to the output.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Output path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for completed chunks of outcomes.
pub trait Sink: Send {
    /// Appends one chunk. Never rewrites earlier rows.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the chunk cannot be persisted.
    fn append_chunk(&mut self, outcomes: &[Outcome]) -> Result<(), SinkError>;
}

/// Appends outcome rows to a CSV file.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    file: File,
    kind: LookupKind,
    rows: u64,
}

impl CsvSink {
    /// Creates (or truncates) `path` and writes the header row for `kind`.
    ///
    /// The file exists with exactly the header row once this returns.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the file or its parent directory cannot be
    /// created or written.
    pub fn initialize(path: &Path, kind: LookupKind) -> Result<Self, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let header = encode(std::iter::once(
            schema::columns(kind).iter().map(ToString::to_string).collect(),
        ))?;

        let mut file = File::create(path).map_err(io_err)?;
        file.write_all(&header).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        drop(file);

        let file = OpenOptions::new().append(true).open(path).map_err(io_err)?;

        log::debug!("Initialized output {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            kind,
            rows: 0,
        })
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far.
    #[must_use]
    pub const fn rows_written(&self) -> u64 {
        self.rows
    }
}

impl Sink for CsvSink {
    fn append_chunk(&mut self, outcomes: &[Outcome]) -> Result<(), SinkError> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let kind = self.kind;
        let bytes = encode(outcomes.iter().map(|o| schema::to_row(o, kind)))?;

        let io_err = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        self.file.write_all(&bytes).map_err(io_err)?;
        self.file.sync_data().map_err(io_err)?;

        self.rows += outcomes.len() as u64;
        Ok(())
    }
}

/// Collects outcomes in memory, in append order.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Every appended outcome.
    pub outcomes: Vec<Outcome>,
    /// Size of each appended chunk.
    pub chunk_sizes: Vec<usize>,
}

impl Sink for MemorySink {
    fn append_chunk(&mut self, outcomes: &[Outcome]) -> Result<(), SinkError> {
        self.outcomes.extend_from_slice(outcomes);
        self.chunk_sizes.push(outcomes.len());
        Ok(())
    }
}

/// Encodes rows as CSV into a byte buffer.
fn encode(rows: impl IntoIterator<Item = Vec<String>>) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| SinkError::Csv(csv::Error::from(e.into_error())))
}
