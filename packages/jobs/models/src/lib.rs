#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Job identity and status types for geobatch bulk runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use geobatch_geocoder_models::LookupKind;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Unique identifier of one job submission. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(uuid::Uuid);

impl JobId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Lifecycle state of a job.
///
/// `Pending → Running → {Completed, Failed}`. Terminal states never change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    /// Record created, input not yet read.
    Pending,
    /// Input loaded and batches in flight.
    Running,
    /// Every chunk was processed.
    Completed,
    /// A job-level error ended the run.
    Failed,
}

impl JobState {
    /// Whether the job has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Point-in-time snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job identifier.
    pub id: JobId,
    /// Lookup performed for every input line.
    pub kind: LookupKind,
    /// Lifecycle state.
    pub state: JobState,
    /// Queries whose outcomes have been written.
    pub processed: u64,
    /// Total queries in the input. Zero until the input has been read.
    pub total: u64,
    /// Job-level error message, set only when `state` is `Failed`.
    pub error: Option<String>,
    /// Input file.
    pub input_path: PathBuf,
    /// Output file.
    pub output_path: PathBuf,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the job entered `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// A freshly submitted job.
    #[must_use]
    pub fn pending(id: JobId, kind: LookupKind, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            kind,
            state: JobState::Pending,
            processed: 0,
            total: 0,
            error: None,
            input_path,
            output_path,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Fraction of work done, in `[0, 1]`. `None` until the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return match self.state {
                JobState::Completed => Some(1.0),
                _ => None,
            };
        }
        Some(self.processed as f64 / self.total as f64)
    }
}
