#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bulk job orchestration for geobatch.
//!
//! A job reads raw lines from a CSV file ([`input`]), normalizes each into
//! a query, and resolves them in sequential chunks with bounded concurrency
//! ([`scheduler`]). Each finished chunk is appended to a CSV output with a
//! fixed column schema ([`schema`], [`sink`]), so partial results survive a
//! crash at chunk granularity. The [`coordinator`] tracks every job from
//! `Pending` to `Completed` or `Failed`.

pub mod config;
pub mod coordinator;
pub mod input;
pub mod progress;
pub mod scheduler;
pub mod schema;
pub mod sink;

use std::path::PathBuf;

use geobatch_jobs_models::JobId;
use thiserror::Error;

pub use coordinator::Coordinator;
pub use scheduler::BatchScheduler;

/// Job-level failures. Per-query failures are outcomes, never this.
#[derive(Debug, Error)]
pub enum JobError {
    /// The input file could not be read.
    #[error("cannot read input {}: {source}", path.display())]
    Input {
        /// Input path.
        path: PathBuf,
        /// Underlying error.
        source: input::InputError,
    },

    /// The output could not be initialized or appended to.
    #[error("output error: {0}")]
    Sink(#[from] sink::SinkError),

    /// No job with this id was submitted.
    #[error("job {0} not found")]
    NotFound(JobId),
}
