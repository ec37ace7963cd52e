//! Progress reporting for bulk runs.
//!
//! The scheduler reports through [`ProgressCallback`] so it never knows
//! whether a terminal bar, a job record, or nothing at all is listening.

/// Receives cumulative progress from the batch scheduler.
///
/// Shared across tasks, so implementations must be `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of queries in the run. Called once, before the first chunk.
    fn set_total(&self, total: u64);

    /// Queries persisted so far. Never decreases.
    fn set_position(&self, pos: u64);

    /// Replaces the status text shown next to the count.
    fn set_message(&self, msg: String);

    /// Called once after the last chunk.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
