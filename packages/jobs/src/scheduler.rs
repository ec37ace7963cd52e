//! Batch scheduler: sequential chunks, bounded concurrency within a chunk.
//!
//! Queries are split into consecutive chunks of at most `batch_size`. Each
//! chunk is resolved through a pool of at most `concurrency` in-flight
//! tasks, and the next chunk starts only after the whole chunk has
//! returned. After each chunk the outcomes go to the sink and then the
//! progress callback sees the cumulative count, so a poller never observes
//! progress ahead of what is on disk.
//!
//! Outcome order inside a chunk follows completion order. Chunk order
//! follows input order.

use std::sync::Arc;

use futures::{StreamExt, stream};
use geobatch_geocoder::resolver::Resolver;
use geobatch_geocoder_models::{FailureCause, Outcome, Query};

use crate::progress::ProgressCallback;
use crate::sink::{MemorySink, Sink, SinkError};

/// Default chunk size.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of concurrent resolutions inside a chunk.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Chunking and concurrency limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    batch_size: usize,
    concurrency: usize,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY)
    }
}

impl BatchScheduler {
    /// Creates a scheduler. Zero values are raised to one.
    #[must_use]
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Chunk size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Concurrency limit.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolves every query, appending each finished chunk to `sink`.
    ///
    /// Returns the number of outcomes written, which always equals the
    /// number of queries.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if a chunk cannot be persisted. Chunks written
    /// before the failure stay in the sink.
    pub async fn run(
        &self,
        queries: Vec<Query>,
        resolver: &Arc<dyn Resolver>,
        sink: &mut dyn Sink,
        progress: &dyn ProgressCallback,
    ) -> Result<u64, SinkError> {
        let total = queries.len() as u64;
        let chunk_count = queries.len().div_ceil(self.batch_size);
        progress.set_total(total);

        let mut processed = 0u64;
        let mut queries = queries.into_iter().peekable();
        let mut index = 0;

        while queries.peek().is_some() {
            index += 1;
            let chunk: Vec<Query> = queries.by_ref().take(self.batch_size).collect();
            log::info!("batch {index}/{chunk_count}: {} queries", chunk.len());
            progress.set_message(format!("batch {index}/{chunk_count}"));

            let outcomes = self.resolve_chunk(chunk, resolver).await;

            sink.append_chunk(&outcomes)?;
            processed += outcomes.len() as u64;
            progress.set_position(processed);
            log::debug!("batch {index}/{chunk_count} saved ({processed}/{total})");
        }

        progress.finish(format!("{processed}/{total} processed"));
        Ok(processed)
    }

    /// Resolves every query and returns the outcomes in chunk order.
    pub async fn collect(
        &self,
        queries: Vec<Query>,
        resolver: &Arc<dyn Resolver>,
        progress: &dyn ProgressCallback,
    ) -> Vec<Outcome> {
        let mut sink = MemorySink::default();
        if let Err(e) = self.run(queries, resolver, &mut sink, progress).await {
            log::error!("in-memory run stopped early: {e}");
        }
        sink.outcomes
    }

    /// Resolves one chunk with at most `concurrency` tasks in flight.
    ///
    /// A task that panics becomes an `Unexpected` error outcome for its own
    /// query; sibling tasks are unaffected.
    async fn resolve_chunk(&self, chunk: Vec<Query>, resolver: &Arc<dyn Resolver>) -> Vec<Outcome> {
        stream::iter(chunk.into_iter().map(|query| {
            let resolver = Arc::clone(resolver);
            let fallback = query.clone();
            async move {
                match tokio::spawn(async move { resolver.resolve(query).await }).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::error!("resolution of '{}' aborted: {e}", fallback.raw);
                        Outcome::error(
                            fallback,
                            FailureCause::Unexpected,
                            format!("worker failed: {e}"),
                        )
                    }
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await
    }
}
