//! Run coordinator: owns job records and drives each job's lifecycle.
//!
//! `submit` records a `Pending` job and spawns its run. The run reads the
//! input (`Running`, total known), initializes the sink, and hands the
//! queries to the [`BatchScheduler`]. Progress callbacks update the job
//! record after every chunk. Input or output failures end the job as
//! `Failed`; per-query failures never do.
//!
//! There is no cancellation: a job either reaches a terminal state or is
//! abandoned with the process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use geobatch_geocoder::address::normalize;
use geobatch_geocoder::context::GeocodingContext;
use geobatch_geocoder_models::{LookupKind, Query};
use geobatch_jobs_models::{JobId, JobState, JobStatus};
use tokio::task::{JoinError, JoinHandle};

use crate::progress::ProgressCallback;
use crate::scheduler::BatchScheduler;
use crate::sink::CsvSink;
use crate::{JobError, input, schema};

/// Job records in submission order.
type JobTable = Arc<RwLock<Vec<JobStatus>>>;

/// Supervisor tasks of runs that have not finished yet.
type HandleTable = Arc<Mutex<BTreeMap<JobId, JoinHandle<()>>>>;

/// How often `wait` re-checks a job whose handle another caller took.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accepts bulk jobs and tracks their status.
pub struct Coordinator {
    context: Arc<GeocodingContext>,
    scheduler: BatchScheduler,
    output_dir: PathBuf,
    jobs: JobTable,
    handles: HandleTable,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("scheduler", &self.scheduler)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator writing outputs under `output_dir`.
    #[must_use]
    pub fn new(
        context: Arc<GeocodingContext>,
        scheduler: BatchScheduler,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            context,
            scheduler,
            output_dir: output_dir.into(),
            jobs: Arc::new(RwLock::new(Vec::new())),
            handles: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Records a new job and starts it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, kind: LookupKind, input_path: impl Into<PathBuf>) -> JobId {
        let id = JobId::new();
        let input_path = input_path.into();
        let output_path = self
            .output_dir
            .join(format!("{id}_{}.csv", schema::file_suffix(kind)));

        let status = JobStatus::pending(id, kind, input_path.clone(), output_path.clone());
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.push(status);
        }
        log::info!("job {id}: submitted {kind} job for {}", input_path.display());

        let run = JobRun {
            id,
            kind,
            input_path,
            output_path,
            context: Arc::clone(&self.context),
            scheduler: self.scheduler,
            jobs: Arc::clone(&self.jobs),
        };
        let jobs = Arc::clone(&self.jobs);
        let supervisor_handles = Arc::clone(&self.handles);

        // Held across the spawn so the supervisor cannot prune the entry
        // before it is inserted.
        let mut handles = self.handles.lock().ok();
        let handle = tokio::spawn(async move {
            if let Err(e) = tokio::spawn(run.execute()).await {
                log::error!("job {id}: run task aborted: {e}");
                mark_aborted(&jobs, id, &e);
            }
            if let Ok(mut handles) = supervisor_handles.lock() {
                handles.remove(&id);
            }
        });
        if let Some(handles) = handles.as_mut() {
            handles.insert(id, handle);
        }
        drop(handles);
        id
    }

    /// Snapshot of one job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for an unknown id.
    pub fn status(&self, id: JobId) -> Result<JobStatus, JobError> {
        self.jobs
            .read()
            .ok()
            .and_then(|jobs| jobs.iter().find(|j| j.id == id).cloned())
            .ok_or(JobError::NotFound(id))
    }

    /// Where a job writes its output.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for an unknown id.
    pub fn output_location(&self, id: JobId) -> Result<PathBuf, JobError> {
        self.status(id).map(|s| s.output_path)
    }

    /// Every job, oldest submission first.
    #[must_use]
    pub fn list(&self) -> Vec<JobStatus> {
        self.jobs.read().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Waits for a job's run to finish and returns its final status.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for an unknown id.
    pub async fn wait(&self, id: JobId) -> Result<JobStatus, JobError> {
        let handle = self.handles.lock().ok().and_then(|mut h| h.remove(&id));
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            log::error!("job {id}: supervisor task aborted: {e}");
            mark_aborted(&self.jobs, id, &e);
        }

        loop {
            let status = self.status(id)?;
            if status.state.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Runs whose supervisor task is still tracked.
    #[cfg(test)]
    fn tracked_runs(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or_default()
    }
}

/// Applies `f` to a job record, if present.
fn update(jobs: &JobTable, id: JobId, f: impl FnOnce(&mut JobStatus)) {
    if let Ok(mut jobs) = jobs.write()
        && let Some(job) = jobs.iter_mut().find(|j| j.id == id)
    {
        f(job);
    }
}

/// Fails a job whose task died before recording a terminal state.
fn mark_aborted(jobs: &JobTable, id: JobId, e: &JoinError) {
    update(jobs, id, |job| {
        if !job.state.is_terminal() {
            job.state = JobState::Failed;
            job.error = Some(format!("run task aborted: {e}"));
            job.finished_at = Some(Utc::now());
        }
    });
}

/// Everything a spawned run needs.
struct JobRun {
    id: JobId,
    kind: LookupKind,
    input_path: PathBuf,
    output_path: PathBuf,
    context: Arc<GeocodingContext>,
    scheduler: BatchScheduler,
    jobs: JobTable,
}

impl JobRun {
    async fn execute(self) {
        let id = self.id;
        match self.run().await {
            Ok(written) => {
                log::info!("job {id}: completed, {written} rows written");
                update(&self.jobs, id, |job| {
                    job.state = JobState::Completed;
                    job.finished_at = Some(Utc::now());
                });
            }
            Err(e) => {
                log::error!("job {id}: failed: {e}");
                update(&self.jobs, id, |job| {
                    job.state = JobState::Failed;
                    job.error = Some(e.to_string());
                    job.finished_at = Some(Utc::now());
                });
            }
        }
    }

    async fn run(&self) -> Result<u64, JobError> {
        let queries = load_queries(&self.input_path, self.kind)?;
        let total = queries.len() as u64;

        update(&self.jobs, self.id, |job| {
            job.state = JobState::Running;
            job.total = total;
            job.started_at = Some(Utc::now());
        });
        log::info!(
            "job {}: running {total} {} queries in batches of {} ({} concurrent)",
            self.id,
            self.kind,
            self.scheduler.batch_size(),
            self.scheduler.concurrency()
        );

        let mut sink = CsvSink::initialize(&self.output_path, self.kind)?;
        let resolver = self.context.resolver_for(self.kind);
        let progress = JobProgress {
            id: self.id,
            jobs: Arc::clone(&self.jobs),
        };

        Ok(self
            .scheduler
            .run(queries, &resolver, &mut sink, &progress)
            .await?)
    }
}

fn load_queries(path: &Path, kind: LookupKind) -> Result<Vec<Query>, JobError> {
    let lines = input::read_lines(path, kind).map_err(|source| JobError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(lines.iter().map(|line| normalize(line, kind)).collect())
}

/// Mirrors scheduler progress into the job record.
struct JobProgress {
    id: JobId,
    jobs: JobTable,
}

impl ProgressCallback for JobProgress {
    fn set_total(&self, total: u64) {
        update(&self.jobs, self.id, |job| job.total = total);
    }

    fn set_position(&self, pos: u64) {
        update(&self.jobs, self.id, |job| job.processed = pos);
    }

    fn set_message(&self, msg: String) {
        log::trace!("job {}: {msg}", self.id);
    }

    fn finish(&self, msg: String) {
        log::debug!("job {}: {msg}", self.id);
    }
}
