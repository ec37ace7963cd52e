//! Subcommand implementations shared by the flag-driven and interactive
//! front ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geobatch_cli_utils::{IndicatifProgress, MultiProgress};
use geobatch_geocoder::address::normalize;
use geobatch_geocoder::context::GeocodingContext;
use geobatch_geocoder::service_registry::GeocodingService;
use geobatch_geocoder_models::{LookupKind, Outcome};
use geobatch_jobs::config::Settings;
use geobatch_jobs::{BatchScheduler, Coordinator, JobError};
use geobatch_jobs_models::{JobState, JobStatus};

/// How often a bulk run's progress bar polls the job record.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Resolves one line and prints the outcome as JSON.
///
/// # Errors
///
/// Returns an error only if the outcome cannot be serialized. Lookup
/// failures are reported inside the printed outcome.
pub async fn lookup_one(
    multi: &MultiProgress,
    context: &GeocodingContext,
    kind: LookupKind,
    line: &str,
) -> Result<Outcome, serde_json::Error> {
    let spinner = IndicatifProgress::spinner(multi, &format!("{kind}: {line}"));

    let query = normalize(line, kind);
    let outcome = context.resolver_for(kind).resolve(query).await;

    spinner.finish(format!("{kind}: {}", outcome.status()));
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

/// Submits a bulk job, renders its progress, and waits for it to finish.
///
/// # Errors
///
/// Returns [`JobError::NotFound`] if the job record disappears, which
/// cannot happen for a job this function submitted.
pub async fn run_bulk(
    multi: &MultiProgress,
    context: GeocodingContext,
    settings: &Settings,
    kind: LookupKind,
    input: PathBuf,
) -> Result<JobStatus, JobError> {
    let coordinator = Coordinator::new(
        Arc::new(context),
        BatchScheduler::new(settings.batch_size, settings.concurrency),
        settings.output_dir.clone(),
    );

    let start = Instant::now();
    let bar = IndicatifProgress::job_bar(multi, &format!("{kind} {}", input.display()));
    let id = coordinator.submit(kind, input);

    let mut total_known = false;
    loop {
        let status = coordinator.status(id)?;
        if !total_known && status.total > 0 {
            bar.set_total(status.total);
            bar.set_message(format!("{kind} {}", status.state));
            total_known = true;
        }
        bar.set_position(status.processed);
        if status.state.is_terminal() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let status = coordinator.wait(id).await?;
    let elapsed = start.elapsed();

    match &status.error {
        None => {
            bar.finish(format!(
                "{}/{} {kind} queries in {elapsed:.1?}",
                status.processed, status.total
            ));
            println!("{}", status.output_path.display());
        }
        Some(error) => {
            bar.finish(format!("job {id} failed"));
            log::error!("job {id}: {error}");
        }
    }

    Ok(status)
}

/// Turns a failed job into an error so the caller exits non-zero.
///
/// # Errors
///
/// Returns a message naming the job and its error when it did not complete.
pub fn ensure_completed(status: &JobStatus) -> Result<(), String> {
    match status.state {
        JobState::Completed => Ok(()),
        state => Err(format!(
            "job {} {state}: {}",
            status.id,
            status.error.as_deref().unwrap_or("no error recorded")
        )),
    }
}

/// Prints the service table.
pub fn print_services(services: &[GeocodingService]) {
    println!(
        "{:<20} {:<8} {:<9} {:<8} URL",
        "ID", "ROLE", "PRIORITY", "ENABLED"
    );
    println!("{}", "-".repeat(80));
    for service in services {
        println!(
            "{:<20} {:<8} {:<9} {:<8} {}",
            service.id,
            service.role.as_ref(),
            service.priority,
            service.enabled,
            service.base_url()
        );
    }
}
