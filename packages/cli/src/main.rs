#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `geobatch` command-line tool.
//!
//! Runs single forward, reverse, and elevation lookups, bulk jobs over CSV
//! files, and lists the configured providers. With no subcommand it falls
//! back to an interactive menu.
//!
//! Uses `indicatif-log-bridge` (via [`geobatch_cli_utils::init_logger`]) so
//! log lines and progress bars share the terminal cleanly.

mod commands;
mod interactive;
mod setup;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geobatch_geocoder_models::LookupKind;
use geobatch_jobs::config::Settings;

#[derive(Parser)]
#[command(name = "geobatch", about = "Batch geocoding, reverse geocoding, and elevation lookups")]
struct Cli {
    /// Settings file (defaults to `geobatch.toml` in the working directory
    /// when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode one address, e.g. "123 Main St, Springfield, IL, 62701"
    Geocode {
        /// Address line
        address: String,
    },
    /// Reverse geocode one "latitude,longitude" pair
    Reverse {
        /// Coordinates, e.g. "40.7128,-74.0060"
        coordinates: String,
    },
    /// Look up the elevation of one "latitude,longitude" pair
    Elevation {
        /// Coordinates, e.g. "39.7392,-104.9903"
        coordinates: String,
    },
    /// Run a bulk job over a CSV file with one query per row
    Bulk {
        /// Lookup kind: `forward`, `reverse`, or `elevation`
        kind: LookupKind,
        /// Input CSV (no header row)
        input: PathBuf,
        /// Queries per chunk (overrides settings)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Concurrent lookups within a chunk (overrides settings)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Output directory (overrides settings)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// List the configured geocoding services
    Services,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geobatch_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;

    let Some(command) = cli.command else {
        return interactive::run(&multi, settings).await;
    };

    match command {
        Commands::Geocode { address } => {
            let context = setup::build_context(&settings)?;
            commands::lookup_one(&multi, &context, LookupKind::Forward, &address).await?;
        }
        Commands::Reverse { coordinates } => {
            let context = setup::build_context(&settings)?;
            commands::lookup_one(&multi, &context, LookupKind::Reverse, &coordinates).await?;
        }
        Commands::Elevation { coordinates } => {
            let context = setup::build_context(&settings)?;
            commands::lookup_one(&multi, &context, LookupKind::Elevation, &coordinates).await?;
        }
        Commands::Bulk {
            kind,
            input,
            batch_size,
            concurrency,
            output_dir,
        } => {
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                settings.concurrency = concurrency;
            }
            if let Some(output_dir) = output_dir {
                settings.output_dir = output_dir;
            }
            let context = setup::build_context(&settings)?;
            let status = commands::run_bulk(&multi, context, &settings, kind, input).await?;
            commands::ensure_completed(&status)?;
        }
        Commands::Services => {
            let services = setup::load_service_set(&settings)?;
            commands::print_services(&services);
        }
    }

    Ok(())
}
