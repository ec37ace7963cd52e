//! Menu-driven front end used when no subcommand is given.

use std::path::PathBuf;

use dialoguer::{Input, Select};
use geobatch_cli_utils::MultiProgress;
use geobatch_geocoder_models::LookupKind;
use geobatch_jobs::config::Settings;

use crate::{commands, setup};

/// Top-level actions available in the interactive menu.
enum Action {
    Geocode,
    Reverse,
    Elevation,
    Bulk,
    Services,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Geocode,
        Self::Reverse,
        Self::Elevation,
        Self::Bulk,
        Self::Services,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Geocode => "Geocode an address",
            Self::Reverse => "Reverse geocode coordinates",
            Self::Elevation => "Look up elevation",
            Self::Bulk => "Run a bulk job from a CSV file",
            Self::Services => "List geocoding services",
        }
    }
}

const KINDS: &[LookupKind] = &[
    LookupKind::Forward,
    LookupKind::Reverse,
    LookupKind::Elevation,
];

/// Prompts for an action and its inputs, then runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected action fails.
pub async fn run(
    multi: &MultiProgress,
    mut settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("geobatch");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Geocode => {
            let address: String = Input::new()
                .with_prompt("Address (street, city, state, zip)")
                .interact_text()?;
            let context = setup::build_context(&settings)?;
            commands::lookup_one(multi, &context, LookupKind::Forward, &address).await?;
        }
        Action::Reverse => {
            let coordinates = prompt_coordinates()?;
            let context = setup::build_context(&settings)?;
            commands::lookup_one(multi, &context, LookupKind::Reverse, &coordinates).await?;
        }
        Action::Elevation => {
            let coordinates = prompt_coordinates()?;
            let context = setup::build_context(&settings)?;
            commands::lookup_one(multi, &context, LookupKind::Elevation, &coordinates).await?;
        }
        Action::Bulk => {
            let kind_labels: Vec<&str> = KINDS.iter().map(AsRef::<str>::as_ref).collect();
            let kind_idx = Select::new()
                .with_prompt("Lookup kind")
                .items(&kind_labels)
                .default(0)
                .interact()?;

            let input: String = Input::new()
                .with_prompt("Input CSV path")
                .interact_text()?;

            settings.batch_size = Input::<usize>::new()
                .with_prompt("Batch size")
                .default(settings.batch_size)
                .interact_text()?;

            settings.concurrency = Input::<usize>::new()
                .with_prompt("Concurrency")
                .default(settings.concurrency)
                .interact_text()?;

            let context = setup::build_context(&settings)?;
            let status = commands::run_bulk(
                multi,
                context,
                &settings,
                KINDS[kind_idx],
                PathBuf::from(input.trim()),
            )
            .await?;
            commands::ensure_completed(&status)?;
        }
        Action::Services => {
            let services = setup::load_service_set(&settings)?;
            commands::print_services(&services);
        }
    }

    Ok(())
}

fn prompt_coordinates() -> Result<String, dialoguer::Error> {
    Input::new()
        .with_prompt("Coordinates (latitude,longitude)")
        .interact_text()
}
