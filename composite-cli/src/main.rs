//! Composite harness
//!
//! Runs one control instance against a fixture file and prints the resolved value.

mod fixture;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use composite_core::store_memory::RecordingSaveTrigger;
use composite_core::{Collaborators, CompositeControl, UpdateOutcome, DEFAULT_AUTO_SAVE_DELAY};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::fixture::Fixture;

/// Default log filter when `COMPOSITE_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "composite=info,composite_core=info";

/// Extra wait after the auto-save delay before reporting
const SAVE_SETTLE_MS: u64 = 50;

#[derive(Debug, Parser)]
#[command(name = "composite", about = "Resolve a composite value from a fixture")]
struct Cli {
    /// Fixture file (.json, .yaml or .yml)
    #[arg(long, env = "COMPOSITE_FIXTURE")]
    fixture: PathBuf,

    /// Run a refresh after the initial computation
    #[arg(long)]
    refresh: bool,

    /// Delay before the auto-save fires
    #[arg(long, env = "COMPOSITE_AUTO_SAVE_DELAY_MS", default_value_t = DEFAULT_AUTO_SAVE_DELAY.as_millis() as u64)]
    auto_save_delay_ms: u64,

    /// Print the full output snapshot as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("COMPOSITE_LOG")
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!(path = %cli.fixture.display(), "Loading fixture");
    let fixture = Fixture::from_file(&cli.fixture)?;

    let saver = Arc::new(RecordingSaveTrigger::new());
    let collaborators = Collaborators {
        records: Arc::new(fixture.record_store()),
        environment: Arc::new(fixture.environment_store()),
        metadata: Arc::new(fixture.metadata()),
        saver: saver.clone(),
    };
    let settings = fixture.settings(cli.auto_save_delay_ms);
    let delay = settings.auto_save_delay();
    let control = CompositeControl::new(collaborators, settings, fixture.inputs());

    let mut outcome = control.update_view(fixture.inputs()).await;
    if cli.refresh {
        outcome = control.refresh().await;
    }
    tracing::debug!(?outcome, "Computation finished");

    if control.auto_save_fired() {
        tokio::time::sleep(delay + Duration::from_millis(SAVE_SETTLE_MS)).await;
    }
    control.destroy();

    let snapshot = control.outputs();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else if let Some(error) = &snapshot.error {
        bail!("{error}");
    } else {
        println!("{}", snapshot.value);
        eprintln!("auto-save: {} save(s)", saver.save_count());
    }

    if outcome == UpdateOutcome::Failed {
        std::process::exit(1);
    }
    Ok(())
}
