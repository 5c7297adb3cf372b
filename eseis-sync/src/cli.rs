/// # eseis-sync CLI Interface (Module)
///
/// Command parsing and the async entrypoint of the `eseis-sync` binary.
///
/// All synchronisation logic lives in the [`eseis-sync-core`] crate. This
/// module only resolves configuration, builds the REST client and the
/// optional browser session, runs the [`Synchroniser`] and reports outcome.
///
/// ## How To Use
/// - From the shell: `eseis-sync sync [--config settings.yaml] [--no-snapshots] [--headed]`.
/// - Programmatically or from tests: call [`run`] with a constructed [`Cli`].
///
/// [`eseis-sync-core`]: ../../eseis_sync_core/
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eseis_sync_core::api::EseisClient;
use eseis_sync_core::browser::ChromeBrowser;
use eseis_sync_core::snapshot::{LoginFlow, SnapshotSession};
use eseis_sync_core::synchronise::{SynchroniseSettings, Synchroniser};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// CLI for eseis-sync: mirror an Eseis co-ownership account to a local directory.
#[derive(Parser)]
#[clap(
    name = "eseis-sync",
    version,
    about = "Incrementally mirror Eseis contracts, documents, reports, forum threads and budgets to disk"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download everything new or updated since the last run
    Sync {
        /// Optional YAML file with non-secret settings
        #[clap(long)]
        config: Option<PathBuf>,
        /// Skip browser snapshots of reports and forum topics
        #[clap(long)]
        no_snapshots: bool,
        /// Show the browser window while capturing snapshots
        #[clap(long)]
        headed: bool,
    },
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    info!("cli_started");

    match cli.command {
        Commands::Sync {
            config,
            no_snapshots,
            headed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if no_snapshots {
                config.sync.snapshots = false;
            }
            if headed {
                config.chrome.headless = false;
            }
            config.sync.trace_loaded();
            info!(command = "sync", "Starting synchronisation process");
            sync(config).await
        }
    }
}

async fn sync(config: CliConfig) -> Result<()> {
    let api = EseisClient::new(&config.sync.api, config.sync.credentials.clone());
    let settings = SynchroniseSettings::from(&config.sync);

    let mut synchroniser = if config.sync.snapshots {
        let browser = ChromeBrowser::launch(config.chrome.clone())
            .await
            .context("Failed to launch Chrome for page snapshots")?;
        let mut session = SnapshotSession::new(browser);
        let flow = LoginFlow::new(&config.sync.api, config.sync.credentials.clone());
        if let Err(e) = session.login(&flow).await {
            error!(error = %e, "Browser login failed");
            if let Err(close_error) = session.close().await {
                warn!(error = %close_error, "Browser shutdown failed");
            }
            return Err(e).context("Failed to log into the Eseis web client");
        }
        Synchroniser::new(api, settings).with_snapshots(session)
    } else {
        warn!("Snapshots disabled: reports and forum topics will not be captured");
        Synchroniser::new(api, settings)
    };

    let outcome = synchroniser.run().await;
    if let Err(e) = synchroniser.close().await {
        warn!(error = %e, "Browser shutdown failed");
    }

    match outcome {
        Ok(report) => {
            for failure in &report.failures {
                warn!(scope = %failure.scope, error = %failure.error, "Item skipped during synchronisation");
            }
            info!(
                command = "sync",
                contracts = report.contracts,
                created = report.created,
                skipped = report.skipped,
                snapshots = report.snapshots,
                failures = report.failures.len(),
                "Synchronisation complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(command = "sync", error = %e, "Synchronisation failed");
            Err(e).context("Synchronisation failed")
        }
    }
}
