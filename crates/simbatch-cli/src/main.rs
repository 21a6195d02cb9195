mod cli;
mod commands;
mod config;
mod error;
mod invoker;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::{UiEvent, UiManager};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = task::spawn(ui_manager.run());

    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("🚀 simbatch v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);
    let command_result = dispatch(cli.command, ui_sender).await;

    if let Err(e) = &command_result {
        error!("❌ Command failed: {}", e);
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager may have already exited before shutdown signal.");
    }

    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {}", e)))?;

    command_result
}

/// Runs the selected subcommand. Batch-level errors surface here; failed runs do not.
async fn dispatch(command: Commands, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let result = match command {
        Commands::Run(args) => {
            info!(workers = ?args.batch.workers, "Dispatching to 'run' command.");
            commands::run::run(args, ui_sender).await
        }
        Commands::Plan(args) => {
            info!("Dispatching to 'plan' command.");
            commands::plan::run(args, ui_sender).await
        }
    };
    if result.is_ok() {
        info!("✅ Command completed successfully.");
    }
    result
}
