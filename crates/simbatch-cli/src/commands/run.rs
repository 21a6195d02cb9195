use super::open_source;
use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::invoker::CommandInvoker;
use crate::ui::{CliProgressHandler, UiEvent};
use simbatch::engine::progress::ProgressReporter;
use simbatch::workflows::batch;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(&args.batch, &args.program)?;

    let command = app.command.ok_or_else(|| {
        CliError::Argument(
            "No simulation program given; set `command.program` or pass it after `--`"
                .to_string(),
        )
    })?;
    let invoker = CommandInvoker::new(command, app.batch.naming.label.clone())
        .map_err(|e| CliError::Config(e.to_string()))?;
    let source = open_source(&app.source);

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting batch '{}' with {} worker(s) running '{}'...",
        app.batch.naming.label,
        app.batch.execution.worker_count,
        invoker.program()
    );
    info!("Invoking the batch workflow...");

    let summary = tokio::task::block_in_place(|| {
        batch::run(source.as_ref(), &app.batch, &invoker, &reporter)
    })?;

    info!(
        completed = summary.completed(),
        failed = summary.failed(),
        pending = summary.pending(),
        "Workflow finished."
    );

    println!("Manifest: {}", summary.manifest_path.display());
    match (&summary.report_path, &summary.report_error) {
        (Some(_), Some(err)) => println!("Report:   not written ({})", err),
        (Some(report), None) => println!("Report:   {}", report.display()),
        (None, _) => {}
    }
    println!(
        "Runs: {} completed, {} failed, {} not executed",
        summary.completed(),
        summary.failed(),
        summary.pending()
    );

    if summary.failed() > 0 {
        warn!("{} run(s) failed.", summary.failed());
        for record in summary.failed_records() {
            let reason = record
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!(
                "  ✗ {} ({}), log: {}",
                record.item.id,
                reason,
                record.log_path.display()
            );
        }
    }

    Ok(())
}
