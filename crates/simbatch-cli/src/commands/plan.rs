use super::open_source;
use crate::cli::BatchArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use simbatch::core::io::manifest;
use simbatch::core::models::run::RunRecord;
use simbatch::engine::progress::ProgressReporter;
use simbatch::workflows::batch;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: BatchArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(&args, &[])?;
    let source = open_source(&app.source);

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the plan workflow...");
    let plan = tokio::task::block_in_place(|| {
        batch::plan_only(source.as_ref(), &app.batch, &reporter)
    })?;

    println!(
        "Planned {} run(s); manifest written to {}",
        plan.len(),
        app.batch.manifest_path.display()
    );
    for record in plan.records() {
        println!("{}", plan_line(record));
    }
    if app.batch.execution.test_run && !plan.is_empty() {
        println!("Test run: only run {} would be executed.", plan.records()[0].item.id);
    }

    Ok(())
}

/// The manifest line for the run, followed by its output and log paths.
fn plan_line(record: &RunRecord) -> String {
    format!(
        "{}  {}  {}",
        manifest::format_line(&record.item),
        record.output_path.display(),
        record.log_path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbatch::core::models::work_item::WorkItem;
    use std::path::PathBuf;

    fn record(item: WorkItem) -> RunRecord {
        RunRecord::pending(item, PathBuf::from("a.root"), PathBuf::from("a.log"))
    }

    #[test]
    fn plan_lines_start_with_the_manifest_line() {
        let counted = WorkItem::new(3u64, 80.0);
        let huge = WorkItem::new(4u64, 1e20);

        assert_eq!(
            plan_line(&record(counted)),
            "             3              80  a.root  a.log"
        );
        let line = plan_line(&record(huge.clone()));
        assert!(line.starts_with(&manifest::format_line(&huge)));
    }
}
