use crate::core::io::report;
use crate::core::io::sources::WorkItemSource;
use crate::core::models::run::{RunRecord, RunStatus};
use crate::core::selection;
use crate::engine::config::BatchConfig;
use crate::engine::distributor::{BatchRunDistributor, RunPlan};
use crate::engine::error::BatchError;
use crate::engine::invoker::RunInvoker;
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub manifest_path: PathBuf,
    pub report_path: Option<PathBuf>,
    /// Set when the report could not be written; the run records are still complete.
    pub report_error: Option<String>,
    pub records: Vec<RunRecord>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.count(RunStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(RunStatus::Failed)
    }

    pub fn pending(&self) -> usize {
        self.count(RunStatus::Pending)
    }

    /// True when every planned run was executed and succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.status == RunStatus::Completed)
    }

    pub fn failed_records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
    }

    fn count(&self, status: RunStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

/// Loads, selects and validates the work list without writing anything.
pub fn prepare<S>(
    source: &S,
    config: &BatchConfig,
    reporter: &ProgressReporter,
) -> Result<RunPlan, BatchError>
where
    S: WorkItemSource + ?Sized,
{
    reporter.report(Progress::PhaseStart {
        name: "Loading Work Items",
    });
    let loaded = BatchRunDistributor::load_work_items(source)?;
    let loaded_count = loaded.len();
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Selection" });
    let retained = selection::filter_by(loaded, &config.selection.filter);
    let retained = selection::sort_by(retained, config.selection.order);
    info!(
        loaded = loaded_count,
        retained = retained.len(),
        filter = ?config.selection.filter,
        order = ?config.selection.order,
        "Work items selected."
    );
    reporter.report(Progress::PhaseFinish);

    BatchRunDistributor::from_config(config).plan(retained)
}

/// Runs the selection and planning steps and writes the manifest, invoking nothing.
#[instrument(skip_all, name = "plan_workflow")]
pub fn plan_only<S>(
    source: &S,
    config: &BatchConfig,
    reporter: &ProgressReporter,
) -> Result<RunPlan, BatchError>
where
    S: WorkItemSource + ?Sized,
{
    let plan = prepare(source, config, reporter)?;
    write_manifest(&plan, config, reporter)?;
    Ok(plan)
}

/// Executes a complete batch: load, select, plan, write the manifest, run every
/// planned item and optionally write the per-run report.
///
/// Only batch-level failures are returned as errors. Individual run failures are
/// reported in the returned [`BatchSummary`].
#[instrument(skip_all, name = "batch_workflow")]
pub fn run<S, I>(
    source: &S,
    config: &BatchConfig,
    invoker: &I,
    reporter: &ProgressReporter,
) -> Result<BatchSummary, BatchError>
where
    S: WorkItemSource + ?Sized,
    I: RunInvoker + ?Sized,
{
    let plan = prepare(source, config, reporter)?;
    write_manifest(&plan, config, reporter)?;

    reporter.report(Progress::PhaseStart { name: "Simulation" });
    let records = BatchRunDistributor::from_config(config).execute(plan, invoker, reporter)?;
    reporter.report(Progress::PhaseFinish);

    let report_error = config
        .report_path
        .as_deref()
        .and_then(|path| write_report(&records, path, reporter));

    let summary = BatchSummary {
        manifest_path: config.manifest_path.clone(),
        report_path: config.report_path.clone(),
        report_error,
        records,
    };

    if summary.failed() > 0 {
        warn!(
            completed = summary.completed(),
            failed = summary.failed(),
            pending = summary.pending(),
            "Batch finished with failures."
        );
    } else {
        info!(
            completed = summary.completed(),
            pending = summary.pending(),
            "Batch finished."
        );
    }

    Ok(summary)
}

fn write_manifest(
    plan: &RunPlan,
    config: &BatchConfig,
    reporter: &ProgressReporter,
) -> Result<(), BatchError> {
    reporter.report(Progress::PhaseStart {
        name: "Writing Manifest",
    });
    if let Some(dir) = &config.naming.directory {
        create_dir(dir)?;
    }
    let run_dirs: BTreeSet<&Path> = plan
        .records()
        .iter()
        .flat_map(|r| [r.output_path.parent(), r.log_path.parent()])
        .flatten()
        .collect();
    for dir in run_dirs {
        create_dir(dir)?;
    }
    for path in [Some(config.manifest_path.as_path()), config.report_path.as_deref()]
        .into_iter()
        .flatten()
    {
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
    }
    BatchRunDistributor::persist_manifest(plan.items(), &config.manifest_path)?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

fn create_dir(dir: &Path) -> Result<(), BatchError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| BatchError::io(dir, e))
}

/// Runs have already finished here, so a failed report is logged and returned as text.
fn write_report(records: &[RunRecord], path: &Path, reporter: &ProgressReporter) -> Option<String> {
    reporter.report(Progress::PhaseStart {
        name: "Writing Report",
    });
    let result = report::persist_report(records, path);
    reporter.report(Progress::PhaseFinish);
    match result {
        Ok(()) => {
            info!(path = %path.display(), "Run report written.");
            None
        }
        Err(e) => {
            let message = format!("Failed to write run report '{}': {}", path.display(), e);
            warn!(path = %path.display(), error = %e, "Run report not written.");
            reporter.report(Progress::Message(message.clone()));
            Some(message)
        }
    }
}
