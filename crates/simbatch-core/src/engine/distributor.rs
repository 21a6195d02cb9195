use super::config::{BatchConfig, ConfigError, ExecutionConfig};
use super::error::BatchError;
use super::invoker::RunInvoker;
use super::progress::{Progress, ProgressReporter};
use crate::core::io::manifest;
use crate::core::io::sources::WorkItemSource;
use crate::core::models::run::{InvocationError, RunRecord, RunStatus};
use crate::core::models::work_item::{WorkItem, WorkItemId};
use crate::core::naming::NamingScheme;
use crate::core::selection;
use rayon::prelude::*;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The validated, path-resolved run list of a batch, in execution-priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    records: Vec<RunRecord>,
}

impl RunPlan {
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.records.iter().map(|r| &r.item)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<RunRecord> {
        self.records
    }
}

/// Drives one invocation per retained work item across a bounded pool of workers.
#[derive(Debug, Clone)]
pub struct BatchRunDistributor {
    naming: NamingScheme,
    execution: ExecutionConfig,
}

impl BatchRunDistributor {
    pub fn new(naming: NamingScheme, execution: ExecutionConfig) -> Self {
        Self { naming, execution }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.naming.clone(), config.execution)
    }

    pub fn worker_count(&self) -> usize {
        self.execution.worker_count
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    pub fn load_work_items<S>(source: &S) -> Result<Vec<WorkItem>, BatchError>
    where
        S: WorkItemSource + ?Sized,
    {
        let items = source.load()?;
        debug!(count = items.len(), "Loaded work items from source.");
        Ok(items)
    }

    pub fn filter<P>(items: Vec<WorkItem>, predicate: P) -> Vec<WorkItem>
    where
        P: Fn(f64) -> bool,
    {
        selection::filter(items, predicate)
    }

    pub fn sort<C>(items: Vec<WorkItem>, comparator: C) -> Vec<WorkItem>
    where
        C: FnMut(&WorkItem, &WorkItem) -> Ordering,
    {
        selection::sort(items, comparator)
    }

    pub fn persist_manifest<'a>(
        items: impl IntoIterator<Item = &'a WorkItem>,
        path: &Path,
    ) -> Result<(), BatchError> {
        manifest::persist_manifest(items, path).map_err(|e| BatchError::io(path, e))?;
        info!(path = %path.display(), "Run manifest written.");
        Ok(())
    }

    /// Validates the work list and derives every output and log path.
    ///
    /// Fails before anything runs if the worker count is zero, an id repeats, or
    /// two paths (output or log, across all items) coincide.
    pub fn plan(&self, items: Vec<WorkItem>) -> Result<RunPlan, BatchError> {
        self.check_worker_count()?;

        let mut seen_ids: HashSet<&WorkItemId> = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen_ids.insert(&item.id) {
                return Err(ConfigError::DuplicateId(item.id.clone()).into());
            }
        }

        let mut claimed: HashMap<PathBuf, WorkItemId> = HashMap::with_capacity(items.len() * 2);
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let output_path = self.naming.output_path(&item.id);
            let log_path = self.naming.log_path(&item.id);
            for path in [&output_path, &log_path] {
                if let Some(first) = claimed.insert(path.clone(), item.id.clone()) {
                    return Err(ConfigError::PathCollision {
                        path: path.clone(),
                        first,
                        second: item.id.clone(),
                    }
                    .into());
                }
            }
            records.push(RunRecord::pending(item, output_path, log_path));
        }

        debug!(runs = records.len(), "Run plan validated.");
        Ok(RunPlan { records })
    }

    /// Runs `plan` and returns its records in plan order.
    ///
    /// Per-run failures, including panics inside the invoker, are recorded on the
    /// affected record and never abort sibling runs. In test-run mode only the
    /// first planned run is executed and the others are returned as pending.
    #[instrument(skip_all, name = "distribute", fields(workers = self.execution.worker_count))]
    pub fn execute<I>(
        &self,
        plan: RunPlan,
        invoker: &I,
        reporter: &ProgressReporter,
    ) -> Result<Vec<RunRecord>, BatchError>
    where
        I: RunInvoker + ?Sized,
    {
        self.check_worker_count()?;

        let mut to_run = plan.into_records();
        if to_run.is_empty() {
            info!("Nothing to run.");
            return Ok(to_run);
        }

        let deferred = if self.execution.test_run {
            info!("Test run: executing only the first planned run.");
            to_run.split_off(1)
        } else {
            Vec::new()
        };

        let total = to_run.len();
        let threads = self.execution.worker_count.min(total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("simbatch-worker-{}", i))
            .build()
            .map_err(|e| BatchError::WorkerPool(e.to_string()))?;

        info!(runs = total, threads, "Dispatching runs.");
        reporter.report(Progress::TaskStart {
            total: total as u64,
        });

        let tally = Tally::default();
        let mut records: Vec<RunRecord> = pool.install(|| {
            to_run
                .into_par_iter()
                .with_max_len(1)
                .map(|mut record| {
                    self.run_one(&mut record, invoker, reporter, &tally, total);
                    record
                })
                .collect()
        });

        reporter.report(Progress::TaskFinish);

        let failed = tally.failed.load(AtomicOrdering::SeqCst);
        if failed > 0 {
            warn!(failed, total, "Batch finished with failed runs.");
        } else {
            info!(total, "All runs completed.");
        }

        records.extend(deferred);
        Ok(records)
    }

    /// `plan` followed by `execute`.
    pub fn distribute<I>(
        &self,
        items: Vec<WorkItem>,
        invoker: &I,
        reporter: &ProgressReporter,
    ) -> Result<Vec<RunRecord>, BatchError>
    where
        I: RunInvoker + ?Sized,
    {
        let plan = self.plan(items)?;
        self.execute(plan, invoker, reporter)
    }

    fn check_worker_count(&self) -> Result<(), BatchError> {
        if self.execution.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.execution.worker_count).into());
        }
        Ok(())
    }

    fn run_one<I>(
        &self,
        record: &mut RunRecord,
        invoker: &I,
        reporter: &ProgressReporter,
        tally: &Tally,
        total: usize,
    ) where
        I: RunInvoker + ?Sized,
    {
        record.mark_running();
        tally.running.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(
            id = %record.item.id,
            output = %record.output_path.display(),
            log = %record.log_path.display(),
            "Run started."
        );

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            invoker.invoke(&record.item, &record.output_path, &record.log_path)
        }))
        .unwrap_or_else(|payload| Err(InvocationError::Panicked(panic_message(payload.as_ref()))));
        record.finish(result, started.elapsed());

        tally.running.fetch_sub(1, AtomicOrdering::SeqCst);
        let done = tally.finished.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        match (&record.status, &record.error) {
            (RunStatus::Failed, Some(err)) => {
                tally.failed.fetch_add(1, AtomicOrdering::SeqCst);
                warn!(id = %record.item.id, error = %err, "Run failed.");
                reporter.report(Progress::Message(format!(
                    "Run {} failed: {}",
                    record.item.id, err
                )));
            }
            _ => {
                info!(
                    id = %record.item.id,
                    elapsed_s = record.elapsed.map(|d| d.as_secs_f64()).unwrap_or_default(),
                    "Run completed."
                );
            }
        }

        reporter.report(Progress::TaskIncrement { amount: 1 });
        reporter.report(Progress::StatusUpdate {
            text: format!(
                "{}/{} done, {} running, {} failed",
                done,
                total,
                tally.running.load(AtomicOrdering::SeqCst),
                tally.failed.load(AtomicOrdering::SeqCst)
            ),
        });
    }
}

#[derive(Default)]
struct Tally {
    running: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::naming::NamingTemplate;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn scheme(directory: Option<PathBuf>) -> NamingScheme {
        NamingScheme {
            output: NamingTemplate::parse("{label}_{id:014}.root").unwrap(),
            log: NamingTemplate::parse("sim_decay_{label}_{id:014}.log").unwrap(),
            label: "CdTeWafer".to_string(),
            directory,
        }
    }

    fn distributor(workers: usize) -> BatchRunDistributor {
        BatchRunDistributor::new(
            scheme(None),
            ExecutionConfig {
                worker_count: workers,
                test_run: false,
            },
        )
    }

    fn items(n: u64) -> Vec<WorkItem> {
        (1..=n).map(|i| WorkItem::new(i, i as f64 * 10.0)).collect()
    }

    fn ok_invoker(_: &WorkItem, _: &Path, _: &Path) -> Result<(), InvocationError> {
        Ok(())
    }

    #[test]
    fn distribute_returns_one_record_per_item_with_unique_paths() {
        let records = distributor(3)
            .distribute(items(10), &ok_invoker, &ProgressReporter::new())
            .unwrap();

        assert_eq!(records.len(), 10);
        let pairs: HashSet<_> = records
            .iter()
            .map(|r| (r.output_path.clone(), r.log_path.clone()))
            .collect();
        assert_eq!(pairs.len(), 10);
        assert!(records.iter().all(|r| r.status == RunStatus::Completed));
        assert!(records.iter().all(|r| r.elapsed.is_some()));
    }

    #[test]
    fn paths_follow_naming_templates() {
        let records = distributor(1)
            .distribute(vec![WorkItem::new(481090u64, 5.0)], &ok_invoker, &ProgressReporter::new())
            .unwrap();
        assert_eq!(
            records[0].output_path,
            PathBuf::from("CdTeWafer_00000000481090.root")
        );
        assert_eq!(
            records[0].log_path,
            PathBuf::from("sim_decay_CdTeWafer_00000000481090.log")
        );
    }

    #[test]
    fn failure_of_one_item_does_not_affect_siblings() {
        let invoker = |item: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            if item.id == WorkItemId::Numeric(5) {
                Err(InvocationError::other("deterministic failure"))
            } else {
                Ok(())
            }
        };
        let records = distributor(4)
            .distribute(items(9), &invoker, &ProgressReporter::new())
            .unwrap();

        for record in &records {
            if record.item.id == WorkItemId::Numeric(5) {
                assert_eq!(record.status, RunStatus::Failed);
                assert_eq!(
                    record.error,
                    Some(InvocationError::other("deterministic failure"))
                );
            } else {
                assert_eq!(record.status, RunStatus::Completed);
                assert!(record.error.is_none());
            }
        }
    }

    #[test]
    fn panicking_invoker_is_recorded_as_failed() {
        let invoker = |item: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            if item.id == WorkItemId::Numeric(2) {
                panic!("engine exploded");
            }
            Ok(())
        };
        let records = distributor(2)
            .distribute(items(3), &invoker, &ProgressReporter::new())
            .unwrap();

        assert_eq!(records[0].status, RunStatus::Completed);
        assert_eq!(records[1].status, RunStatus::Failed);
        assert_eq!(
            records[1].error,
            Some(InvocationError::Panicked("engine exploded".to_string()))
        );
        assert_eq!(records[2].status, RunStatus::Completed);
    }

    #[test]
    fn zero_workers_is_rejected_without_invoking() {
        let calls = AtomicUsize::new(0);
        let invoker = |_: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        };
        let err = distributor(0)
            .distribute(items(3), &invoker, &ProgressReporter::new())
            .unwrap_err();

        assert!(matches!(
            err,
            BatchError::Configuration(ConfigError::InvalidWorkerCount(0))
        ));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn duplicate_ids_are_rejected_up_front() {
        let calls = AtomicUsize::new(0);
        let invoker = |_: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        };
        let list = vec![
            WorkItem::new(1u64, 1.0),
            WorkItem::new(3u64, 2.0),
            WorkItem::new(3u64, 3.0),
        ];
        let err = distributor(2)
            .distribute(list, &invoker, &ProgressReporter::new())
            .unwrap_err();

        assert!(matches!(
            err,
            BatchError::Configuration(ConfigError::DuplicateId(WorkItemId::Numeric(3)))
        ));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn colliding_paths_are_rejected() {
        // Named "0007" and numeric 7 render to the same padded file name.
        let list = vec![
            WorkItem::new(7u64, 1.0),
            WorkItem::new(WorkItemId::Named("0007".to_string()), 2.0),
        ];
        let d = BatchRunDistributor::new(
            NamingScheme {
                output: NamingTemplate::parse("{id:04}.root").unwrap(),
                log: NamingTemplate::parse("{id:04}.log").unwrap(),
                label: String::new(),
                directory: None,
            },
            ExecutionConfig {
                worker_count: 1,
                test_run: false,
            },
        );
        let err = d.plan(list).unwrap_err();
        assert!(matches!(
            err,
            BatchError::Configuration(ConfigError::PathCollision { .. })
        ));
    }

    #[test]
    fn output_and_log_templates_must_differ() {
        let d = BatchRunDistributor::new(
            NamingScheme {
                output: NamingTemplate::parse("run_{id}").unwrap(),
                log: NamingTemplate::parse("run_{id}").unwrap(),
                label: String::new(),
                directory: None,
            },
            ExecutionConfig {
                worker_count: 1,
                test_run: false,
            },
        );
        let err = d.plan(items(1)).unwrap_err();
        assert!(matches!(
            err,
            BatchError::Configuration(ConfigError::PathCollision { .. })
        ));
    }

    #[test]
    fn empty_list_returns_immediately() {
        let calls = AtomicUsize::new(0);
        let invoker = |_: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        };
        let records = distributor(4)
            .distribute(Vec::new(), &invoker, &ProgressReporter::new())
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let invoker = |_: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            let now = in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            peak.fetch_max(now, AtomicOrdering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
            Ok(())
        };
        let records = distributor(3)
            .distribute(items(12), &invoker, &ProgressReporter::new())
            .unwrap();

        assert_eq!(records.len(), 12);
        let peak = peak.load(AtomicOrdering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
        assert!(peak >= 1);
    }

    #[test]
    fn each_item_is_invoked_exactly_once_and_order_is_preserved() {
        let seen = Mutex::new(Vec::new());
        let invoker = |item: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            // Later items finish first.
            let delay = 60u64.saturating_sub(item.value as u64);
            thread::sleep(Duration::from_millis(delay));
            seen.lock().unwrap().push(item.id.clone());
            Ok(())
        };
        let input = items(6);
        let records = distributor(6)
            .distribute(input.clone(), &invoker, &ProgressReporter::new())
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 6);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);

        let returned: Vec<_> = records.iter().map(|r| r.item.clone()).collect();
        assert_eq!(returned, input);
    }

    #[test]
    fn test_run_executes_only_the_first_item() {
        let calls = AtomicUsize::new(0);
        let invoker = |_: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        };
        let d = BatchRunDistributor::new(
            scheme(None),
            ExecutionConfig {
                worker_count: 4,
                test_run: true,
            },
        );
        let records = d
            .distribute(items(5), &invoker, &ProgressReporter::new())
            .unwrap();

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].status, RunStatus::Completed);
        assert!(records[1..].iter().all(|r| r.status == RunStatus::Pending));
    }

    #[test]
    fn progress_events_cover_every_run() {
        let increments = AtomicUsize::new(0);
        let messages = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|p: Progress| match p {
            Progress::TaskIncrement { amount } => {
                increments.fetch_add(amount as usize, AtomicOrdering::SeqCst);
            }
            Progress::Message(m) => messages.lock().unwrap().push(m),
            _ => {}
        }));
        let invoker = |item: &WorkItem, _: &Path, _: &Path| -> Result<(), InvocationError> {
            if item.id == WorkItemId::Numeric(2) {
                Err(InvocationError::other("bad seed"))
            } else {
                Ok(())
            }
        };
        distributor(2).distribute(items(4), &invoker, &reporter).unwrap();
        drop(reporter);

        assert_eq!(increments.load(AtomicOrdering::SeqCst), 4);
        let messages = messages.into_inner().unwrap();
        assert_eq!(messages, vec!["Run 2 failed: bad seed".to_string()]);
    }

    #[test]
    fn plan_joins_paths_under_directory() {
        let d = BatchRunDistributor::new(
            scheme(Some(PathBuf::from("runs"))),
            ExecutionConfig {
                worker_count: 1,
                test_run: false,
            },
        );
        let plan = d.plan(items(1)).unwrap();
        assert_eq!(
            plan.records()[0].output_path,
            PathBuf::from("runs/CdTeWafer_00000000000001.root")
        );
        assert_eq!(plan.items().count(), 1);
    }
}
