use crate::core::models::run::InvocationError;
use crate::core::models::work_item::WorkItem;
use std::path::Path;

/// Performs one simulation run.
///
/// A single invoker instance is shared by every worker of a batch, so it must be
/// `Sync`. The call is expected to block until the run has finished; the
/// distributor applies no timeout.
///
/// Any closure with the matching signature is an invoker:
///
/// ```
/// use simbatch::core::models::run::InvocationError;
/// use simbatch::core::models::work_item::WorkItem;
/// use simbatch::engine::invoker::RunInvoker;
/// use std::path::Path;
///
/// let invoker = |item: &WorkItem, _output: &Path, _log: &Path| {
///     if item.value > 0.0 {
///         Ok(())
///     } else {
///         Err(InvocationError::other("nothing to simulate"))
///     }
/// };
/// let item = WorkItem::new(1u64, 10.0);
/// assert!(invoker.invoke(&item, Path::new("o"), Path::new("l")).is_ok());
/// ```
pub trait RunInvoker: Sync {
    fn invoke(
        &self,
        item: &WorkItem,
        output_path: &Path,
        log_path: &Path,
    ) -> Result<(), InvocationError>;
}

impl<F> RunInvoker for F
where
    F: Fn(&WorkItem, &Path, &Path) -> Result<(), InvocationError> + Sync,
{
    fn invoke(
        &self,
        item: &WorkItem,
        output_path: &Path,
        log_path: &Path,
    ) -> Result<(), InvocationError> {
        self(item, output_path, log_path)
    }
}
