//! # simbatch Core Library
//!
//! Distributes a list of independent Monte-Carlo simulation runs across a bounded pool of
//! workers. Each run is derived from a weighted work item (for example a decay rate scaled
//! by an exposure time), gets deterministic output and log file names, and is tracked to
//! completion or failure without affecting its siblings.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`WorkItem`, `RunRecord`), value
//!   selection, file-name templating, and I/O for work-item sources, the run manifest and
//!   the run report.
//!
//! - **[`engine`]: The Logic Core.** Batch configuration, the error taxonomy, progress
//!   reporting, the `RunInvoker` seam and the `BatchRunDistributor` that plans and executes
//!   runs on a dedicated thread pool.
//!
//! - **[`workflows`]: The Public API.** Complete procedures such as [`workflows::batch::run`],
//!   which goes from a work-item source to a summary of every run.

pub mod core;
pub mod engine;
pub mod workflows;
