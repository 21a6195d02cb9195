//! # Engine Module
//!
//! The stateful layer that turns a validated work list into finished runs.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Naming, selection and execution settings with a builder
//! - **Distribution** ([`distributor`]) - Planning and bounded-parallel dispatch of runs
//! - **Invocation** ([`invoker`]) - The seam through which a single run is performed
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Batch-level failures that abort before dispatch
//!
//! Per-run failures never surface as [`error::BatchError`]; they are recorded on the
//! corresponding [`RunRecord`](crate::core::models::run::RunRecord) so that one
//! broken run cannot take down its siblings.

pub mod config;
pub mod distributor;
pub mod error;
pub mod invoker;
pub mod progress;
