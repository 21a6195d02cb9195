//! # Core Models Module
//!
//! Plain data structures describing a batch: the work items produced by a source and
//! the per-run records produced by the distributor.
//!
//! - [`work_item`] - Work item identifiers, values and metadata
//! - [`run`] - Run records, their lifecycle status and per-run invocation errors

pub mod run;
pub mod work_item;
