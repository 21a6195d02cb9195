//! # Workflows Module
//!
//! High-level entry points that tie the `core` and `engine` layers together.
//!
//! - **Batch Workflow** ([`batch`]) - Load, select, plan, persist the manifest, run every
//!   item across the worker pool and optionally write a per-run report.

pub mod batch;
