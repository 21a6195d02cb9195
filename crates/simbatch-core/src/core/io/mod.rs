//! Provides input/output functionality for batch files.
//!
//! This module reads work lists from rates tables and CSV files, writes the
//! run manifest that records what a batch is about to execute, and writes the
//! optional outcome report once execution has finished.

pub mod manifest;
pub mod report;
pub mod sources;
