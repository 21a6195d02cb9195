//! # Core Module
//!
//! Stateless building blocks of a simulation batch.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Work items, run records and run status
//! - **File I/O** ([`io`]) - Work item sources, the run manifest and the outcome report
//! - **Selection** ([`selection`]) - Value predicates and stable orderings for the work list
//! - **Naming** ([`naming`]) - Output and log file templates such as `{label}_{id:014}.root`
//!
//! Nothing in this layer spawns threads or invokes the simulation engine; every
//! function is either pure or performs a single, explicit file operation.

pub mod io;
pub mod models;
pub mod naming;
pub mod selection;
