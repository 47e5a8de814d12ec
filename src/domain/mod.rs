//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the analytic-decision axes (`Outcome`, `Control`, `Estimator`, ...)
//! - one grid row (`Specification`) and its extracted outputs (`ResultRow`)
//! - the results table the batch mutates (`ResultsTable`)

pub mod table;
pub mod types;

pub use table::*;
pub use types::*;
