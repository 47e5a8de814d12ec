//! Input/output helpers.
//!
//! - panel CSV ingest + grid column validation (`ingest`)
//! - results, grid and panel CSV exports (`export`)
//! - results table read-back for resume and summaries (`results`)
//! - run manifest JSON (`manifest`)

pub mod export;
pub mod ingest;
pub mod manifest;
pub mod results;

pub use export::*;
pub use ingest::*;
pub use manifest::*;
pub use results::*;
