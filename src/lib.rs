//! `spec-curve` library crate.
//!
//! The binary (`sca`) is a thin wrapper around this library so that:
//!
//! - model building, grid enumeration and extraction are testable without an R installation
//! - the batch can be driven with any [`fit::SemSolver`]
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
