//! Specification fitting.
//!
//! Responsibilities:
//!
//! - enumerate the specification grid in stable order
//! - slice the data and hand a model to an external SEM solver
//! - pull the fixed result schema out of each fitted model

pub mod extract;
pub mod grid;
pub mod rscript;
pub mod runner;
pub mod solver;

pub use extract::*;
pub use grid::*;
pub use rscript::*;
pub use runner::*;
pub use solver::*;
