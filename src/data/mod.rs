//! Panel datasets: the in-memory wide table and a synthetic generator.

pub mod panel;
pub mod synthetic;

pub use panel::*;
pub use synthetic::{simulate, SimulationConfig};
