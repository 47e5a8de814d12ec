//! Mathematical utilities: sample moments and numerical rank.

pub mod moments;

pub use moments::*;
