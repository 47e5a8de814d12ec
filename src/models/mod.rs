//! Structural model definitions.
//!
//! Definitions are built as typed statements (`syntax`) by a pure builder
//! (`builder`) and rendered to solver text only at the fit boundary.

pub mod builder;
pub mod syntax;

pub use builder::*;
pub use syntax::*;
