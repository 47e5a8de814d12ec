//! The external SEM solver boundary.
//!
//! The engine never estimates a structural model itself. Anything that can
//! take model text plus a data slice and hand back a parameter table and fit
//! indices implements `SemSolver` and is substitutable without touching the
//! rest of the pipeline.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::PanelData;
use crate::domain::Estimator;
use crate::error::SpecError;

/// Everything the solver needs for one fit.
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    pub model: &'a str,
    pub data: &'a PanelData,
    pub estimator: Estimator,
    pub mean_structure: bool,
    /// Indicators to declare ordered (empty for continuous estimators).
    pub ordered: Vec<String>,
    pub ci_level: f64,
    /// On expiry the call fails exactly like a non-converged fit.
    pub timeout: Option<Duration>,
}

pub trait SemSolver: Send + Sync {
    /// Short name for logs and the run manifest.
    fn name(&self) -> &str;

    fn fit(&self, request: &FitRequest<'_>) -> Result<FittedModel, SpecError>;
}

/// One row of the solver's parameter table.
///
/// Cells are optional because solvers report fixed parameters without
/// standard errors, p-values or intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub lhs: String,
    pub op: String,
    pub rhs: String,
    #[serde(default)]
    pub label: String,
    pub est: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub std: Option<f64>,
    pub std_ci_lower: Option<f64>,
    pub std_ci_upper: Option<f64>,
    pub pvalue: Option<f64>,
}

/// Fitted-model handle returned by a solver.
///
/// Read-only once constructed; the extractor only borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    parameters: Vec<ParameterRow>,
    sample_size: usize,
    total_observations: usize,
    free_parameters: usize,
    fit_indices: BTreeMap<String, Option<f64>>,
}

impl FittedModel {
    pub fn new(
        parameters: Vec<ParameterRow>,
        sample_size: usize,
        total_observations: usize,
        free_parameters: usize,
        fit_indices: BTreeMap<String, Option<f64>>,
    ) -> Self {
        Self {
            parameters,
            sample_size,
            total_observations,
            free_parameters,
            fit_indices,
        }
    }

    /// Parameter table in solver order.
    pub fn parameters(&self) -> &[ParameterRow] {
        &self.parameters
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn total_observations(&self) -> usize {
        self.total_observations
    }

    pub fn free_parameter_count(&self) -> usize {
        self.free_parameters
    }

    /// A named fit index (`cfi`, `rmsea`, `srmr`, ...); `None` if absent or NA.
    pub fn fit_index(&self, name: &str) -> Option<f64> {
        self.fit_indices.get(name).copied().flatten()
    }
}
