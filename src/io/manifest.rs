//! Run manifest JSON written next to the results table.
//!
//! The manifest records what produced a table: inputs, solver, worker count,
//! the axis levels of the grid and the final counts.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Estimator, Gender, Imputation, Outcome, Predictor, TableCounts, WaveCount};
use crate::error::AppError;
use crate::fit::GridAxes;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLevels {
    pub outcomes: Vec<Outcome>,
    pub predictors: Vec<Predictor>,
    pub waves: Vec<WaveCount>,
    /// Control-set labels (`none`, `all`, or names joined with `+`).
    pub controls: Vec<String>,
    pub estimators: Vec<Estimator>,
    pub imputations: Vec<Imputation>,
    pub genders: Vec<Gender>,
}

impl From<&GridAxes> for AxisLevels {
    fn from(axes: &GridAxes) -> Self {
        Self {
            outcomes: axes.outcomes.clone(),
            predictors: axes.predictors.clone(),
            waves: axes.waves.clone(),
            controls: axes.control_sets.iter().map(|c| c.label()).collect(),
            estimators: axes.estimators.clone(),
            imputations: axes.imputations.clone(),
            genders: axes.genders.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCounts {
    pub total: usize,
    /// Rows fitted in this run (excludes rows restored on resume).
    pub attempted: usize,
    pub restored: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ManifestCounts {
    pub fn new(counts: TableCounts, restored: usize) -> Self {
        Self {
            total: counts.total,
            attempted: counts.total.saturating_sub(counts.pending + restored),
            restored,
            succeeded: counts.succeeded,
            failed: counts.failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub data_path: PathBuf,
    pub imputed_path: PathBuf,
    pub results_path: PathBuf,
    pub solver: String,
    pub jobs: usize,
    pub axes: AxisLevels,
    pub counts: ManifestCounts,
}

/// `results.csv` -> `results.manifest.json`.
pub fn manifest_path(results: &Path) -> PathBuf {
    results.with_extension("manifest.json")
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            4,
            format!("Failed to create manifest '{}': {e}", path.display()),
        )
    })?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::new(4, format!("Failed to write manifest JSON: {e}")))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open manifest '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid manifest JSON: {e}")))
}
