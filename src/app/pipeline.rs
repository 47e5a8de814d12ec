//! Shared "batch pipeline" logic behind `sca run`.
//!
//! Keeping this in one place keeps the workflow in a single readable sequence:
//! build grid -> load panels -> warn on missing columns -> restore (resume) ->
//! batch -> persist table + manifest -> optional failure report.
//!
//! The CLI layer only resolves configuration and prints the outcome.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::app::batch::{BatchOptions, BatchRunner};
use crate::data::Datasets;
use crate::domain::{ResultsTable, RunConfig};
use crate::error::AppError;
use crate::fit::{FitOptions, FitRunner, GridAxes, RscriptSolver, SemSolver, build_grid};
use crate::io::{
    AxisLevels, ManifestCounts, RunManifest, grid_columns, load_datasets, manifest_path,
    read_results, report_missing_columns, write_manifest, write_results_csv,
};

/// All computed outputs of a single `sca run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: ResultsTable,
    /// Rows taken over from an earlier table on resume.
    pub restored: usize,
    pub elapsed: Duration,
    pub manifest: PathBuf,
    pub failure_report: Option<PathBuf>,
}

/// Execute the full batch against the configured panels and the lavaan solver.
pub fn run_batch(config: &RunConfig, axes: &GridAxes) -> Result<RunOutput, AppError> {
    validate_config(config)?;
    // Only the columns the grid fits are parsed strictly.
    let strict = grid_columns(&build_grid(axes)?);
    let datasets = load_datasets(&config.data_path, &config.imputed_path, &strict)?;
    let solver = RscriptSolver::new(config.rscript.clone()).with_timeout(config.timeout);
    run_batch_with(config, axes, &datasets, &solver)
}

/// Execute the batch with pre-loaded datasets and an arbitrary solver.
pub fn run_batch_with(
    config: &RunConfig,
    axes: &GridAxes,
    datasets: &Datasets,
    solver: &dyn SemSolver,
) -> Result<RunOutput, AppError> {
    validate_config(config)?;
    let started_at = Utc::now();
    let clock = Instant::now();

    let grid = build_grid(axes)?;
    let incomplete = report_missing_columns(datasets, &grid);
    if incomplete > 0 {
        warn!(
            specifications = incomplete,
            "some specifications cannot find their columns and will fail"
        );
    }
    let mut table = ResultsTable::new(grid);

    let mut restored = 0;
    if config.resume {
        if config.output_path.exists() {
            restored = table.restore_from(read_results(&config.output_path)?);
            info!(
                restored,
                path = %config.output_path.display(),
                "resuming from existing results"
            );
        } else {
            warn!(
                path = %config.output_path.display(),
                "no results table to resume from; fitting every specification"
            );
        }
    }

    let runner = FitRunner::new(
        datasets,
        solver,
        FitOptions {
            mean_structure: config.mean_structure,
            ci_level: config.ci_level,
            timeout: config.timeout,
            precheck: config.precheck,
        },
    );
    let batch = BatchRunner::new(
        runner,
        BatchOptions {
            jobs: config.jobs,
            progress_every: config.progress_every,
        },
    );
    let table = batch.run(table)?;

    write_results_csv(&config.output_path, &table)?;

    let manifest = manifest_path(&config.output_path);
    write_manifest(
        &manifest,
        &RunManifest {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: Utc::now(),
            data_path: config.data_path.clone(),
            imputed_path: config.imputed_path.clone(),
            results_path: config.output_path.clone(),
            solver: solver.name().to_string(),
            jobs: config.jobs,
            axes: AxisLevels::from(axes),
            counts: ManifestCounts::new(table.counts(), restored),
        },
    )?;

    let failure_report = match &config.debug_dir {
        Some(dir) => crate::debug::write_failure_report(dir, &table)?,
        None => None,
    };

    Ok(RunOutput {
        table,
        restored,
        elapsed: clock.elapsed(),
        manifest,
        failure_report,
    })
}

fn validate_config(config: &RunConfig) -> Result<(), AppError> {
    if config.jobs == 0 {
        return Err(AppError::new(2, "Jobs must be >= 1."));
    }
    if !(config.ci_level > 0.0 && config.ci_level < 1.0) {
        return Err(AppError::new(2, "Confidence level must be in (0, 1)."));
    }
    if let Some(t) = config.timeout {
        if t.is_zero() {
            return Err(AppError::new(2, "Timeout must be > 0 seconds."));
        }
    }
    Ok(())
}
