//! Batch execution over the results table.
//!
//! Every pending row goes PENDING -> RUNNING -> SUCCEEDED | FAILED exactly
//! once. A failing specification is logged and its slots stay null; nothing
//! a single specification does can abort the batch. Only broken bookkeeping
//! (an illegal state transition, a pool that cannot be built) is fatal.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{ResultRow, ResultsTable, SpecRow, SpecStatus, Specification};
use crate::error::{AppError, SpecError};
use crate::fit::{FitRunner, extract};
use crate::models::build_for;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// `1` processes rows sequentially in grid order.
    pub jobs: usize,
    /// Progress event cadence, in completed specifications (`0` disables).
    pub progress_every: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            progress_every: 50,
        }
    }
}

pub struct BatchRunner<'a> {
    runner: FitRunner<'a>,
    options: BatchOptions,
}

struct Progress {
    done: AtomicUsize,
    total: usize,
    every: usize,
}

impl Progress {
    fn tick(&self) {
        let n = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every > 0 && (n % self.every == 0 || n == self.total) {
            info!(done = n, total = self.total, "batch progress");
        }
    }
}

impl<'a> BatchRunner<'a> {
    pub fn new(runner: FitRunner<'a>, options: BatchOptions) -> Self {
        Self { runner, options }
    }

    /// Fit every pending row and return the populated table.
    ///
    /// Rows already in a terminal state (restored on resume) are left alone.
    pub fn run(&self, mut table: ResultsTable) -> Result<ResultsTable, AppError> {
        let pending = table
            .rows
            .iter()
            .filter(|r| r.status() == SpecStatus::Pending)
            .count();
        info!(
            total = table.len(),
            pending,
            jobs = self.options.jobs,
            solver = self.runner.solver_name(),
            "batch started"
        );

        let progress = Progress {
            done: AtomicUsize::new(0),
            total: pending,
            every: self.options.progress_every,
        };

        if self.options.jobs <= 1 {
            for row in table.rows.iter_mut() {
                self.process(row, &progress)?;
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.jobs)
                .build()
                .map_err(|e| AppError::new(4, format!("Failed to build worker pool: {e}")))?;
            pool.install(|| {
                table
                    .rows
                    .par_iter_mut()
                    .try_for_each(|row| self.process(row, &progress))
            })?;
        }

        let counts = table.counts();
        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            "batch finished"
        );
        Ok(table)
    }

    fn process(&self, row: &mut SpecRow, progress: &Progress) -> Result<(), AppError> {
        if row.status() != SpecStatus::Pending {
            return Ok(());
        }
        row.start()?;
        let outcome = self.fit_one(&row.spec);
        if let Err(err) = &outcome {
            warn!(
                index = row.spec.index,
                key = %row.spec.key(),
                kind = err.kind(),
                error = %err,
                "specification failed"
            );
        }
        row.finish(outcome)?;
        progress.tick();
        Ok(())
    }

    fn fit_one(&self, spec: &Specification) -> Result<ResultRow, SpecError> {
        let model = build_for(spec)?;
        let fitted = self.runner.run(
            &model,
            spec.waves,
            spec.imputation,
            spec.estimator,
            spec.gender,
        )?;
        extract(&fitted)
    }
}
