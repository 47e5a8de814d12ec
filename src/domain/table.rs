//! The results table: one row per specification, mutated in place by the batch.

use crate::domain::{ResultRow, SpecStatus, Specification};
use crate::error::{AppError, SpecError};

/// One slot of the results table.
#[derive(Debug, Clone)]
pub struct SpecRow {
    pub spec: Specification,
    status: SpecStatus,
    result: Option<ResultRow>,
    error: Option<String>,
}

impl SpecRow {
    pub fn new(spec: Specification) -> Self {
        Self {
            spec,
            status: SpecStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> SpecStatus {
        self.status
    }

    pub fn result(&self) -> Option<&ResultRow> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// PENDING -> RUNNING.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.status != SpecStatus::Pending {
            return Err(AppError::new(
                4,
                format!(
                    "Specification {} cannot start from state {}.",
                    self.spec.index,
                    self.status.as_str()
                ),
            ));
        }
        self.status = SpecStatus::Running;
        Ok(())
    }

    /// RUNNING -> SUCCEEDED | FAILED.
    ///
    /// Output slots are written in one assignment, so a row is either fully
    /// populated or entirely null.
    pub fn finish(&mut self, outcome: Result<ResultRow, SpecError>) -> Result<(), AppError> {
        if self.status != SpecStatus::Running {
            return Err(AppError::new(
                4,
                format!(
                    "Specification {} cannot finish from state {}.",
                    self.spec.index,
                    self.status.as_str()
                ),
            ));
        }
        match outcome {
            Ok(row) => {
                self.status = SpecStatus::Succeeded;
                self.result = Some(row);
                self.error = None;
            }
            Err(err) => {
                self.status = SpecStatus::Failed;
                self.result = None;
                self.error = Some(err.to_string());
            }
        }
        Ok(())
    }

    /// Restore a previously persisted success (resume).
    pub(crate) fn restore(&mut self, row: ResultRow) {
        self.status = SpecStatus::Succeeded;
        self.result = Some(row);
        self.error = None;
    }

    /// Rebuild a persisted row in any state (used when reading a table back).
    pub(crate) fn from_parts(
        spec: Specification,
        status: SpecStatus,
        result: Option<ResultRow>,
        error: Option<String>,
    ) -> Self {
        Self {
            spec,
            status,
            result,
            error,
        }
    }
}

/// Counts by terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Rows = specifications in grid order.
#[derive(Debug, Clone, Default)]
pub struct ResultsTable {
    pub rows: Vec<SpecRow>,
}

impl ResultsTable {
    /// A fresh table with every output slot null.
    pub fn new(grid: Vec<Specification>) -> Self {
        Self {
            rows: grid.into_iter().map(SpecRow::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn counts(&self) -> TableCounts {
        let mut counts = TableCounts {
            total: self.rows.len(),
            ..TableCounts::default()
        };
        for row in &self.rows {
            match row.status {
                SpecStatus::Succeeded => counts.succeeded += 1,
                SpecStatus::Failed => counts.failed += 1,
                SpecStatus::Pending | SpecStatus::Running => counts.pending += 1,
            }
        }
        counts
    }

    pub fn results(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter_map(|r| r.result.as_ref())
    }

    /// Mark rows as already succeeded when a persisted row matches by index and key.
    ///
    /// Returns the number of rows restored.
    pub fn restore_from(&mut self, stored: Vec<SpecRow>) -> usize {
        let mut restored = 0usize;
        for prev in stored {
            if prev.status != SpecStatus::Succeeded {
                continue;
            }
            let Some(result) = prev.result else {
                continue;
            };
            let Some(row) = self.rows.get_mut(prev.spec.index) else {
                continue;
            };
            if row.status == SpecStatus::Pending && row.spec.key() == prev.spec.key() {
                row.restore(result);
                restored += 1;
            }
        }
        restored
    }
}
