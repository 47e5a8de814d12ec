//! Failure report writer for inspecting specifications that did not fit.

use std::fmt::Write as _;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::{ResultsTable, SpecStatus};
use crate::error::AppError;
use crate::models::build_for;

/// Write a markdown report of every failed row into `dir`.
///
/// Returns `None` when nothing failed (no file is written).
pub fn write_failure_report(dir: &Path, table: &ResultsTable) -> Result<Option<PathBuf>, AppError> {
    let failed: Vec<_> = table
        .rows
        .iter()
        .filter(|r| r.status() == SpecStatus::Failed)
        .collect();
    if failed.is_empty() {
        return Ok(None);
    }

    create_dir_all(dir).map_err(|e| {
        AppError::new(
            4,
            format!("Failed to create debug dir '{}': {e}", dir.display()),
        )
    })?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("sca_failures_{ts}.md"));

    let counts = table.counts();
    let mut out = String::new();
    let _ = writeln!(out, "# sca failure report");
    let _ = writeln!(out, "- generated: {}", Local::now().to_rfc3339());
    let _ = writeln!(
        out,
        "- specifications: {} | succeeded: {} | failed: {}",
        counts.total, counts.succeeded, counts.failed
    );

    let _ = writeln!(out, "\n| index | specification | error |");
    let _ = writeln!(out, "| - | - | - |");
    for row in &failed {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            row.spec.index,
            row.spec.key(),
            row.error().unwrap_or_default().replace('|', "\\|")
        );
    }

    for row in &failed {
        let _ = writeln!(out, "\n## #{} {}", row.spec.index, row.spec.key());
        let _ = writeln!(out, "Error: {}", row.error().unwrap_or_default());
        match build_for(&row.spec) {
            Ok(model) => {
                let _ = writeln!(out, "\n```\n{}```", model.render());
            }
            Err(e) => {
                let _ = writeln!(out, "\nModel could not be built: {e}");
            }
        }
    }

    fs::write(&path, out).map_err(|e| {
        AppError::new(
            4,
            format!("Failed to write debug report '{}': {e}", path.display()),
        )
    })?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::table;

    #[test]
    fn report_lists_failed_rows_with_model_text() {
        let dir = tempfile::tempdir().unwrap();
        let table = table();
        let path = write_failure_report(&dir.path().join("debug"), &table)
            .unwrap()
            .unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("failed: 1"));
        assert!(text.contains(&format!("## #2 {}", table.rows[2].spec.key())));
        assert!(text.contains("did not converge"));
        assert!(text.contains("ri_sw =~ 1*a_sw + 1*b_sw + 1*c_sw"));
        assert!(!text.contains("## #0 "));
    }

    #[test]
    fn nothing_failed_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = write_failure_report(dir.path(), &ResultsTable::default()).unwrap();
        assert!(out.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
