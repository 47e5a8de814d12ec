//! CSV exports: the results table, the grid listing and synthetic panels.
//!
//! The results table is written to a sibling temp file and renamed into
//! place, so an interrupted run never leaves a half-written table behind.

use std::path::Path;

use tempfile::NamedTempFile;

use crate::data::PanelData;
use crate::domain::{ParamLabel, ResultsTable, SpecRow, Specification};
use crate::error::AppError;

/// Axis and bookkeeping columns leading every results row.
pub const KEY_COLUMNS: [&str; 10] = [
    "index",
    "outcome",
    "predictor",
    "waves",
    "controls",
    "estimator",
    "imputation",
    "gender",
    "status",
    "error",
];

/// Per-label column suffixes, in slot order.
pub const ESTIMATE_SUFFIXES: [&str; 7] = [
    "est",
    "ci_lower",
    "ci_upper",
    "std",
    "std_ci_lower",
    "std_ci_upper",
    "p",
];

pub const FIT_COLUMNS: [&str; 5] = ["n", "param_ratio", "cfi", "rmsea", "srmr"];

/// Full results header.
pub fn results_header() -> Vec<String> {
    let mut out: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
    for label in ParamLabel::ALL {
        for suffix in ESTIMATE_SUFFIXES {
            out.push(format!("{label}_{suffix}"));
        }
    }
    out.extend(FIT_COLUMNS.iter().map(|c| c.to_string()));
    out
}

/// Persist the results table (atomic replace).
pub fn write_results_csv(path: &Path, table: &ResultsTable) -> Result<(), AppError> {
    write_atomic(path, |wtr| {
        wtr.write_record(results_header())?;
        for row in &table.rows {
            wtr.write_record(results_record(row))?;
        }
        Ok(())
    })
}

fn results_record(row: &SpecRow) -> Vec<String> {
    let mut out = axis_cells(&row.spec);
    out.push(row.status().as_str().to_string());
    out.push(row.error().unwrap_or_default().to_string());

    match row.result() {
        Some(result) => {
            for label in ParamLabel::ALL {
                match result.estimate(label) {
                    Some(e) => out.extend(
                        [
                            e.estimate,
                            e.ci_lower,
                            e.ci_upper,
                            e.std_estimate,
                            e.std_ci_lower,
                            e.std_ci_upper,
                            e.p_value,
                        ]
                        .iter()
                        .map(|v| v.to_string()),
                    ),
                    None => out.extend(std::iter::repeat_n(String::new(), ESTIMATE_SUFFIXES.len())),
                }
            }
            let fit = &result.fit;
            out.push(fit.sample_size.to_string());
            out.extend([fit.param_ratio, fit.cfi, fit.rmsea, fit.srmr].iter().map(|v| v.to_string()));
        }
        None => {
            let empty = ParamLabel::ALL.len() * ESTIMATE_SUFFIXES.len() + FIT_COLUMNS.len();
            out.extend(std::iter::repeat_n(String::new(), empty));
        }
    }
    out
}

fn axis_cells(spec: &Specification) -> Vec<String> {
    vec![
        spec.index.to_string(),
        spec.outcome.as_str().to_string(),
        spec.predictor.as_str().to_string(),
        spec.waves.to_string(),
        spec.controls.label(),
        spec.estimator.as_str().to_string(),
        spec.imputation.as_str().to_string(),
        spec.gender.as_str().to_string(),
    ]
}

/// Write the grid (index plus axis values) without any results.
pub fn write_grid_csv(path: &Path, grid: &[Specification]) -> Result<(), AppError> {
    write_atomic(path, |wtr| {
        wtr.write_record(&KEY_COLUMNS[..8])?;
        for spec in grid {
            wtr.write_record(axis_cells(spec))?;
        }
        Ok(())
    })
}

/// Write a panel with empty cells for missing values.
pub fn write_panel_csv(path: &Path, data: &PanelData) -> Result<(), AppError> {
    write_atomic(path, |wtr| {
        wtr.write_record(data.columns())?;
        for row in data.rows() {
            wtr.write_record(row.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()))?;
        }
        Ok(())
    })
}

fn write_atomic<F>(path: &Path, write: F) -> Result<(), AppError>
where
    F: FnOnce(&mut csv::Writer<&mut NamedTempFile>) -> Result<(), csv::Error>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        AppError::new(
            4,
            format!("Failed to create temp file in '{}': {e}", dir.display()),
        )
    })?;

    {
        let mut wtr = csv::Writer::from_writer(&mut tmp);
        write(&mut wtr)
            .map_err(|e| AppError::new(4, format!("Failed to write '{}': {e}", path.display())))?;
        wtr.flush()
            .map_err(|e| AppError::new(4, format!("Failed to write '{}': {e}", path.display())))?;
    }

    tmp.persist(path).map_err(|e| {
        AppError::new(
            4,
            format!("Failed to move results into '{}': {e}", path.display()),
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn header_has_fixed_width() {
        let header = results_header();
        assert_eq!(header.len(), 10 + 7 * 7 + 5);
        assert_eq!(header[10], "ar_sat_est");
        assert_eq!(header[16], "ar_sat_p");
        assert_eq!(header[58], "cov_wn_p");
        assert_eq!(header.last().map(String::as_str), Some("srmr"));
    }

    #[test]
    fn panel_export_leaves_missing_cells_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.csv");
        let panel = PanelData::new(
            vec!["waves".into(), "male".into()],
            vec![vec![Some(3.0), None], vec![Some(5.0), Some(1.0)]],
        )
        .unwrap();
        write_panel_csv(&path, &panel).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "waves,male\n3,\n5,1\n");
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "stale").unwrap();
        write_results_csv(&path, &ResultsTable::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("index,outcome,predictor,waves,controls"));
        assert_eq!(text.lines().count(), 1);
        // No temp files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
