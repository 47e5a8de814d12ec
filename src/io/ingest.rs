//! Wide-format panel CSV ingest.
//!
//! This module is responsible for turning a panel CSV (one row per subject)
//! into a `PanelData` the fit layer can slice.
//!
//! Design goals:
//! - **Strict schema**: `waves` and `male` are required (exit code 2)
//! - **Strict cells where they matter**: a malformed cell in a column the grid
//!   fits is fatal and reported with its line; other columns read as missing
//! - **Tolerant missingness**: empty, `NA` and `.` cells are missing values
//! - **Separation of concerns**: no model or fitting logic here

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::data::{Datasets, PanelData};
use crate::domain::{MALE_COLUMN, Specification, WAVES_COLUMN};
use crate::error::AppError;
use crate::models::build_for;

const MISSING_TOKENS: [&str; 3] = ["", "na", "."];

/// Load a panel CSV.
///
/// Cells of `strict` columns (plus `waves` and `male`) must be numeric,
/// `TRUE`/`FALSE` or missing. Unparsable cells anywhere else become missing.
pub fn load_panel(path: &Path, strict: &BTreeSet<String>) -> Result<PanelData, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns = normalized_headers(&headers);
    let header_map: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    for required in [WAVES_COLUMN, MALE_COLUMN] {
        if !header_map.contains_key(required) {
            return Err(AppError::new(
                2,
                format!(
                    "Missing required column `{required}` in '{}'.",
                    path.display()
                ),
            ));
        }
    }

    let strict_mask: Vec<bool> = columns
        .iter()
        .map(|c| c == WAVES_COLUMN || c == MALE_COLUMN || strict.contains(c))
        .collect();
    let mut ignored: BTreeMap<String, usize> = BTreeMap::new();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; CSV lines are 1-based.
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;
        rows.push(parse_record(&record, &columns, &strict_mask, line, &mut ignored)?);
    }

    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No data rows in '{}'.", path.display()),
        ));
    }

    for (column, cells) in &ignored {
        debug!(
            path = %path.display(),
            column = %column,
            cells,
            "non-numeric cells in an unfitted column read as missing"
        );
    }
    debug!(
        path = %path.display(),
        rows = rows.len(),
        columns = columns.len(),
        "panel loaded"
    );
    PanelData::new(columns, rows)
}

/// Load the original and imputed panels of a run.
pub fn load_datasets(
    original: &Path,
    imputed: &Path,
    strict: &BTreeSet<String>,
) -> Result<Datasets, AppError> {
    Ok(Datasets {
        original: load_panel(original, strict)?,
        imputed: load_panel(imputed, strict)?,
    })
}

/// Every column some buildable specification of the grid fits, plus `waves` and `male`.
pub fn grid_columns(grid: &[Specification]) -> BTreeSet<String> {
    let mut out: BTreeSet<String> = BTreeSet::new();
    out.insert(WAVES_COLUMN.to_string());
    out.insert(MALE_COLUMN.to_string());
    for spec in grid {
        // Unbuildable specifications fail on their own row during the batch.
        if let Ok(model) = build_for(spec) {
            out.extend(model.required_columns());
        }
    }
    out
}

/// Warn about columns grid specifications need but their dataset lacks.
///
/// Those specifications fail individually during the batch; the return value
/// is how many of them there are.
pub fn report_missing_columns(datasets: &Datasets, grid: &[Specification]) -> usize {
    let mut affected = 0usize;
    let mut missing: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
    for spec in grid {
        let Ok(model) = build_for(spec) else {
            continue;
        };
        let data = datasets.get(spec.imputation);
        let absent: Vec<String> = model
            .required_columns()
            .into_iter()
            .filter(|c| !data.has_column(c))
            .collect();
        if !absent.is_empty() {
            affected += 1;
            missing
                .entry(spec.imputation.as_str())
                .or_default()
                .extend(absent);
        }
    }

    for (dataset, columns) in &missing {
        warn!(
            dataset = *dataset,
            columns = %columns.iter().cloned().collect::<Vec<_>>().join(", "),
            "dataset lacks columns some specifications need; those specifications will fail"
        );
    }
    affected
}

fn normalized_headers(headers: &StringRecord) -> Vec<String> {
    headers.iter().map(normalize_header_name).collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_record(
    record: &StringRecord,
    columns: &[String],
    strict: &[bool],
    line: usize,
    ignored: &mut BTreeMap<String, usize>,
) -> Result<Vec<Option<f64>>, AppError> {
    if record.len() != columns.len() {
        return Err(AppError::new(
            2,
            format!(
                "Line {line} has {} fields but the header has {}.",
                record.len(),
                columns.len()
            ),
        ));
    }
    let mut out = Vec::with_capacity(columns.len());
    for ((raw, name), &is_strict) in record.iter().zip(columns).zip(strict) {
        match parse_cell(raw) {
            Ok(v) => out.push(v),
            Err(msg) if is_strict => {
                return Err(AppError::new(
                    2,
                    format!("Line {line}, column `{name}`: {msg}"),
                ));
            }
            Err(_) => {
                *ignored.entry(name.clone()).or_default() += 1;
                out.push(None);
            }
        }
    }
    Ok(out)
}

fn parse_cell(raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    if MISSING_TOKENS.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        return Ok(None);
    }
    // Logical flags as R and spreadsheets write them.
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Some(1.0));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Some(0.0));
    }
    let v: f64 = raw
        .parse()
        .map_err(|_| format!("invalid number `{raw}`"))?;
    if !v.is_finite() {
        return Err(format!("non-finite value `{raw}`"));
    }
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::domain::{ControlSet, Outcome, WaveCount};
    use crate::fit::{GridAxes, build_grid};

    fn strict(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_with_bom_and_mixed_case_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "panel.csv",
            "\u{feff}PIDP, Waves ,Male,A_SM\n1,5,1,2\n2,3,0,NA\n3,4,.,\n",
        );
        let data = load_panel(&path, &strict(&["a_sm"])).unwrap();
        assert_eq!(data.columns(), &["pidp", "waves", "male", "a_sm"]);
        assert_eq!(data.n_rows(), 3);
        let sm: Vec<Option<f64>> = data.column_values("a_sm").unwrap().collect();
        assert_eq!(sm, vec![Some(2.0), None, None]);
        let male: Vec<Option<f64>> = data.column_values("male").unwrap().collect();
        assert_eq!(male, vec![Some(1.0), Some(0.0), None]);
    }

    #[test]
    fn malformed_cell_reports_line_and_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.csv", "waves,male,a_sm\n3,1,2\n4,0,lots\n");
        let err = load_panel(&path, &strict(&["a_sm"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Line 3"));
        assert!(err.message().contains("a_sm"));
    }

    #[test]
    fn missing_required_column_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "nowaves.csv", "male,a_sm\n1,2\n");
        let err = load_panel(&path, &strict(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("waves"));
    }

    #[test]
    fn header_only_file_has_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty.csv", "waves,male\n");
        assert_eq!(load_panel(&path, &strict(&[])).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn ragged_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "ragged.csv", "waves,male,a_sm\n3,1\n");
        let err = load_panel(&path, &strict(&[])).unwrap_err();
        assert!(err.message().contains("Line 2"));
    }

    #[test]
    fn logical_flags_and_text_ids_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "logical.csv",
            "pidp,waves,male,a_sm\nAB1,5,TRUE,2\nAB2,3,false,4\nAB3,4,NA,1\n",
        );
        let data = load_panel(&path, &strict(&["a_sm"])).unwrap();
        let male: Vec<Option<f64>> = data.column_values("male").unwrap().collect();
        assert_eq!(male, vec![Some(1.0), Some(0.0), None]);
        let ids: Vec<Option<f64>> = data.column_values("pidp").unwrap().collect();
        assert_eq!(ids, vec![None, None, None]);
    }

    #[test]
    fn malformed_cell_outside_the_fitted_columns_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.csv", "waves,male,a_sm,notes\n3,1,2,late\n4,0,3,7\n");
        let data = load_panel(&path, &strict(&["a_sm"])).unwrap();
        let notes: Vec<Option<f64>> = data.column_values("notes").unwrap().collect();
        assert_eq!(notes, vec![None, Some(7.0)]);

        // `male` stays strict whatever the grid needs.
        let path = write(&dir, "male.csv", "waves,male\n3,yes\n");
        let err = load_panel(&path, &strict(&[])).unwrap_err();
        assert!(err.message().contains("column `male`"));
    }

    #[test]
    fn grid_columns_cover_indicators_controls_and_filters() {
        let grid = build_grid(&GridAxes {
            outcomes: vec![Outcome::Life],
            waves: vec![WaveCount::new(3).unwrap()],
            control_sets: vec![ControlSet::single(crate::domain::Control::Age)],
            ..GridAxes::default()
        })
        .unwrap();
        let columns = grid_columns(&grid);
        for name in ["waves", "male", "a_life", "c_life", "a_sm", "c_sm", "age"] {
            assert!(columns.contains(name), "missing {name}");
        }
        assert!(!columns.contains("d_life"));
        assert!(!columns.contains("inc"));
    }

    #[test]
    fn missing_columns_are_counted_per_specification() {
        let columns: Vec<String> = ["waves", "male", "a_life", "b_life", "c_life", "a_sm", "b_sm"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let short = PanelData::new(columns, vec![vec![Some(1.0); 7]]).unwrap();
        let full = PanelData::new(
            ["waves", "male", "a_life", "b_life", "c_life", "a_sm", "b_sm", "c_sm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![vec![Some(1.0); 8]],
        )
        .unwrap();
        let datasets = Datasets {
            original: short,
            imputed: full,
        };
        let grid = build_grid(&GridAxes {
            outcomes: vec![Outcome::Life],
            waves: vec![WaveCount::new(3).unwrap()],
            control_sets: vec![ControlSet::none()],
            ..GridAxes::default()
        })
        .unwrap();
        // Only the original-panel rows lack `c_sm`: 2 estimators x 3 genders.
        assert_eq!(report_missing_columns(&datasets, &grid), 6);
    }
}
