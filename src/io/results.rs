//! Read a persisted results table back (resume and `summary`).

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use clap::ValueEnum;
use csv::StringRecord;

use crate::domain::{
    ControlSet, FitStats, ParamLabel, ParameterEstimate, ResultRow, SpecRow, SpecStatus,
    Specification, WaveCount,
};
use crate::error::AppError;
use crate::io::export::{ESTIMATE_SUFFIXES, FIT_COLUMNS, KEY_COLUMNS};

pub fn read_results(path: &Path) -> Result<Vec<SpecRow>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open results table '{}': {e}", path.display()),
        )
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read results header: {e}")))?
        .clone();
    let columns = Columns::new(&headers);
    for required in KEY_COLUMNS {
        if columns.index(required).is_none() {
            return Err(AppError::new(
                2,
                format!(
                    "'{}' is not a results table (missing column `{required}`).",
                    path.display()
                ),
            ));
        }
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;
        let row = parse_row(&record, &columns)
            .map_err(|msg| AppError::new(2, format!("Results line {line}: {msg}")))?;
        rows.push(row);
    }
    Ok(rows)
}

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Self {
            index: headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
                .collect(),
        }
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Result<&'r str, String> {
        self.index(name)
            .and_then(|i| record.get(i))
            .ok_or_else(|| format!("missing `{name}`"))
    }

    fn number(&self, record: &StringRecord, name: &str) -> Result<f64, String> {
        let raw = self.get(record, name)?;
        raw.parse::<f64>()
            .map_err(|_| format!("invalid `{name}` value `{raw}`"))
    }
}

fn axis<T: ValueEnum>(columns: &Columns, record: &StringRecord, name: &str) -> Result<T, String> {
    let raw = columns.get(record, name)?;
    T::from_str(raw, false).map_err(|_| format!("unknown {name} `{raw}`"))
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<SpecRow, String> {
    let raw_index = columns.get(record, "index")?;
    let index = raw_index
        .parse::<usize>()
        .map_err(|_| format!("invalid index `{raw_index}`"))?;
    let raw_waves = columns.get(record, "waves")?;
    let waves = raw_waves
        .parse::<u8>()
        .map_err(|_| format!("invalid waves `{raw_waves}`"))
        .and_then(|w| WaveCount::new(w).map_err(|e| e.to_string()))?;
    let raw_controls = columns.get(record, "controls")?;
    let controls = ControlSet::parse_label(raw_controls)
        .ok_or_else(|| format!("unknown control set `{raw_controls}`"))?;

    let spec = Specification {
        index,
        outcome: axis(columns, record, "outcome")?,
        predictor: axis(columns, record, "predictor")?,
        waves,
        controls,
        estimator: axis(columns, record, "estimator")?,
        imputation: axis(columns, record, "imputation")?,
        gender: axis(columns, record, "gender")?,
    };

    let raw_status = columns.get(record, "status")?;
    let status =
        SpecStatus::parse(raw_status).ok_or_else(|| format!("unknown status `{raw_status}`"))?;
    let error = Some(columns.get(record, "error")?)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    let result = if status == SpecStatus::Succeeded {
        Some(parse_result(record, columns)?)
    } else {
        None
    };

    Ok(SpecRow::from_parts(spec, status, result, error))
}

fn parse_result(record: &StringRecord, columns: &Columns) -> Result<ResultRow, String> {
    let mut estimates = BTreeMap::new();
    for label in ParamLabel::ALL {
        let v: Vec<f64> = ESTIMATE_SUFFIXES
            .iter()
            .map(|s| columns.number(record, &format!("{label}_{s}")))
            .collect::<Result<_, _>>()?;
        estimates.insert(
            label,
            ParameterEstimate {
                estimate: v[0],
                ci_lower: v[1],
                ci_upper: v[2],
                std_estimate: v[3],
                std_ci_lower: v[4],
                std_ci_upper: v[5],
                p_value: v[6],
            },
        );
    }

    let raw_n = columns.get(record, FIT_COLUMNS[0])?;
    let sample_size = raw_n
        .parse::<usize>()
        .map_err(|_| format!("invalid `n` value `{raw_n}`"))?;
    Ok(ResultRow {
        estimates,
        fit: FitStats {
            sample_size,
            param_ratio: columns.number(record, FIT_COLUMNS[1])?,
            cfi: columns.number(record, FIT_COLUMNS[2])?,
            rmsea: columns.number(record, FIT_COLUMNS[3])?,
            srmr: columns.number(record, FIT_COLUMNS[4])?,
        },
    })
}
