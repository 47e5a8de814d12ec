//! `SemSolver` backed by lavaan through an `Rscript` subprocess.
//!
//! Each fit gets its own scratch directory holding the data slice, the model
//! text, a small JSON request and the embedded driver script. The driver
//! writes one JSON document back; stderr is captured to a file so a failing
//! fit can report its tail.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::data::PanelData;
use crate::error::{AppError, SpecError};
use crate::fit::solver::{FitRequest, FittedModel, ParameterRow, SemSolver};

pub const DEFAULT_RSCRIPT: &str = "Rscript";
pub const RSCRIPT_ENV: &str = "SCA_RSCRIPT";
pub const TIMEOUT_ENV: &str = "SCA_TIMEOUT_SECS";

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_TAIL_LINES: usize = 12;

const DRIVER: &str = r#"args <- commandArgs(trailingOnly = TRUE)
suppressPackageStartupMessages({
  library(lavaan)
  library(jsonlite)
})
req <- fromJSON(args[[1]])
model <- paste(readLines(req$model_path), collapse = "\n")
data <- read.csv(req$data_path, na.strings = "NA")

fit_args <- list(model = model, data = data, estimator = req$estimator,
                 meanstructure = isTRUE(req$mean_structure))
if (length(req$ordered) > 0) fit_args$ordered <- unlist(req$ordered)
if (identical(req$estimator, "MLR")) fit_args$missing <- "ml"
fit <- do.call(lavaan::sem, fit_args)
if (!lavInspect(fit, "converged")) stop("model did not converge")

pe <- parameterEstimates(fit, level = req$ci_level)
pe <- pe[, intersect(c("lhs", "op", "rhs", "label", "est", "ci.lower", "ci.upper", "pvalue"), names(pe))]
names(pe)[names(pe) == "ci.lower"] <- "ci_lower"
names(pe)[names(pe) == "ci.upper"] <- "ci_upper"
pe$row_order <- seq_len(nrow(pe))

ss <- standardizedSolution(fit, level = req$ci_level)
ss <- ss[, c("lhs", "op", "rhs", "est.std", "ci.lower", "ci.upper")]
names(ss) <- c("lhs", "op", "rhs", "std", "std_ci_lower", "std_ci_upper")

merged <- merge(pe, ss, by = c("lhs", "op", "rhs"), all.x = TRUE, sort = FALSE)
merged <- merged[order(merged$row_order), ]
merged$row_order <- NULL

out <- list(
  parameters = merged,
  sample_size = lavInspect(fit, "nobs"),
  total_observations = lavInspect(fit, "ntotal"),
  free_parameters = lavInspect(fit, "npar"),
  fit_indices = as.list(fitMeasures(fit, c("cfi", "rmsea", "srmr")))
)
write_json(out, req$output_path, auto_unbox = TRUE, na = "null", digits = NA, dataframe = "rows")
"#;

#[derive(Debug, Clone)]
pub struct RscriptSolver {
    program: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct DriverRequest<'a> {
    model_path: &'a Path,
    data_path: &'a Path,
    output_path: &'a Path,
    estimator: &'a str,
    mean_structure: bool,
    ordered: &'a [String],
    ci_level: f64,
}

#[derive(Deserialize)]
struct DriverOutput {
    parameters: Vec<ParameterRow>,
    sample_size: usize,
    total_observations: usize,
    free_parameters: usize,
    #[serde(default)]
    fit_indices: BTreeMap<String, Option<f64>>,
}

impl RscriptSolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Program and timeout from `SCA_RSCRIPT` / `SCA_TIMEOUT_SECS` (`.env` honoured).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let program = std::env::var(RSCRIPT_ENV).unwrap_or_else(|_| DEFAULT_RSCRIPT.to_string());
        let timeout = match std::env::var(TIMEOUT_ENV) {
            Ok(raw) => Some(parse_timeout_secs(&raw)?),
            Err(_) => None,
        };
        Ok(Self { program, timeout })
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Timeout used when a request carries none.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl SemSolver for RscriptSolver {
    fn name(&self) -> &str {
        "lavaan"
    }

    fn fit(&self, request: &FitRequest<'_>) -> Result<FittedModel, SpecError> {
        let scratch = tempfile::Builder::new()
            .prefix("sca-fit-")
            .tempdir()
            .map_err(|e| SpecError::Fit(format!("cannot create scratch directory: {e}")))?;
        let dir = scratch.path();

        let model_path = dir.join("model.lav");
        let data_path = dir.join("data.csv");
        let output_path = dir.join("result.json");
        let request_path = dir.join("request.json");
        let script_path = dir.join("driver.R");
        let stderr_path = dir.join("stderr.log");

        let scratch_err = |e: io::Error| SpecError::Fit(format!("cannot write solver input: {e}"));
        fs::write(&model_path, request.model).map_err(scratch_err)?;
        write_slice_csv(request.data, &data_path)?;
        fs::write(&script_path, DRIVER).map_err(scratch_err)?;
        let driver_request = DriverRequest {
            model_path: &model_path,
            data_path: &data_path,
            output_path: &output_path,
            estimator: request.estimator.solver_name(),
            mean_structure: request.mean_structure,
            ordered: &request.ordered,
            ci_level: request.ci_level,
        };
        let body = serde_json::to_vec_pretty(&driver_request)
            .map_err(|e| SpecError::Fit(format!("cannot encode solver request: {e}")))?;
        fs::write(&request_path, body).map_err(scratch_err)?;

        let stderr = File::create(&stderr_path).map_err(scratch_err)?;
        let mut child = Command::new(&self.program)
            .arg(&script_path)
            .arg(&request_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| SpecError::Fit(format!("cannot start `{}`: {e}", self.program)))?;

        let timeout = request.timeout.or(self.timeout);
        let status = wait_with_timeout(&mut child, timeout)
            .map_err(|e| SpecError::Fit(format!("solver wait failed: {e}")))?;
        let Some(status) = status else {
            return Err(SpecError::Fit(format!(
                "solver timed out after {}s",
                timeout.map(|t| t.as_secs_f64()).unwrap_or_default()
            )));
        };

        if !status.success() {
            let log = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(SpecError::Fit(format!(
                "solver exited with {status}: {}",
                stderr_tail(&log, STDERR_TAIL_LINES)
            )));
        }

        let raw = fs::read_to_string(&output_path)
            .map_err(|e| SpecError::Extraction(format!("solver wrote no result: {e}")))?;
        parse_output(&raw)
    }
}

/// Wait for the child, killing it once `timeout` elapses. `Ok(None)` means it timed out.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Write the slice as CSV with `NA` for missing cells.
fn write_slice_csv(data: &PanelData, path: &Path) -> Result<(), SpecError> {
    let err = |e: csv::Error| SpecError::Fit(format!("cannot write data slice: {e}"));
    let mut wtr = csv::Writer::from_path(path).map_err(err)?;
    wtr.write_record(data.columns()).map_err(err)?;
    for row in data.rows() {
        wtr.write_record(row.iter().map(|cell| match cell {
            Some(v) => v.to_string(),
            None => "NA".to_string(),
        }))
        .map_err(err)?;
    }
    wtr.flush()
        .map_err(|e| SpecError::Fit(format!("cannot write data slice: {e}")))
}

fn parse_output(raw: &str) -> Result<FittedModel, SpecError> {
    let out: DriverOutput = serde_json::from_str(raw)
        .map_err(|e| SpecError::Extraction(format!("unreadable solver output: {e}")))?;
    Ok(FittedModel::new(
        out.parameters,
        out.sample_size,
        out.total_observations,
        out.free_parameters,
        out.fit_indices,
    ))
}

fn stderr_tail(log: &str, lines: usize) -> String {
    let kept: Vec<&str> = log
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    if kept.is_empty() {
        return "(no stderr output)".to_string();
    }
    kept[kept.len().saturating_sub(lines)..].join(" | ")
}

pub fn parse_timeout_secs(raw: &str) -> Result<Duration, AppError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::new(2, format!("Invalid timeout `{raw}` (expected seconds).")))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(AppError::new(2, format!("Timeout must be > 0 seconds (got {raw}).")));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Estimator;

    fn slice() -> PanelData {
        PanelData::new(
            vec!["a_life".into(), "a_sm".into()],
            vec![vec![Some(3.0), None], vec![Some(4.5), Some(2.0)]],
        )
        .unwrap()
    }

    fn request<'a>(data: &'a PanelData, timeout: Option<Duration>) -> FitRequest<'a> {
        FitRequest {
            model: "ri_life =~ 1*a_life\n",
            data,
            estimator: Estimator::ContinuousRobust,
            mean_structure: true,
            ordered: Vec::new(),
            ci_level: 0.95,
            timeout,
        }
    }

    #[test]
    fn slice_csv_marks_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_slice_csv(&slice(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a_life,a_sm\n3,NA\n4.5,2\n");
    }

    #[test]
    fn parses_driver_output_with_nulls_and_omitted_cells() {
        let raw = r#"{
            "parameters": [
                {"lhs": "wlife2", "op": "~", "rhs": "wlife1", "label": "ar_sat",
                 "est": 0.31, "ci_lower": 0.2, "ci_upper": 0.42, "pvalue": 0.001,
                 "std": 0.29, "std_ci_lower": 0.18, "std_ci_upper": 0.4},
                {"lhs": "a_life", "op": "~~", "rhs": "a_life", "label": "", "est": 0, "pvalue": null}
            ],
            "sample_size": 812,
            "total_observations": 900,
            "free_parameters": 30,
            "fit_indices": {"cfi": 0.97, "rmsea": 0.05, "srmr": null}
        }"#;
        let fitted = parse_output(raw).unwrap();
        assert_eq!(fitted.parameters().len(), 2);
        assert_eq!(fitted.parameters()[0].label, "ar_sat");
        assert_eq!(fitted.parameters()[1].pvalue, None);
        assert_eq!(fitted.parameters()[1].std, None);
        assert_eq!(fitted.sample_size(), 812);
        assert_eq!(fitted.free_parameter_count(), 30);
        assert_eq!(fitted.fit_index("cfi"), Some(0.97));
        assert_eq!(fitted.fit_index("srmr"), None);
    }

    #[test]
    fn garbage_output_is_an_extraction_error() {
        assert!(matches!(
            parse_output("Error in sem(): oops"),
            Err(SpecError::Extraction(_))
        ));
    }

    #[test]
    fn missing_program_is_a_fit_error() {
        let data = slice();
        let solver = RscriptSolver::new("sca-test-no-such-rscript-binary");
        let err = solver.fit(&request(&data, None)).unwrap_err();
        assert!(matches!(err, SpecError::Fit(ref m) if m.contains("cannot start")));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_reports_stderr_tail() {
        // `sh` rejects the R driver as a shell script and exits non-zero.
        let data = slice();
        let solver = RscriptSolver::new("sh");
        let err = solver.fit(&request(&data, Some(Duration::from_secs(10)))).unwrap_err();
        assert!(matches!(err, SpecError::Fit(ref m) if m.contains("solver exited")));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let started = Instant::now();
        let status = wait_with_timeout(&mut child, Some(Duration::from_millis(100))).unwrap();
        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let log = "one\n\ntwo\nthree\n";
        assert_eq!(stderr_tail(log, 2), "two | three");
        assert_eq!(stderr_tail("", 2), "(no stderr output)");
    }

    #[test]
    fn timeout_must_be_positive_seconds() {
        assert_eq!(parse_timeout_secs("2.5").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_timeout_secs("0").unwrap_err().exit_code(), 2);
        assert_eq!(parse_timeout_secs("soon").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn builder_overrides_program_and_timeout() {
        let solver = RscriptSolver::new(DEFAULT_RSCRIPT)
            .with_program("/opt/R/bin/Rscript")
            .with_timeout(Some(Duration::from_secs(30)));
        assert_eq!(solver.program(), "/opt/R/bin/Rscript");
        assert_eq!(solver.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(solver.name(), "lavaan");
    }
}
