//! Command-line parsing for the specification curve engine.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the model-building and fitting code.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{Control, ControlSet, Estimator, Gender, Imputation, Outcome, ParamLabel, Predictor};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sca",
    version,
    about = "Specification curve analysis of random-intercept cross-lagged panel models"
)]
pub struct Cli {
    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every specification of the grid and persist the results table.
    Run(RunArgs),
    /// Print the grid's axes and size; optionally export the grid listing.
    Grid(GridArgs),
    /// Print the model definition for one variable choice.
    Model(ModelArgs),
    /// Write a synthetic original/imputed panel pair.
    Simulate(SimulateArgs),
    /// Summarise a persisted results table.
    Summary(SummaryArgs),
}

/// Axis filters shared by `run` and `grid`. Empty means every level.
#[derive(Debug, Args, Clone, Default)]
pub struct AxisArgs {
    /// Restrict outcomes (repeatable).
    #[arg(long = "outcome", value_enum)]
    pub outcomes: Vec<Outcome>,

    /// Restrict wave counts (repeatable; 3 to 6).
    #[arg(long = "wave")]
    pub waves: Vec<u8>,

    /// Restrict control-set variants (repeatable): a single control, `all` or `none`.
    #[arg(long = "control-set", value_parser = parse_control_set)]
    pub control_sets: Vec<ControlSet>,

    /// Restrict estimators (repeatable).
    #[arg(long = "estimator", value_enum)]
    pub estimators: Vec<Estimator>,

    /// Restrict datasets (repeatable).
    #[arg(long = "imputation", value_enum)]
    pub imputations: Vec<Imputation>,

    /// Restrict gender subsets (repeatable).
    #[arg(long = "gender", value_enum)]
    pub genders: Vec<Gender>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Original (non-imputed) panel CSV.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Imputed panel CSV.
    #[arg(long, value_name = "CSV")]
    pub imputed: PathBuf,

    /// Results table CSV (the manifest is written next to it).
    #[arg(short, long, value_name = "CSV", default_value = "results.csv")]
    pub output: PathBuf,

    /// Worker threads; 1 runs sequentially in grid order.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Log progress after every N completed specifications (0 disables).
    #[arg(long, default_value_t = 50)]
    pub progress_every: usize,

    /// Per-fit solver timeout in seconds (overrides SCA_TIMEOUT_SECS).
    #[arg(long, value_name = "SECS", value_parser = crate::fit::parse_timeout_secs)]
    pub timeout: Option<Duration>,

    /// Rscript executable (overrides SCA_RSCRIPT).
    #[arg(long, value_name = "PATH")]
    pub rscript: Option<String>,

    /// Fit without a mean structure.
    #[arg(long)]
    pub no_mean_structure: bool,

    /// Confidence level for parameter intervals.
    #[arg(long, default_value_t = 0.95)]
    pub ci_level: f64,

    /// Skip the data-slice checks run before each fit.
    #[arg(long)]
    pub no_precheck: bool,

    /// Keep succeeded rows of an existing results table and fit only the rest.
    #[arg(long)]
    pub resume: bool,

    /// Write a markdown report of failed specifications into this directory.
    #[arg(long, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,

    #[command(flatten)]
    pub axes: AxisArgs,
}

#[derive(Debug, Args, Clone)]
pub struct GridArgs {
    /// Export the grid (index + axis values) to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub axes: AxisArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    #[arg(long, value_enum, default_value_t = Outcome::Life)]
    pub outcome: Outcome,

    #[arg(long, value_enum, default_value_t = Predictor::SocialMedia)]
    pub predictor: Predictor,

    /// Number of waves (3 to 6).
    #[arg(long, default_value_t = 3)]
    pub waves: u8,

    /// Controls to enter (repeatable).
    #[arg(long = "control", value_enum)]
    pub controls: Vec<Control>,

    /// Enter every control.
    #[arg(long, conflicts_with = "controls")]
    pub all_controls: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output directory for `original.csv` and `imputed.csv`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    #[arg(short = 'n', long, default_value_t = 1000)]
    pub subjects: usize,

    /// Wave columns to generate (3 to 6).
    #[arg(long, default_value_t = 5)]
    pub waves: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Per-cell probability of item non-response in the original panel.
    #[arg(long, default_value_t = 0.05)]
    pub missing_rate: f64,

    /// Probability a subject completes every wave.
    #[arg(long, default_value_t = 0.6)]
    pub completion_rate: f64,
}

#[derive(Debug, Args, Clone)]
pub struct SummaryArgs {
    /// Results table CSV written by `sca run`.
    #[arg(long, value_name = "CSV", default_value = "results.csv")]
    pub results: PathBuf,

    /// Also list the extremes of one parameter's ranked curve (e.g. `cl_pred_sat`).
    #[arg(long, value_parser = parse_param_label)]
    pub curve: Option<ParamLabel>,

    /// Rows to show at each end of the ranked curve.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

fn parse_control_set(raw: &str) -> Result<ControlSet, String> {
    let variants = crate::fit::control_sets(&Control::ALL);
    variants
        .iter()
        .find(|set| set.label() == raw.trim())
        .cloned()
        .ok_or_else(|| {
            let names: Vec<String> = variants.iter().map(ControlSet::label).collect();
            format!("unknown control set `{raw}` (expected one of {})", names.join(", "))
        })
}

fn parse_param_label(raw: &str) -> Result<ParamLabel, String> {
    ParamLabel::ALL
        .into_iter()
        .find(|l| l.as_str() == raw.trim())
        .ok_or_else(|| {
            let names: Vec<&str> = ParamLabel::ALL.iter().map(|l| l.as_str()).collect();
            format!("unknown parameter `{raw}` (expected one of {})", names.join(", "))
        })
}
