//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initialises logging
//! - resolves configuration (CLI over environment over defaults)
//! - dispatches to the batch pipeline or one of the inspection commands
//! - prints reports

use std::fs::create_dir_all;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AxisArgs, Command, GridArgs, ModelArgs, RunArgs, SimulateArgs, SummaryArgs};
use crate::data::{SimulationConfig, simulate};
use crate::domain::{Control, ControlSet, ResultsTable, RunConfig, WaveCount};
use crate::error::AppError;
use crate::fit::{GridAxes, RscriptSolver, build_grid};
use crate::models::build;

pub mod batch;
pub mod pipeline;

/// Entry point for the `sca` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Grid(args) => handle_grid(args),
        Command::Model(args) => handle_model(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let axes = axes_from_args(&args.axes)?;
    let config = run_config_from_args(&args)?;
    let run = pipeline::run_batch(&config, &axes)?;

    let digest = crate::report::curve_digest(&run.table.rows);
    print!(
        "{}",
        crate::report::format_completion_summary(
            &run.table.counts(),
            run.restored,
            Some(run.elapsed),
            &digest
        )
    );
    println!("\nResults: {}", config.output_path.display());
    println!("Manifest: {}", run.manifest.display());
    if let Some(path) = &run.failure_report {
        println!("Failure report: {}", path.display());
    }
    Ok(())
}

fn handle_grid(args: GridArgs) -> Result<(), AppError> {
    let axes = axes_from_args(&args.axes)?;
    print!("{}", crate::report::format_grid_overview(&axes));
    if let Some(path) = &args.export {
        let grid = build_grid(&axes)?;
        crate::io::write_grid_csv(path, &grid)?;
        println!("Grid written to {}", path.display());
    }
    Ok(())
}

fn handle_model(args: ModelArgs) -> Result<(), AppError> {
    let waves = WaveCount::new(args.waves)?;
    let controls = if args.all_controls {
        ControlSet::from_controls(Control::ALL)
    } else {
        ControlSet::from_controls(args.controls.iter().copied())
    };
    let model = build(args.outcome, args.predictor, waves, &controls)?;
    print!("{}", model.render());
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let datasets = simulate(&SimulationConfig {
        subjects: args.subjects,
        waves: args.waves,
        seed: args.seed,
        missing_rate: args.missing_rate,
        completion_rate: args.completion_rate,
    })?;

    create_dir_all(&args.out_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "Failed to create output dir '{}': {e}",
                args.out_dir.display()
            ),
        )
    })?;
    let original = args.out_dir.join("original.csv");
    let imputed = args.out_dir.join("imputed.csv");
    crate::io::write_panel_csv(&original, &datasets.original)?;
    crate::io::write_panel_csv(&imputed, &datasets.imputed)?;

    println!(
        "Simulated {} subjects over {} waves (seed {}).",
        args.subjects, args.waves, args.seed
    );
    println!("Original: {}", original.display());
    println!("Imputed: {}", imputed.display());
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let rows = crate::io::read_results(&args.results)?;
    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("Results table '{}' has no rows.", args.results.display()),
        ));
    }
    let table = ResultsTable { rows };

    let manifest_path = crate::io::manifest_path(&args.results);
    let manifest = if manifest_path.exists() {
        Some(crate::io::read_manifest(&manifest_path)?)
    } else {
        None
    };
    let (restored, elapsed) = match &manifest {
        Some(m) => (
            m.counts.restored,
            (m.finished_at - m.started_at).to_std().ok(),
        ),
        None => (0, None),
    };

    let digest = crate::report::curve_digest(&table.rows);
    print!(
        "{}",
        crate::report::format_completion_summary(&table.counts(), restored, elapsed, &digest)
    );
    if let Some(m) = &manifest {
        println!(
            "\nSolver: {} | jobs: {} | finished: {}",
            m.solver,
            m.jobs,
            m.finished_at.to_rfc3339()
        );
    }

    if let Some(label) = args.curve {
        let curve = crate::report::ranked_curve(&table.rows, label);
        println!();
        print!(
            "{}",
            crate::report::format_curve_extremes(label, &curve, args.top)
        );
    }
    Ok(())
}

/// Grid axes from CLI filters; an empty filter keeps every level.
pub fn axes_from_args(args: &AxisArgs) -> Result<GridAxes, AppError> {
    let defaults = GridAxes::default();

    let waves = if args.waves.is_empty() {
        defaults.waves.clone()
    } else {
        dedup(&args.waves)
            .into_iter()
            .map(WaveCount::new)
            .collect::<Result<Vec<_>, _>>()?
    };
    // Filtering the default variants keeps grid order and drops duplicates.
    let control_sets = if args.control_sets.is_empty() {
        defaults.control_sets.clone()
    } else {
        defaults
            .control_sets
            .iter()
            .filter(|set| args.control_sets.contains(*set))
            .cloned()
            .collect()
    };

    Ok(GridAxes {
        outcomes: levels(&args.outcomes, defaults.outcomes),
        predictors: defaults.predictors,
        waves,
        control_sets,
        estimators: levels(&args.estimators, defaults.estimators),
        imputations: levels(&args.imputations, defaults.imputations),
        genders: levels(&args.genders, defaults.genders),
    })
}

fn levels<T: Copy + PartialEq>(chosen: &[T], all: Vec<T>) -> Vec<T> {
    if chosen.is_empty() {
        all
    } else {
        dedup(chosen)
    }
}

/// Keep first occurrences, preserving order.
fn dedup<T: Copy + PartialEq>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for &v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Resolve run settings: CLI flags, then `SCA_*` environment (`.env`), then defaults.
pub fn run_config_from_args(args: &RunArgs) -> Result<RunConfig, AppError> {
    let env = RscriptSolver::from_env()?;
    let timeout = args.timeout.or(env.timeout());
    let rscript = args
        .rscript
        .clone()
        .unwrap_or_else(|| env.program().to_string());

    Ok(RunConfig {
        data_path: args.data.clone(),
        imputed_path: args.imputed.clone(),
        output_path: args.output.clone(),
        jobs: args.jobs,
        progress_every: args.progress_every,
        timeout,
        rscript,
        mean_structure: !args.no_mean_structure,
        ci_level: args.ci_level,
        precheck: !args.no_precheck,
        resume: args.resume,
        debug_dir: args.debug_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{Gender, Outcome};

    fn axis_args(argv: &[&str]) -> AxisArgs {
        let mut full = vec!["sca", "grid"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Grid(args) => args.axes,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn empty_filters_give_the_full_grid() {
        let axes = axes_from_args(&AxisArgs::default()).unwrap();
        assert_eq!(axes, GridAxes::default());
        assert_eq!(axes.size(), 2268);
    }

    #[test]
    fn filters_restrict_axes_and_drop_duplicates() {
        let axes = axes_from_args(&axis_args(&[
            "--outcome", "life", "--outcome", "life", "--gender", "all", "--wave", "5",
        ]))
        .unwrap();
        assert_eq!(axes.outcomes, vec![Outcome::Life]);
        assert_eq!(axes.genders, vec![Gender::All]);
        assert_eq!(axes.waves, vec![WaveCount::new(5).unwrap()]);
        assert_eq!(axes.size(), 9 * 2 * 2);
    }

    #[test]
    fn control_set_filter_selects_among_the_nine_variants() {
        let axes = axes_from_args(&axis_args(&[
            "--control-set",
            "none",
            "--control-set",
            "income",
            "--control-set",
            "age",
            "--control-set",
            "income",
        ]))
        .unwrap();
        let labels: Vec<String> = axes.control_sets.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["age", "income", "none"]);
        assert_eq!(axes.size(), 7 * 3 * 3 * 2 * 2 * 3);
    }

    #[test]
    fn unsupported_wave_count_is_a_configuration_exit() {
        let err = axes_from_args(&axis_args(&["--wave", "9"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
