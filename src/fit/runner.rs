//! Data selection and solver invocation for one specification.
//!
//! Responsibilities:
//!
//! - pick the original or imputed panel
//! - apply the gender subset and the completed-waves exclusion
//! - project the columns the model needs
//! - reject slices the solver cannot fit (empty, constant indicators, rank deficiency)
//! - call the solver with the chosen estimator

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::data::{Datasets, PanelData};
use crate::domain::{Estimator, Gender, Imputation, WaveCount};
use crate::error::SpecError;
use crate::fit::solver::{FitRequest, FittedModel, SemSolver};
use crate::math::{RANK_TOLERANCE, covariance_matrix, numerical_rank};
use crate::models::ModelDefinition;

/// Options that apply to every fit in a batch.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub mean_structure: bool,
    pub ci_level: f64,
    pub timeout: Option<Duration>,
    /// Run the slice pre-checks before calling the solver.
    pub precheck: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            mean_structure: true,
            ci_level: 0.95,
            timeout: None,
            precheck: true,
        }
    }
}

/// Stateless between calls: borrows the datasets and the solver.
pub struct FitRunner<'a> {
    datasets: &'a Datasets,
    solver: &'a dyn SemSolver,
    options: FitOptions,
}

impl<'a> FitRunner<'a> {
    pub fn new(datasets: &'a Datasets, solver: &'a dyn SemSolver, options: FitOptions) -> Self {
        Self {
            datasets,
            solver,
            options,
        }
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    pub fn run(
        &self,
        model: &ModelDefinition,
        waves: WaveCount,
        imputation: Imputation,
        estimator: Estimator,
        gender: Gender,
    ) -> Result<FittedModel, SpecError> {
        let slice = self
            .datasets
            .get(imputation)
            .subset(gender, waves)?
            .select(&model.required_columns())?;

        if slice.n_rows() == 0 {
            return Err(SpecError::Fit(format!(
                "no subjects with at least {waves} completed waves in the {} {} slice",
                imputation.as_str(),
                gender.as_str()
            )));
        }

        if self.options.precheck {
            check_slice(&slice, model.indicators())?;
        }

        let ordered = if estimator.is_ordinal() {
            model.indicators().to_vec()
        } else {
            Vec::new()
        };

        debug!(
            solver = self.solver.name(),
            estimator = estimator.solver_name(),
            rows = slice.n_rows(),
            "invoking solver"
        );

        self.solver.fit(&FitRequest {
            model: &model.render(),
            data: &slice,
            estimator,
            mean_structure: self.options.mean_structure,
            ordered,
            ci_level: self.options.ci_level,
            timeout: self.options.timeout,
        })
    }
}

/// Reject slices the solver would fail on anyway, with a clearer message.
fn check_slice(slice: &PanelData, indicators: &[String]) -> Result<(), SpecError> {
    for name in indicators {
        let distinct: HashSet<u64> = slice
            .column_values(name)
            .into_iter()
            .flatten()
            .flatten()
            .map(f64::to_bits)
            .collect();
        if distinct.len() < 2 {
            return Err(SpecError::Fit(format!(
                "insufficient variation in indicator `{name}` ({} distinct observed values)",
                distinct.len()
            )));
        }
    }

    let indicator_slice = slice.select(indicators)?;
    let complete = indicator_slice.complete_rows();
    if complete.len() <= indicators.len() {
        // Too few complete cases to judge rank; leave it to the solver.
        return Ok(());
    }
    if let Some(cov) = covariance_matrix(&complete) {
        let rank = numerical_rank(&cov, RANK_TOLERANCE);
        if rank < indicators.len() {
            return Err(SpecError::Fit(format!(
                "indicator covariance is rank deficient (rank {rank} of {})",
                indicators.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::{SimulationConfig, simulate};
    use crate::domain::{ControlSet, Outcome, Predictor};
    use crate::fit::extract::tests::complete_model;
    use crate::models::build;

    /// Records what it was asked to fit and returns a complete model.
    #[derive(Default)]
    pub(crate) struct RecordingSolver {
        pub(crate) calls: Mutex<Vec<(usize, Vec<String>, String, Vec<String>)>>,
    }

    impl SemSolver for RecordingSolver {
        fn name(&self) -> &str {
            "recording"
        }

        fn fit(&self, request: &FitRequest<'_>) -> Result<FittedModel, SpecError> {
            self.calls.lock().unwrap().push((
                request.data.n_rows(),
                request.data.columns().to_vec(),
                request.estimator.solver_name().to_string(),
                request.ordered.clone(),
            ));
            Ok(complete_model())
        }
    }

    fn datasets() -> Datasets {
        simulate(&SimulationConfig {
            subjects: 200,
            seed: 11,
            ..SimulationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn slices_by_gender_waves_and_columns() {
        let data = datasets();
        let solver = RecordingSolver::default();
        let runner = FitRunner::new(&data, &solver, FitOptions::default());
        let waves = WaveCount::new(4).unwrap();
        let model = build(
            Outcome::Life,
            Predictor::SocialMedia,
            waves,
            &ControlSet::single(crate::domain::Control::Age),
        )
        .unwrap();

        runner
            .run(&model, waves, Imputation::Imputed, Estimator::ContinuousRobust, Gender::Female)
            .unwrap();

        let expected_rows = data
            .imputed
            .subset(Gender::Female, waves)
            .unwrap()
            .n_rows();
        let calls = solver.calls.lock().unwrap();
        let (rows, columns, estimator, ordered) = &calls[0];
        assert_eq!(*rows, expected_rows);
        assert_eq!(columns, &model.required_columns());
        assert!(columns.contains(&"age".to_string()));
        assert_eq!(estimator, "MLR");
        assert!(ordered.is_empty());
    }

    #[test]
    fn ordinal_estimator_declares_indicators_ordered() {
        let data = datasets();
        let solver = RecordingSolver::default();
        let runner = FitRunner::new(&data, &solver, FitOptions::default());
        let waves = WaveCount::new(3).unwrap();
        let model = build(Outcome::Mean, Predictor::SocialMedia, waves, &ControlSet::none()).unwrap();

        runner
            .run(&model, waves, Imputation::Original, Estimator::OrdinalWls, Gender::All)
            .unwrap();

        let calls = solver.calls.lock().unwrap();
        assert_eq!(calls[0].2, "WLSMV");
        assert_eq!(calls[0].3, model.indicators().to_vec());
    }

    #[test]
    fn constant_indicator_fails_before_the_solver() {
        let columns: Vec<String> = ["waves", "male", "a_sm", "b_sm"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = (0..10)
            .map(|i| vec![Some(3.0), Some(1.0), Some(2.0), Some(i as f64)])
            .collect();
        let panel = PanelData::new(columns, rows).unwrap();
        let err = check_slice(&panel, &["a_sm".to_string(), "b_sm".to_string()]).unwrap_err();
        assert!(matches!(err, SpecError::Fit(ref m) if m.contains("a_sm")));
    }

    #[test]
    fn collinear_indicators_are_rank_deficient() {
        let columns: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let rows = (0..12)
            .map(|i| {
                let x = (i % 4) as f64;
                let y = (i % 3) as f64;
                vec![Some(x), Some(y), Some(x + y)]
            })
            .collect();
        let panel = PanelData::new(columns.clone(), rows).unwrap();
        let err = check_slice(&panel, &columns).unwrap_err();
        assert!(err.to_string().contains("rank deficient"));
    }

    #[test]
    fn empty_slice_is_a_fit_error() {
        let data = datasets();
        let solver = RecordingSolver::default();
        let runner = FitRunner::new(&data, &solver, FitOptions::default());
        // No simulated subject completes six waves of a five-wave panel.
        let waves = WaveCount::new(6).unwrap();
        let model = build(Outcome::Life, Predictor::SocialMedia, waves, &ControlSet::none()).unwrap();
        let err = runner
            .run(&model, waves, Imputation::Imputed, Estimator::ContinuousRobust, Gender::All)
            .unwrap_err();
        assert!(matches!(err, SpecError::Configuration(_) | SpecError::Fit(_)));
        assert!(solver.calls.lock().unwrap().is_empty());
    }
}
