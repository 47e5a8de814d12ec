//! Specification grid generation.
//!
//! The grid is the Cartesian product of the analytic-decision axes, enumerated
//! with nested loops so the order is stable across runs (row index = grid
//! position, which is what resume and failure logs key on).
//!
//! Controls are not expanded to their full power set: each single control,
//! the full set and the empty set are the only variants (9 for 7 controls
//! instead of 128).

use crate::domain::{
    Control, ControlSet, Estimator, Gender, Imputation, Outcome, Predictor, Specification,
    WaveCount,
};
use crate::error::SpecError;

/// Levels of every analytic-decision axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    pub outcomes: Vec<Outcome>,
    pub predictors: Vec<Predictor>,
    pub waves: Vec<WaveCount>,
    pub control_sets: Vec<ControlSet>,
    pub estimators: Vec<Estimator>,
    pub imputations: Vec<Imputation>,
    pub genders: Vec<Gender>,
}

impl Default for GridAxes {
    fn default() -> Self {
        Self {
            outcomes: Outcome::ALL.to_vec(),
            predictors: Predictor::ALL.to_vec(),
            waves: WaveCount::default_levels(),
            control_sets: control_sets(&Control::ALL),
            estimators: Estimator::ALL.to_vec(),
            imputations: Imputation::ALL.to_vec(),
            genders: Gender::ALL.to_vec(),
        }
    }
}

impl GridAxes {
    /// Number of specifications the axes expand to.
    pub fn size(&self) -> usize {
        self.outcomes.len()
            * self.predictors.len()
            * self.waves.len()
            * self.control_sets.len()
            * self.estimators.len()
            * self.imputations.len()
            * self.genders.len()
    }
}

/// Restricted control-set variants: singletons, the full set, the empty set.
pub fn control_sets(controls: &[Control]) -> Vec<ControlSet> {
    let mut out: Vec<ControlSet> = Vec::with_capacity(controls.len() + 2);
    let mut push = |set: ControlSet| {
        if !out.contains(&set) {
            out.push(set);
        }
    };
    for &c in controls {
        push(ControlSet::single(c));
    }
    push(ControlSet::from_controls(controls.iter().copied()));
    push(ControlSet::none());
    out
}

/// Enumerate the grid in stable order.
pub fn build_grid(axes: &GridAxes) -> Result<Vec<Specification>, SpecError> {
    let empty = [
        ("outcome", axes.outcomes.is_empty()),
        ("predictor", axes.predictors.is_empty()),
        ("waves", axes.waves.is_empty()),
        ("controls", axes.control_sets.is_empty()),
        ("estimator", axes.estimators.is_empty()),
        ("imputation", axes.imputations.is_empty()),
        ("gender", axes.genders.is_empty()),
    ];
    if let Some((name, _)) = empty.iter().find(|(_, is_empty)| *is_empty) {
        return Err(SpecError::Configuration(format!(
            "axis `{name}` has no levels"
        )));
    }

    let mut out = Vec::with_capacity(axes.size());
    for &predictor in &axes.predictors {
        for &outcome in &axes.outcomes {
            for &waves in &axes.waves {
                for controls in &axes.control_sets {
                    for &estimator in &axes.estimators {
                        for &imputation in &axes.imputations {
                            for &gender in &axes.genders {
                                out.push(Specification {
                                    index: out.len(),
                                    outcome,
                                    predictor,
                                    waves,
                                    controls: controls.clone(),
                                    estimator,
                                    imputation,
                                    gender,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_grid_has_2268_specifications() {
        let axes = GridAxes::default();
        assert_eq!(axes.size(), 2268);
        let grid = build_grid(&axes).unwrap();
        assert_eq!(grid.len(), 2268);
        for (i, spec) in grid.iter().enumerate() {
            assert_eq!(spec.index, i);
        }
    }

    #[test]
    fn only_restricted_control_sets_appear() {
        let sets = control_sets(&Control::ALL);
        assert_eq!(sets.len(), 9);

        let grid = build_grid(&GridAxes::default()).unwrap();
        let seen: HashSet<ControlSet> = grid.iter().map(|s| s.controls.clone()).collect();
        assert_eq!(seen.len(), 9);
        for set in seen {
            assert!(
                set.is_empty() || set.len() == 1 || set.len() == Control::ALL.len(),
                "unexpected control set {set}"
            );
        }
    }

    #[test]
    fn grid_order_is_deterministic() {
        let a = build_grid(&GridAxes::default()).unwrap();
        let b = build_grid(&GridAxes::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].outcome, Outcome::SchoolWork);
        assert_eq!(a[0].gender, Gender::Female);
        assert_eq!(a[1].gender, Gender::Male);
        assert_eq!(a[a.len() - 1].controls, ControlSet::none());
    }

    #[test]
    fn keys_are_unique() {
        let grid = build_grid(&GridAxes::default()).unwrap();
        let keys: HashSet<String> = grid.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), grid.len());
    }

    #[test]
    fn single_control_does_not_duplicate_the_full_set() {
        let sets = control_sets(&[Control::Age]);
        assert_eq!(sets, vec![ControlSet::single(Control::Age), ControlSet::none()]);
    }

    #[test]
    fn empty_axis_is_a_configuration_error() {
        let axes = GridAxes {
            genders: Vec::new(),
            ..GridAxes::default()
        };
        assert!(matches!(build_grid(&axes), Err(SpecError::Configuration(_))));
    }
}
