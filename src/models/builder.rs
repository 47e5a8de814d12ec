//! Random-intercept cross-lagged panel model construction.
//!
//! `build` is a pure function of the variable choices. For a W-wave panel it
//! emits, in order:
//!
//! 1. one random intercept per variable, unit-loaded on every wave's indicator
//! 2. one wave latent per variable per wave, unit-loaded on that wave's indicator
//! 3. zero residual variance on every indicator
//! 4. zero covariance between each intercept and every wave latent
//! 5. the labelled intercept covariance
//! 6. the wave-1 concurrent covariance and the pooled wave 2..W covariance
//! 7. lag-1 autoregressive and cross-lagged paths under shared labels
//! 8. indicator-on-controls regressions (omitted entirely without controls)

use crate::domain::{
    wave_column, Control, ControlSet, Outcome, ParamLabel, Predictor, Specification, WaveCount,
};
use crate::error::SpecError;
use crate::models::syntax::{ModelDefinition, Statement, Term};

/// The variable choices a model definition depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub outcome: Outcome,
    pub predictor: Predictor,
    pub waves: WaveCount,
    pub controls: ControlSet,
}

impl From<&Specification> for ModelChoice {
    fn from(spec: &Specification) -> Self {
        Self {
            outcome: spec.outcome,
            predictor: spec.predictor,
            waves: spec.waves,
            controls: spec.controls.clone(),
        }
    }
}

/// Names for one measured variable across waves.
struct Series {
    intercept: String,
    latents: Vec<String>,
    indicators: Vec<String>,
}

impl Series {
    fn new(stem: &str, waves: usize) -> Self {
        Self {
            intercept: format!("ri_{stem}"),
            latents: (1..=waves).map(|t| format!("w{stem}{t}")).collect(),
            indicators: (1..=waves).map(|t| wave_column(stem, t)).collect(),
        }
    }
}

/// Build the model definition for one (outcome, predictor, waves, controls) choice.
pub fn build(
    outcome: Outcome,
    predictor: Predictor,
    waves: WaveCount,
    controls: &ControlSet,
) -> Result<ModelDefinition, SpecError> {
    build_model(&ModelChoice {
        outcome,
        predictor,
        waves,
        controls: controls.clone(),
    })
}

pub fn build_model(choice: &ModelChoice) -> Result<ModelDefinition, SpecError> {
    let w = choice.waves.get();
    let sat = Series::new(choice.outcome.stem(), w);
    let pred = Series::new(choice.predictor.stem(), w);
    let controls: Vec<String> = choice
        .controls
        .controls()
        .iter()
        .map(|c: &Control| c.column().to_string())
        .collect();

    let latents: Vec<String> = [&sat, &pred]
        .iter()
        .flat_map(|s| std::iter::once(s.intercept.clone()).chain(s.latents.iter().cloned()))
        .collect();
    let indicators: Vec<String> = sat
        .indicators
        .iter()
        .chain(pred.indicators.iter())
        .cloned()
        .collect();

    let mut model = ModelDefinition::new(latents, indicators, controls.clone());

    // Between-person trait: unit loadings on every wave.
    for s in [&sat, &pred] {
        model.push(Statement::Loading {
            latent: s.intercept.clone(),
            indicators: s.indicators.iter().map(|i| Term::fixed(1.0, i)).collect(),
        });
    }

    // Within-person wave latents.
    for s in [&sat, &pred] {
        for (latent, indicator) in s.latents.iter().zip(&s.indicators) {
            model.push(Statement::Loading {
                latent: latent.clone(),
                indicators: vec![Term::fixed(1.0, indicator)],
            });
        }
    }

    for s in [&sat, &pred] {
        for indicator in &s.indicators {
            model.push(Statement::Variance {
                variable: indicator.clone(),
                value: 0.0,
            });
        }
    }

    // Intercepts are isolated from the within-person dynamics of both variables.
    for s in [&sat, &pred] {
        for latent in sat.latents.iter().chain(&pred.latents) {
            model.push(Statement::Covariance {
                left: s.intercept.clone(),
                right: Term::fixed(0.0, latent),
            });
        }
    }

    model.push(Statement::Covariance {
        left: sat.intercept.clone(),
        right: Term::labelled(ParamLabel::InterceptCorrelation, &pred.intercept),
    });

    model.push(Statement::Covariance {
        left: sat.latents[0].clone(),
        right: Term::labelled(ParamLabel::ConcurrentFirst, &pred.latents[0]),
    });
    model.push(Statement::PooledCovariance {
        label: ParamLabel::ConcurrentLater,
        pairs: sat
            .latents
            .iter()
            .zip(&pred.latents)
            .skip(1)
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect(),
    });

    for t in 1..w {
        model.push(Statement::Regression {
            dependent: sat.latents[t].clone(),
            predictors: vec![
                Term::labelled(ParamLabel::SatAutoregressive, &sat.latents[t - 1]),
                Term::labelled(ParamLabel::PredToSat, &pred.latents[t - 1]),
            ],
        });
        model.push(Statement::Regression {
            dependent: pred.latents[t].clone(),
            predictors: vec![
                Term::labelled(ParamLabel::PredAutoregressive, &pred.latents[t - 1]),
                Term::labelled(ParamLabel::SatToPred, &sat.latents[t - 1]),
            ],
        });
    }

    if !controls.is_empty() {
        for indicator in sat.indicators.iter().chain(&pred.indicators) {
            model.push(Statement::Regression {
                dependent: indicator.clone(),
                predictors: controls.iter().map(|c| Term::free(c.as_str())).collect(),
            });
        }
    }

    model.validate()?;
    Ok(model)
}

/// Build the definition for a grid row.
pub fn build_for(spec: &Specification) -> Result<ModelDefinition, SpecError> {
    build_model(&ModelChoice::from(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::syntax::StatementKind;

    fn waves(n: u8) -> WaveCount {
        WaveCount::new(n).unwrap()
    }

    fn structural_regressions(model: &ModelDefinition, latent_prefix: &str) -> usize {
        model
            .statements()
            .iter()
            .filter(|s| s.kind() == StatementKind::Regression)
            .filter(|s| s.lhs().is_some_and(|l| l.starts_with(latent_prefix)))
            .count()
    }

    #[test]
    fn wave_latents_and_paths_scale_with_wave_count() {
        for n in 3..=5u8 {
            let w = n as usize;
            let model = build(Outcome::Life, Predictor::SocialMedia, waves(n), &ControlSet::none())
                .unwrap();

            let sat_latents = model
                .latents()
                .iter()
                .filter(|l| l.starts_with("wlife"))
                .count();
            let pred_latents = model
                .latents()
                .iter()
                .filter(|l| l.starts_with("wsm"))
                .count();
            assert_eq!(sat_latents, w);
            assert_eq!(pred_latents, w);

            // Single-indicator loadings: one per wave latent.
            let wave_loadings = model
                .statements()
                .iter()
                .filter(|s| matches!(s, Statement::Loading { latent, .. } if latent.starts_with('w')))
                .count();
            assert_eq!(wave_loadings, 2 * w);

            assert_eq!(structural_regressions(&model, "wlife"), w - 1);
            assert_eq!(structural_regressions(&model, "wsm"), w - 1);

            assert_eq!(model.count(StatementKind::PooledCovariance), 1);
            let first = model.statements().iter().find(|s| {
                s.labels().contains(&ParamLabel::ConcurrentFirst)
            });
            assert!(matches!(first, Some(Statement::Covariance { .. })));
        }
    }

    #[test]
    fn pooled_label_is_shared_across_transitions() {
        let model = build(Outcome::Family, Predictor::SocialMedia, waves(5), &ControlSet::none())
            .unwrap();
        let text = model.render();
        assert_eq!(text.matches("ar_sat*").count(), 4);
        assert_eq!(text.matches("ar_pred*").count(), 4);
        assert_eq!(text.matches("cl_pred_sat*").count(), 4);
        assert_eq!(text.matches("cl_sat_pred*").count(), 4);
        assert_eq!(text.matches("cov_wn*").count(), 4);
        assert_eq!(text.matches("cov_w1*").count(), 1);
        assert!(text.contains("wfam3 ~ ar_sat*wfam2 + cl_pred_sat*wsm2\n"));
        assert!(text.contains("wsm5 ~ ar_pred*wsm4 + cl_sat_pred*wfam4\n"));
        assert!(text.contains("wfam4 ~~ cov_wn*wsm4\n"));
    }

    #[test]
    fn empty_control_set_omits_control_block() {
        let model = build(Outcome::Mean, Predictor::SocialMedia, waves(4), &ControlSet::none())
            .unwrap();
        for c in Control::ALL {
            assert!(
                !model
                    .statements()
                    .iter()
                    .any(|s| s.references(c.column())),
                "unexpected reference to {}",
                c.column()
            );
        }
        // Only the structural regressions remain.
        assert_eq!(model.count(StatementKind::Regression), 2 * 3);
        assert!(!model.render().contains("\n\n"));
    }

    #[test]
    fn single_control_enters_every_indicator_regression() {
        for n in 3..=5u8 {
            let model = build(
                Outcome::School,
                Predictor::SocialMedia,
                waves(n),
                &ControlSet::single(Control::Income),
            )
            .unwrap();
            let referencing = model
                .statements()
                .iter()
                .filter(|s| s.kind() == StatementKind::Regression && s.references("inc"))
                .count();
            assert_eq!(referencing, 2 * n as usize);
        }
    }

    #[test]
    fn full_control_set_lists_every_control_on_each_indicator() {
        let all = ControlSet::from_controls(Control::ALL);
        let model = build(Outcome::Life, Predictor::SocialMedia, waves(3), &all).unwrap();
        let text = model.render();
        assert!(text.contains("a_life ~ age + eth + inc + emp + edu + sib + ill\n"));
        assert!(text.contains("c_sm ~ age + eth + inc + emp + edu + sib + ill\n"));
        assert_eq!(model.controls().len(), 7);
    }

    #[test]
    fn build_is_deterministic() {
        let controls = ControlSet::from_controls([Control::Age, Control::Siblings]);
        let a = build(Outcome::Friends, Predictor::SocialMedia, waves(4), &controls).unwrap();
        let b = build(Outcome::Friends, Predictor::SocialMedia, waves(4), &controls).unwrap();
        assert_eq!(a.render().as_bytes(), b.render().as_bytes());
    }

    #[test]
    fn mean_composite_three_waves_has_seven_labels() {
        let model = build(Outcome::Mean, Predictor::SocialMedia, waves(3), &ControlSet::none())
            .unwrap();
        let labels = model.labels();
        assert_eq!(labels.len(), 7);
        for label in ParamLabel::ALL {
            assert!(labels.contains(&label), "missing {label}");
        }
        let control_regressions = model
            .statements()
            .iter()
            .filter(|s| {
                matches!(s, Statement::Regression { dependent, .. } if model.indicators().contains(dependent))
            })
            .count();
        assert_eq!(control_regressions, 0);
    }

    #[test]
    fn intercepts_are_isolated_from_wave_latents() {
        let model = build(Outcome::Life, Predictor::SocialMedia, waves(3), &ControlSet::none())
            .unwrap();
        let text = model.render();
        for latent in ["wlife1", "wlife3", "wsm1", "wsm3"] {
            assert!(text.contains(&format!("ri_life ~~ 0*{latent}\n")));
            assert!(text.contains(&format!("ri_sm ~~ 0*{latent}\n")));
        }
        assert!(text.contains("ri_life ~~ cor_ri*ri_sm\n"));
        assert!(text.contains("b_sm ~~ 0*b_sm\n"));
        assert!(text.starts_with("ri_life =~ 1*a_life + 1*b_life + 1*c_life\n"));
    }

    #[test]
    fn six_waves_are_supported() {
        let model = build(Outcome::Life, Predictor::SocialMedia, waves(6), &ControlSet::none())
            .unwrap();
        assert!(model.indicators().contains(&"f_life".to_string()));
        assert_eq!(structural_regressions(&model, "wsm"), 5);
    }
}
