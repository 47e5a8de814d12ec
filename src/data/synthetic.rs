//! Synthetic panel generation from a random-intercept cross-lagged process.
//!
//! Produces an original/imputed pair with the same wide schema the engine
//! ingests, so a batch can be exercised end to end without survey files.
//! The imputed panel is complete; the original panel blanks every wave after
//! a subject's dropout plus random item non-response.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::panel::{Datasets, PanelData};
use crate::domain::{
    wave_column, Control, Outcome, Predictor, MALE_COLUMN, MAX_WAVES, MIN_WAVES, WAVES_COLUMN,
};
use crate::error::AppError;

/// Subject identifier column written by the generator.
pub const ID_COLUMN: &str = "pidp";

/// Lag-1 autoregressive effect of the outcome and predictor within person.
const AR_SAT: f64 = 0.3;
const AR_PRED: f64 = 0.4;
/// Lag-1 cross-lagged effects (predictor -> outcome, outcome -> predictor).
const CL_PRED_SAT: f64 = -0.05;
const CL_SAT_PRED: f64 = -0.05;
/// Correlation of the two random intercepts.
const RI_CORRELATION: f64 = -0.2;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub subjects: usize,
    /// Number of wave columns to generate.
    pub waves: usize,
    pub seed: u64,
    /// Per-cell probability of item non-response in the original panel.
    pub missing_rate: f64,
    /// Probability a subject completes every wave.
    pub completion_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            subjects: 1000,
            waves: 5,
            seed: 42,
            missing_rate: 0.05,
            completion_rate: 0.6,
        }
    }
}

/// Domain outcomes that are drawn directly (the mean composite is derived).
const DOMAINS: [Outcome; 6] = [
    Outcome::SchoolWork,
    Outcome::Appearance,
    Outcome::Family,
    Outcome::Friends,
    Outcome::School,
    Outcome::Life,
];

pub fn simulate(config: &SimulationConfig) -> Result<Datasets, AppError> {
    if config.subjects == 0 {
        return Err(AppError::new(2, "Subject count must be > 0."));
    }
    if !(MIN_WAVES as usize..=MAX_WAVES as usize).contains(&config.waves) {
        return Err(AppError::new(
            2,
            format!("Simulated waves must be in {MIN_WAVES}..={MAX_WAVES}."),
        ));
    }
    if !(0.0..1.0).contains(&config.missing_rate) {
        return Err(AppError::new(2, "Missing rate must be in [0, 1)."));
    }
    if !(0.0..=1.0).contains(&config.completion_rate) {
        return Err(AppError::new(2, "Completion rate must be in [0, 1]."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let std_normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let innovation = Normal::new(0.0, 0.8)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let income = Normal::new(7.5, 0.6)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let columns = columns(config.waves);
    let n_cols = columns.len();
    let w = config.waves;

    let mut imputed_rows = Vec::with_capacity(config.subjects);
    let mut original_rows = Vec::with_capacity(config.subjects);

    for subject in 0..config.subjects {
        let completed = if rng.gen_bool(config.completion_rate) {
            w
        } else {
            rng.gen_range(1..=w)
        };
        let male = if rng.gen_bool(0.5) { 1.0 } else { 0.0 };

        let mut controls = Vec::with_capacity(Control::ALL.len());
        for c in Control::ALL {
            let v = match c {
                Control::Age => rng.gen_range(10..=15) as f64,
                Control::Ethnicity => bernoulli(&mut rng, 0.2),
                Control::Income => income.sample(&mut rng),
                Control::Employment => bernoulli(&mut rng, 0.8),
                Control::Education => rng.gen_range(1..=5) as f64,
                Control::Siblings => rng.gen_range(0..=4) as f64,
                Control::Illness => bernoulli(&mut rng, 0.1),
            };
            controls.push(v);
        }

        // Predictor process shared by every outcome domain.
        let ri_pred = 0.7 * std_normal.sample(&mut rng);
        let mut w_pred = vec![0.0; w];
        w_pred[0] = std_normal.sample(&mut rng);

        // Outcome processes, one per domain.
        let mut w_sat = vec![vec![0.0; w]; DOMAINS.len()];
        let mut ri_sat = vec![0.0; DOMAINS.len()];
        for d in 0..DOMAINS.len() {
            ri_sat[d] = 0.8
                * (RI_CORRELATION * ri_pred / 0.7
                    + (1.0 - RI_CORRELATION * RI_CORRELATION).sqrt() * std_normal.sample(&mut rng));
            w_sat[d][0] = -0.1 * w_pred[0] + std_normal.sample(&mut rng);
        }
        for t in 1..w {
            // Cross-lag on the mean of the domain states keeps the predictor process single.
            let sat_prev = w_sat.iter().map(|s| s[t - 1]).sum::<f64>() / DOMAINS.len() as f64;
            for s in w_sat.iter_mut() {
                s[t] = AR_SAT * s[t - 1] + CL_PRED_SAT * w_pred[t - 1] + innovation.sample(&mut rng);
            }
            w_pred[t] = AR_PRED * w_pred[t - 1] + CL_SAT_PRED * sat_prev + innovation.sample(&mut rng);
        }

        let age_shift = 0.1 * (controls[0] - 12.5);
        let mut imputed = Vec::with_capacity(n_cols);
        imputed.push(Some(subject as f64 + 1.0));
        imputed.push(Some(completed as f64));
        imputed.push(Some(male));
        imputed.extend(controls.iter().map(|v| Some(*v)));

        for t in 0..w {
            let mut domain_sum = 0.0;
            for d in 0..DOMAINS.len() {
                let v = likert(5.0 + ri_sat[d] + w_sat[d][t] - age_shift, 1.0, 7.0);
                domain_sum += v;
                imputed.push(Some(v));
            }
            imputed.push(Some(domain_sum / DOMAINS.len() as f64));
            imputed.push(Some(likert(3.0 + ri_pred + w_pred[t] + age_shift, 1.0, 5.0)));
        }

        let mut original = imputed.clone();
        let fixed = 3 + Control::ALL.len();
        for (j, cell) in original.iter_mut().enumerate().skip(3) {
            let wave = if j < fixed { None } else { Some((j - fixed) / per_wave() + 1) };
            let dropped = matches!(wave, Some(t) if t > completed);
            if dropped || rng.gen_bool(config.missing_rate) {
                *cell = None;
            }
        }

        imputed_rows.push(imputed);
        original_rows.push(original);
    }

    Ok(Datasets {
        original: PanelData::new(columns.clone(), original_rows)?,
        imputed: PanelData::new(columns, imputed_rows)?,
    })
}

/// Indicator columns per wave: six domains, the composite, the predictor.
fn per_wave() -> usize {
    DOMAINS.len() + 2
}

fn columns(waves: usize) -> Vec<String> {
    let mut out = vec![
        ID_COLUMN.to_string(),
        WAVES_COLUMN.to_string(),
        MALE_COLUMN.to_string(),
    ];
    out.extend(Control::ALL.iter().map(|c| c.column().to_string()));
    for t in 1..=waves {
        for d in DOMAINS {
            out.push(wave_column(d.stem(), t));
        }
        out.push(wave_column(Outcome::Mean.stem(), t));
        out.push(wave_column(Predictor::SocialMedia.stem(), t));
    }
    out
}

fn bernoulli(rng: &mut StdRng, p: f64) -> f64 {
    if rng.gen_bool(p) { 1.0 } else { 0.0 }
}

fn likert(latent: f64, min: f64, max: f64) -> f64 {
    latent.round().clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Gender, WaveCount};

    fn small() -> SimulationConfig {
        SimulationConfig {
            subjects: 300,
            waves: 5,
            seed: 7,
            missing_rate: 0.05,
            completion_rate: 0.6,
        }
    }

    #[test]
    fn same_seed_same_panel() {
        let a = simulate(&small()).unwrap();
        let b = simulate(&small()).unwrap();
        assert_eq!(a.original, b.original);
        assert_eq!(a.imputed, b.imputed);
    }

    #[test]
    fn imputed_panel_is_complete_and_original_is_not() {
        let data = simulate(&small()).unwrap();
        assert_eq!(data.imputed.complete_rows().len(), 300);
        assert!(data.original.complete_rows().len() < 300);
        assert_eq!(data.original.columns(), data.imputed.columns());
        assert!(data.imputed.has_column("e_sm"));
        assert!(data.imputed.has_column("c_mn"));
        assert!(!data.imputed.has_column("f_sm"));
    }

    #[test]
    fn dropout_blanks_later_waves_in_the_original() {
        let data = simulate(&small()).unwrap();
        let waves_idx = data.original.column_index(WAVES_COLUMN).unwrap();
        let e_life = data.original.column_index("e_life").unwrap();
        for row in data.original.rows() {
            if row[waves_idx].unwrap() < 5.0 {
                assert!(row[e_life].is_none());
            }
        }
    }

    #[test]
    fn indicators_stay_on_their_scales() {
        let data = simulate(&small()).unwrap();
        for v in data.imputed.column_values("b_sm").unwrap().flatten() {
            assert!((1.0..=5.0).contains(&v));
        }
        for v in data.imputed.column_values("d_fam").unwrap().flatten() {
            assert!((1.0..=7.0).contains(&v));
        }
        let full = data
            .imputed
            .subset(Gender::All, WaveCount::new(5).unwrap())
            .unwrap();
        assert!(full.n_rows() > 100);
    }

    #[test]
    fn rejects_unsupported_wave_counts() {
        let cfg = SimulationConfig {
            waves: 2,
            ..small()
        };
        assert_eq!(simulate(&cfg).unwrap_err().exit_code(), 2);
    }
}
