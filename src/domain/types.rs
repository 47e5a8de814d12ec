//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - enumerated into the specification grid
//! - passed immutably to workers during the batch
//! - exported to CSV/JSON and reloaded for resume or summaries

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Smallest panel length the random-intercept model is identified for.
pub const MIN_WAVES: u8 = 3;
/// Largest panel length the wave letters cover.
pub const MAX_WAVES: u8 = 6;

/// Column prefix for each wave, in wave order.
pub const WAVE_PREFIXES: [char; MAX_WAVES as usize] = ['a', 'b', 'c', 'd', 'e', 'f'];

/// Column holding the number of completed waves per subject.
pub const WAVES_COLUMN: &str = "waves";
/// Column holding the gender flag (1 = male, 0 = female).
pub const MALE_COLUMN: &str = "male";

/// Life-satisfaction outcome definition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    SchoolWork,
    Appearance,
    Family,
    Friends,
    School,
    Life,
    /// Mean of the six domains.
    Mean,
}

impl Outcome {
    pub const ALL: [Outcome; 7] = [
        Outcome::SchoolWork,
        Outcome::Appearance,
        Outcome::Family,
        Outcome::Friends,
        Outcome::School,
        Outcome::Life,
        Outcome::Mean,
    ];

    /// Column stem in the wide dataset (`a_<stem>`, `b_<stem>`, ...).
    pub fn stem(self) -> &'static str {
        match self {
            Outcome::SchoolWork => "sw",
            Outcome::Appearance => "appea",
            Outcome::Family => "fam",
            Outcome::Friends => "fri",
            Outcome::School => "sch",
            Outcome::Life => "life",
            Outcome::Mean => "mn",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::SchoolWork => "school-work",
            Outcome::Appearance => "appearance",
            Outcome::Family => "family",
            Outcome::Friends => "friends",
            Outcome::School => "school",
            Outcome::Life => "life",
            Outcome::Mean => "mean",
        }
    }
}

/// Technology-use predictor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Predictor {
    /// Hours of social-media use on a normal school day.
    SocialMedia,
}

impl Predictor {
    pub const ALL: [Predictor; 1] = [Predictor::SocialMedia];

    pub fn stem(self) -> &'static str {
        match self {
            Predictor::SocialMedia => "sm",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Predictor::SocialMedia => "social-media",
        }
    }
}

/// Time-invariant control variable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Control {
    Age,
    Ethnicity,
    Income,
    Employment,
    Education,
    Siblings,
    Illness,
}

impl Control {
    pub const ALL: [Control; 7] = [
        Control::Age,
        Control::Ethnicity,
        Control::Income,
        Control::Employment,
        Control::Education,
        Control::Siblings,
        Control::Illness,
    ];

    /// Column name in the wide dataset.
    pub fn column(self) -> &'static str {
        match self {
            Control::Age => "age",
            Control::Ethnicity => "eth",
            Control::Income => "inc",
            Control::Employment => "emp",
            Control::Education => "edu",
            Control::Siblings => "sib",
            Control::Illness => "ill",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Control::Age => "age",
            Control::Ethnicity => "ethnicity",
            Control::Income => "income",
            Control::Employment => "employment",
            Control::Education => "education",
            Control::Siblings => "siblings",
            Control::Illness => "illness",
        }
    }
}

/// A set of controls entered into the model (sorted, deduplicated).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ControlSet(Vec<Control>);

impl ControlSet {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn single(control: Control) -> Self {
        Self(vec![control])
    }

    pub fn from_controls(controls: impl IntoIterator<Item = Control>) -> Self {
        let mut v: Vec<Control> = controls.into_iter().collect();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn controls(&self) -> &[Control] {
        &self.0
    }

    pub fn contains(&self, control: Control) -> bool {
        self.0.contains(&control)
    }

    /// Stable label used in the results table and resume keys.
    ///
    /// `none` for the empty set, `all` for every known control, otherwise the
    /// control names joined with `+`.
    pub fn label(&self) -> String {
        if self.0.is_empty() {
            return "none".to_string();
        }
        if self.0.len() == Control::ALL.len() {
            return "all".to_string();
        }
        self.0.iter().map(|c| c.as_str()).collect::<Vec<_>>().join("+")
    }

    /// Inverse of [`ControlSet::label`].
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "none" => Some(Self::none()),
            "all" => Some(Self::from_controls(Control::ALL)),
            other => other
                .split('+')
                .map(|name| Control::ALL.into_iter().find(|c| c.as_str() == name))
                .collect::<Option<Vec<_>>>()
                .map(Self::from_controls),
        }
    }
}

impl fmt::Display for ControlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Number of waves entered into the model.
///
/// Only counts in `MIN_WAVES..=MAX_WAVES` can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct WaveCount(u8);

impl WaveCount {
    pub fn new(count: u8) -> Result<Self, SpecError> {
        if !(MIN_WAVES..=MAX_WAVES).contains(&count) {
            return Err(SpecError::Configuration(format!(
                "wave count {count} is outside the supported range {MIN_WAVES}..={MAX_WAVES}"
            )));
        }
        Ok(Self(count))
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// The default grid levels: 3, 4 and 5 waves.
    pub fn default_levels() -> Vec<WaveCount> {
        vec![WaveCount(3), WaveCount(4), WaveCount(5)]
    }
}

impl TryFrom<u8> for WaveCount {
    type Error = SpecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        WaveCount::new(value)
    }
}

impl From<WaveCount> for u8 {
    fn from(value: WaveCount) -> Self {
        value.0
    }
}

impl fmt::Display for WaveCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wide-format column name for a variable stem at a 1-based wave.
pub fn wave_column(stem: &str, wave: usize) -> String {
    let prefix = WAVE_PREFIXES[(wave - 1).min(WAVE_PREFIXES.len() - 1)];
    format!("{prefix}_{stem}")
}

/// Estimation method handed to the solver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Estimator {
    /// Indicators treated as ordinal; robust weighted least squares.
    OrdinalWls,
    /// Indicators treated as continuous; robust maximum likelihood.
    ContinuousRobust,
}

impl Estimator {
    pub const ALL: [Estimator; 2] = [Estimator::OrdinalWls, Estimator::ContinuousRobust];

    /// Estimator name understood by the solver.
    pub fn solver_name(self) -> &'static str {
        match self {
            Estimator::OrdinalWls => "WLSMV",
            Estimator::ContinuousRobust => "MLR",
        }
    }

    /// Whether indicators must be declared ordered.
    pub fn is_ordinal(self) -> bool {
        matches!(self, Estimator::OrdinalWls)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Estimator::OrdinalWls => "ordinal-wls",
            Estimator::ContinuousRobust => "continuous-robust",
        }
    }
}

/// Which of the two source datasets to fit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Imputation {
    Original,
    Imputed,
}

impl Imputation {
    pub const ALL: [Imputation; 2] = [Imputation::Original, Imputation::Imputed];

    pub fn as_str(self) -> &'static str {
        match self {
            Imputation::Original => "original",
            Imputation::Imputed => "imputed",
        }
    }
}

/// Gender subset of subjects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Female,
    Male,
    All,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Female, Gender::Male, Gender::All];

    /// Whether a subject with the given `male` flag belongs to this subset.
    ///
    /// Subjects with a missing flag only belong to `All`.
    pub fn admits(self, male: Option<f64>) -> bool {
        match self {
            Gender::All => true,
            Gender::Male => matches!(male, Some(v) if v != 0.0),
            Gender::Female => matches!(male, Some(v) if v == 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::All => "all",
        }
    }
}

/// One fully-determined analytic pipeline (one grid row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    /// Position in grid order.
    pub index: usize,
    pub outcome: Outcome,
    pub predictor: Predictor,
    pub waves: WaveCount,
    pub controls: ControlSet,
    pub estimator: Estimator,
    pub imputation: Imputation,
    pub gender: Gender,
}

impl Specification {
    /// Axis values joined into a stable key (used to match rows on resume).
    pub fn key(&self) -> String {
        spec_key(&[
            self.outcome.as_str(),
            self.predictor.as_str(),
            &self.waves.to_string(),
            &self.controls.label(),
            self.estimator.as_str(),
            self.imputation.as_str(),
            self.gender.as_str(),
        ])
    }
}

/// Join axis value names into a resume key.
pub fn spec_key(parts: &[&str]) -> String {
    parts.join("|")
}

/// Labelled parameters pooled by the model and extracted per specification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParamLabel {
    /// Outcome(t) on outcome(t-1).
    SatAutoregressive,
    /// Predictor(t) on predictor(t-1).
    PredAutoregressive,
    /// Outcome(t) on predictor(t-1).
    PredToSat,
    /// Predictor(t) on outcome(t-1).
    SatToPred,
    /// Covariance of the two random intercepts.
    InterceptCorrelation,
    /// Concurrent covariance of the wave latents at wave 1.
    ConcurrentFirst,
    /// Concurrent covariance of the wave latents at waves 2..W, pooled.
    ConcurrentLater,
}

impl ParamLabel {
    pub const ALL: [ParamLabel; 7] = [
        ParamLabel::SatAutoregressive,
        ParamLabel::PredAutoregressive,
        ParamLabel::PredToSat,
        ParamLabel::SatToPred,
        ParamLabel::InterceptCorrelation,
        ParamLabel::ConcurrentFirst,
        ParamLabel::ConcurrentLater,
    ];

    /// Identifier used in the model text and results columns.
    pub fn as_str(self) -> &'static str {
        match self {
            ParamLabel::SatAutoregressive => "ar_sat",
            ParamLabel::PredAutoregressive => "ar_pred",
            ParamLabel::PredToSat => "cl_pred_sat",
            ParamLabel::SatToPred => "cl_sat_pred",
            ParamLabel::InterceptCorrelation => "cor_ri",
            ParamLabel::ConcurrentFirst => "cov_w1",
            ParamLabel::ConcurrentLater => "cov_wn",
        }
    }
}

impl fmt::Display for ParamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted values for one labelled parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub std_estimate: f64,
    pub std_ci_lower: f64,
    pub std_ci_upper: f64,
    pub p_value: f64,
}

/// Global fit statistics of one fitted specification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    /// Effective sample size.
    pub sample_size: usize,
    /// Total observations divided by free parameters.
    pub param_ratio: f64,
    pub cfi: f64,
    pub rmsea: f64,
    pub srmr: f64,
}

/// Output slots of one successful specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub estimates: BTreeMap<ParamLabel, ParameterEstimate>,
    pub fit: FitStats,
}

impl ResultRow {
    pub fn estimate(&self, label: ParamLabel) -> Option<&ParameterEstimate> {
        self.estimates.get(&label)
    }
}

/// Lifecycle of a specification within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl SpecStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SpecStatus::Succeeded | SpecStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpecStatus::Pending => "pending",
            SpecStatus::Running => "running",
            SpecStatus::Succeeded => "succeeded",
            SpecStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<SpecStatus> {
        match s.trim() {
            "pending" => Some(SpecStatus::Pending),
            "running" => Some(SpecStatus::Running),
            "succeeded" => Some(SpecStatus::Succeeded),
            "failed" => Some(SpecStatus::Failed),
            _ => None,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus `.env` defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_path: PathBuf,
    pub imputed_path: PathBuf,
    pub output_path: PathBuf,

    /// Worker count; `1` runs strictly sequentially in grid order.
    pub jobs: usize,
    /// Emit a progress event after every N completed specifications.
    pub progress_every: usize,
    /// Optional per-call solver timeout.
    pub timeout: Option<Duration>,

    pub rscript: String,
    pub mean_structure: bool,
    /// Confidence level for parameter intervals.
    pub ci_level: f64,
    pub precheck: bool,

    pub resume: bool,
    pub debug_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_count_rejects_unsupported_counts() {
        assert!(WaveCount::new(2).is_err());
        assert!(WaveCount::new(7).is_err());
        assert_eq!(WaveCount::new(6).unwrap().get(), 6);
        assert!(matches!(WaveCount::new(0), Err(SpecError::Configuration(_))));
    }

    #[test]
    fn wave_columns_use_wave_letters() {
        assert_eq!(wave_column("life", 1), "a_life");
        assert_eq!(wave_column("sm", 5), "e_sm");
    }

    #[test]
    fn control_set_labels_are_stable() {
        assert_eq!(ControlSet::none().label(), "none");
        assert_eq!(ControlSet::single(Control::Income).label(), "income");
        assert_eq!(ControlSet::from_controls(Control::ALL).label(), "all");
        let pair = ControlSet::from_controls([Control::Siblings, Control::Age, Control::Age]);
        assert_eq!(pair.label(), "age+siblings");
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn control_set_labels_parse_back() {
        for set in [
            ControlSet::none(),
            ControlSet::single(Control::Illness),
            ControlSet::from_controls(Control::ALL),
            ControlSet::from_controls([Control::Siblings, Control::Age]),
        ] {
            assert_eq!(ControlSet::parse_label(&set.label()), Some(set));
        }
        assert_eq!(ControlSet::parse_label("age+height"), None);
    }

    #[test]
    fn axis_names_match_cli_values() {
        for o in Outcome::ALL {
            assert_eq!(Outcome::from_str(o.as_str(), false), Ok(o));
        }
        for c in Control::ALL {
            assert_eq!(Control::from_str(c.as_str(), false), Ok(c));
        }
        for e in Estimator::ALL {
            assert_eq!(Estimator::from_str(e.as_str(), false), Ok(e));
        }
    }

    #[test]
    fn gender_filter_excludes_missing_flags_from_subsets() {
        assert!(Gender::All.admits(None));
        assert!(!Gender::Male.admits(None));
        assert!(Gender::Male.admits(Some(1.0)));
        assert!(Gender::Female.admits(Some(0.0)));
        assert!(!Gender::Female.admits(Some(1.0)));
    }

    #[test]
    fn spec_key_joins_axis_names() {
        let spec = Specification {
            index: 0,
            outcome: Outcome::Mean,
            predictor: Predictor::SocialMedia,
            waves: WaveCount::new(3).unwrap(),
            controls: ControlSet::none(),
            estimator: Estimator::ContinuousRobust,
            imputation: Imputation::Original,
            gender: Gender::All,
        };
        assert_eq!(
            spec.key(),
            "mean|social-media|3|none|continuous-robust|original|all"
        );
    }
}
