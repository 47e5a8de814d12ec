//! Typed model-definition statements and their rendering to solver syntax.
//!
//! The builder assembles a list of `Statement`s; text only exists at the
//! solver boundary (`ModelDefinition::render`). The rendered form is lavaan
//! model syntax:
//!
//! ```text
//! ri_life =~ 1*a_life + 1*b_life + 1*c_life
//! wlife2 ~ ar_sat*wlife1 + cl_pred_sat*wsm1
//! a_life ~~ 0*a_life
//! ri_life ~~ cor_ri*ri_sm
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::domain::ParamLabel;
use crate::error::SpecError;

/// Coefficient attached to a right-hand-side term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coefficient {
    /// Freely estimated, unlabelled.
    Free,
    /// Fixed to a constant.
    Fixed(f64),
    /// Freely estimated and shared with every other occurrence of the label.
    Label(ParamLabel),
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coefficient::Free => Ok(()),
            Coefficient::Fixed(v) => write!(f, "{v}*"),
            Coefficient::Label(l) => write!(f, "{}*", l.as_str()),
        }
    }
}

/// `coefficient * variable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub coefficient: Coefficient,
    pub variable: String,
}

impl Term {
    pub fn free(variable: impl Into<String>) -> Self {
        Self {
            coefficient: Coefficient::Free,
            variable: variable.into(),
        }
    }

    pub fn fixed(value: f64, variable: impl Into<String>) -> Self {
        Self {
            coefficient: Coefficient::Fixed(value),
            variable: variable.into(),
        }
    }

    pub fn labelled(label: ParamLabel, variable: impl Into<String>) -> Self {
        Self {
            coefficient: Coefficient::Label(label),
            variable: variable.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.coefficient, self.variable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Loading,
    Regression,
    Variance,
    Covariance,
    PooledCovariance,
}

/// One structural-equation statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `latent =~ indicators`
    Loading { latent: String, indicators: Vec<Term> },
    /// `dependent ~ predictors`
    Regression { dependent: String, predictors: Vec<Term> },
    /// `variable ~~ value*variable`
    Variance { variable: String, value: f64 },
    /// `left ~~ right`
    Covariance { left: String, right: Term },
    /// `left_t ~~ label*right_t` for every pair, one shared estimate.
    PooledCovariance {
        label: ParamLabel,
        pairs: Vec<(String, String)>,
    },
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Loading { .. } => StatementKind::Loading,
            Statement::Regression { .. } => StatementKind::Regression,
            Statement::Variance { .. } => StatementKind::Variance,
            Statement::Covariance { .. } => StatementKind::Covariance,
            Statement::PooledCovariance { .. } => StatementKind::PooledCovariance,
        }
    }

    /// A statement with nothing on one side would render as a dangling line.
    pub fn is_empty(&self) -> bool {
        match self {
            Statement::Loading { latent, indicators } => latent.is_empty() || indicators.is_empty(),
            Statement::Regression {
                dependent,
                predictors,
            } => dependent.is_empty() || predictors.is_empty(),
            Statement::Variance { variable, .. } => variable.is_empty(),
            Statement::Covariance { left, right } => left.is_empty() || right.variable.is_empty(),
            Statement::PooledCovariance { pairs, .. } => pairs.is_empty(),
        }
    }

    /// Left-hand-side variable (first pair's left side for pooled covariances).
    pub fn lhs(&self) -> Option<&str> {
        match self {
            Statement::Loading { latent, .. } => Some(latent.as_str()),
            Statement::Regression { dependent, .. } => Some(dependent.as_str()),
            Statement::Variance { variable, .. } => Some(variable.as_str()),
            Statement::Covariance { left, .. } => Some(left.as_str()),
            Statement::PooledCovariance { pairs, .. } => pairs.first().map(|(l, _)| l.as_str()),
        }
    }

    /// Every variable named on either side.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Statement::Loading { latent, indicators } => std::iter::once(latent.as_str())
                .chain(indicators.iter().map(|t| t.variable.as_str()))
                .collect(),
            Statement::Regression {
                dependent,
                predictors,
            } => std::iter::once(dependent.as_str())
                .chain(predictors.iter().map(|t| t.variable.as_str()))
                .collect(),
            Statement::Variance { variable, .. } => vec![variable.as_str()],
            Statement::Covariance { left, right } => vec![left.as_str(), right.variable.as_str()],
            Statement::PooledCovariance { pairs, .. } => pairs
                .iter()
                .flat_map(|(l, r)| [l.as_str(), r.as_str()])
                .collect(),
        }
    }

    pub fn references(&self, variable: &str) -> bool {
        self.variables().contains(&variable)
    }

    pub fn labels(&self) -> Vec<ParamLabel> {
        fn term_label(t: &Term) -> Option<ParamLabel> {
            match t.coefficient {
                Coefficient::Label(l) => Some(l),
                _ => None,
            }
        }
        match self {
            Statement::Loading { indicators: ts, .. } | Statement::Regression { predictors: ts, .. } => {
                ts.iter().filter_map(term_label).collect()
            }
            Statement::Variance { .. } => Vec::new(),
            Statement::Covariance { right, .. } => term_label(right).into_iter().collect(),
            Statement::PooledCovariance { label, .. } => vec![*label],
        }
    }

    /// Solver lines for this statement (one per pair for pooled covariances).
    pub fn render_lines(&self) -> Vec<String> {
        match self {
            Statement::Loading { latent, indicators } => {
                vec![format!("{latent} =~ {}", join_terms(indicators))]
            }
            Statement::Regression {
                dependent,
                predictors,
            } => vec![format!("{dependent} ~ {}", join_terms(predictors))],
            Statement::Variance { variable, value } => {
                vec![format!("{variable} ~~ {value}*{variable}")]
            }
            Statement::Covariance { left, right } => vec![format!("{left} ~~ {right}")],
            Statement::PooledCovariance { label, pairs } => pairs
                .iter()
                .map(|(l, r)| format!("{l} ~~ {}*{r}", label.as_str()))
                .collect(),
        }
    }
}

fn join_terms(terms: &[Term]) -> String {
    terms
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" + ")
}

/// A complete model definition: latent names, observed columns and statements.
///
/// Pure data derived from the variable choices; it never depends on fitted data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelDefinition {
    statements: Vec<Statement>,
    latents: Vec<String>,
    indicators: Vec<String>,
    controls: Vec<String>,
}

impl ModelDefinition {
    pub fn new(latents: Vec<String>, indicators: Vec<String>, controls: Vec<String>) -> Self {
        Self {
            statements: Vec::new(),
            latents,
            indicators,
            controls,
        }
    }

    /// Append a statement; empty statements are dropped rather than rendered.
    pub fn push(&mut self, statement: Statement) {
        if !statement.is_empty() {
            self.statements.push(statement);
        }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn latents(&self) -> &[String] {
        &self.latents
    }

    /// Observed wave indicators, outcome first then predictor, in wave order.
    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn controls(&self) -> &[String] {
        &self.controls
    }

    /// Observed columns the data slice must provide.
    pub fn required_columns(&self) -> Vec<String> {
        self.indicators
            .iter()
            .chain(self.controls.iter())
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: StatementKind) -> usize {
        self.statements.iter().filter(|s| s.kind() == kind).count()
    }

    /// Distinct parameter labels used anywhere in the definition.
    pub fn labels(&self) -> BTreeSet<ParamLabel> {
        self.statements.iter().flat_map(|s| s.labels()).collect()
    }

    /// Check that the definition renders to solver input without dangling terms.
    pub fn validate(&self) -> Result<(), SpecError> {
        let latents: HashSet<&str> = self.latents.iter().map(String::as_str).collect();
        let observed: HashSet<&str> = self
            .indicators
            .iter()
            .chain(self.controls.iter())
            .map(String::as_str)
            .collect();

        let mut defined: HashSet<&str> = HashSet::new();
        for s in &self.statements {
            if s.is_empty() {
                return Err(SpecError::Configuration(
                    "model definition contains an empty statement".to_string(),
                ));
            }
            if let Statement::Loading { latent, .. } = s {
                defined.insert(latent.as_str());
            }
        }

        for latent in &latents {
            if !defined.contains(latent) {
                return Err(SpecError::Configuration(format!(
                    "latent `{latent}` is declared but never defined"
                )));
            }
        }

        for s in &self.statements {
            for v in s.variables() {
                if !latents.contains(&v) && !observed.contains(&v) {
                    return Err(SpecError::Configuration(format!(
                        "model term `{v}` is neither a defined latent nor an observed column"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render to solver syntax: one line per statement, no blank lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.statements.iter().flat_map(|s| s.render_lines()) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
