//! Pull the fixed result schema out of a fitted model.
//!
//! Per label we take the first parameter-table row carrying it, in solver
//! order. Pooled labels appear on several rows with one shared estimate; the
//! first row is taken as-is, not averaged.

use std::collections::BTreeMap;

use crate::domain::{FitStats, ParamLabel, ParameterEstimate, ResultRow};
use crate::error::SpecError;
use crate::fit::solver::{FittedModel, ParameterRow};

pub const FIT_INDICES: [&str; 3] = ["cfi", "rmsea", "srmr"];

pub fn extract(fitted: &FittedModel) -> Result<ResultRow, SpecError> {
    let mut estimates = BTreeMap::new();
    for label in ParamLabel::ALL {
        let row = fitted
            .parameters()
            .iter()
            .find(|p| p.label == label.as_str())
            .ok_or_else(|| {
                SpecError::Extraction(format!("parameter `{label}` is absent from the solution"))
            })?;
        estimates.insert(label, to_estimate(label, row)?);
    }

    Ok(ResultRow {
        estimates,
        fit: fit_stats(fitted)?,
    })
}

fn to_estimate(label: ParamLabel, row: &ParameterRow) -> Result<ParameterEstimate, SpecError> {
    let get = |value: Option<f64>, field: &str| {
        value.filter(|v| v.is_finite()).ok_or_else(|| {
            SpecError::Extraction(format!("parameter `{label}` has no finite {field}"))
        })
    };

    Ok(ParameterEstimate {
        estimate: get(row.est, "estimate")?,
        ci_lower: get(row.ci_lower, "lower bound")?,
        ci_upper: get(row.ci_upper, "upper bound")?,
        std_estimate: get(row.std, "standardized estimate")?,
        std_ci_lower: get(row.std_ci_lower, "standardized lower bound")?,
        std_ci_upper: get(row.std_ci_upper, "standardized upper bound")?,
        p_value: get(row.pvalue, "p-value")?,
    })
}

fn fit_stats(fitted: &FittedModel) -> Result<FitStats, SpecError> {
    let free = fitted.free_parameter_count();
    if free == 0 {
        return Err(SpecError::Extraction(
            "solution reports zero free parameters".to_string(),
        ));
    }

    let index = |name: &str| {
        fitted
            .fit_index(name)
            .filter(|v| v.is_finite())
            .ok_or_else(|| SpecError::Extraction(format!("fit index `{name}` is unavailable")))
    };

    Ok(FitStats {
        sample_size: fitted.sample_size(),
        param_ratio: fitted.total_observations() as f64 / free as f64,
        cfi: index(FIT_INDICES[0])?,
        rmsea: index(FIT_INDICES[1])?,
        srmr: index(FIT_INDICES[2])?,
    })
}
