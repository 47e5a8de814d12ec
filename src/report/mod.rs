//! Reporting utilities: specification-curve digests and ranked curves.
//!
//! Formatting for the terminal lives in `format`; this module only computes.

use std::cmp::Ordering;

use crate::domain::{ParamLabel, ParameterEstimate, SpecRow};

pub mod format;

pub use format::*;

/// Two-sided significance threshold used by the digest.
pub const SIGNIFICANCE: f64 = 0.05;

/// Distribution of one labelled parameter across succeeded specifications.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelDigest {
    pub label: ParamLabel,
    pub count: usize,
    pub median_std: f64,
    pub min_std: f64,
    pub max_std: f64,
    /// Share of specifications with p < .05 and a positive standardized estimate.
    pub share_positive: f64,
    pub share_negative: f64,
}

/// One point of a ranked specification curve.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvePoint {
    pub index: usize,
    pub key: String,
    pub estimate: ParameterEstimate,
}

/// Per-label digest over succeeded rows (labels with no estimates are omitted).
pub fn curve_digest<'a, I>(rows: I) -> Vec<LabelDigest>
where
    I: IntoIterator<Item = &'a SpecRow>,
{
    let results: Vec<_> = rows.into_iter().filter_map(|r| r.result()).collect();
    let mut out = Vec::new();
    for label in ParamLabel::ALL {
        let estimates: Vec<&ParameterEstimate> =
            results.iter().filter_map(|r| r.estimate(label)).collect();
        if estimates.is_empty() {
            continue;
        }
        let mut std: Vec<f64> = estimates.iter().map(|e| e.std_estimate).collect();
        std.sort_by(f64::total_cmp);

        let n = estimates.len() as f64;
        let significant = |positive: bool| {
            estimates
                .iter()
                .filter(|e| e.p_value < SIGNIFICANCE && (e.std_estimate > 0.0) == positive)
                .count() as f64
                / n
        };

        out.push(LabelDigest {
            label,
            count: estimates.len(),
            median_std: median_sorted(&std),
            min_std: std[0],
            max_std: std[std.len() - 1],
            share_positive: significant(true),
            share_negative: significant(false),
        });
    }
    out
}

/// Succeeded rows ordered by standardized estimate (ascending), ties by grid index.
pub fn ranked_curve<'a, I>(rows: I, label: ParamLabel) -> Vec<CurvePoint>
where
    I: IntoIterator<Item = &'a SpecRow>,
{
    let mut points: Vec<CurvePoint> = rows
        .into_iter()
        .filter_map(|r| {
            r.result()
                .and_then(|res| res.estimate(label))
                .map(|e| CurvePoint {
                    index: r.spec.index,
                    key: r.spec.key(),
                    estimate: *e,
                })
        })
        .collect();
    points.sort_by(|a, b| {
        a.estimate
            .std_estimate
            .partial_cmp(&b.estimate.std_estimate)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    points
}

fn median_sorted(v: &[f64]) -> f64 {
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}
