//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the batch and extraction code stays clean and testable
//! - output changes are localized

use std::time::Duration;

use crate::domain::{ParamLabel, TableCounts};
use crate::fit::GridAxes;
use crate::report::{CurvePoint, LabelDigest};

/// Completion summary printed after `sca run`.
pub fn format_completion_summary(
    counts: &TableCounts,
    restored: usize,
    elapsed: Option<Duration>,
    digest: &[LabelDigest],
) -> String {
    let mut out = String::new();
    out.push_str("=== sca - specification curve batch ===\n");
    out.push_str(&format!(
        "Specifications: {} | attempted={} | restored={} | succeeded={} | failed={}\n",
        counts.total,
        counts.total.saturating_sub(counts.pending + restored),
        restored,
        counts.succeeded,
        counts.failed,
    ));
    if counts.pending > 0 {
        out.push_str(&format!("Unprocessed: {}\n", counts.pending));
    }
    if let Some(elapsed) = elapsed {
        out.push_str(&format!("Elapsed: {}\n", fmt_elapsed(elapsed)));
    }
    out.push('\n');
    out.push_str(&format_digest(digest));
    out
}

/// Per-label specification-curve digest table.
pub fn format_digest(digest: &[LabelDigest]) -> String {
    if digest.is_empty() {
        return "No succeeded specifications.\n".to_string();
    }

    let mut out = String::new();
    out.push_str("Specification curve (standardized estimates):\n");
    out.push_str(
        format!(
            "{:<12} {:>6} {:>9} {:>9} {:>9} {:>7} {:>7}\n",
            "label", "n", "median", "min", "max", "sig+", "sig-"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<12} {:-<6} {:-<9} {:-<9} {:-<9} {:-<7} {:-<7}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for d in digest {
        out.push_str(&format!(
            "{:<12} {:>6} {:>9.3} {:>9.3} {:>9.3} {:>7} {:>7}\n",
            d.label.as_str(),
            d.count,
            d.median_std,
            d.min_std,
            d.max_std,
            fmt_share(d.share_positive),
            fmt_share(d.share_negative),
        ));
    }
    out
}

/// Axis levels and grid size printed by `sca grid`.
pub fn format_grid_overview(axes: &GridAxes) -> String {
    let mut out = String::new();
    out.push_str(&format!("Grid: {} specifications\n", axes.size()));

    let line = |name: &str, levels: Vec<String>| {
        format!("  {:<11} ({}) {}\n", name, levels.len(), levels.join(", "))
    };
    out.push_str(&line(
        "outcome",
        axes.outcomes.iter().map(|o| o.as_str().to_string()).collect(),
    ));
    out.push_str(&line(
        "predictor",
        axes.predictors.iter().map(|p| p.as_str().to_string()).collect(),
    ));
    out.push_str(&line(
        "waves",
        axes.waves.iter().map(|w| w.to_string()).collect(),
    ));
    out.push_str(&line(
        "controls",
        axes.control_sets.iter().map(|c| c.label()).collect(),
    ));
    out.push_str(&line(
        "estimator",
        axes.estimators.iter().map(|e| e.as_str().to_string()).collect(),
    ));
    out.push_str(&line(
        "imputation",
        axes.imputations.iter().map(|i| i.as_str().to_string()).collect(),
    ));
    out.push_str(&line(
        "gender",
        axes.genders.iter().map(|g| g.as_str().to_string()).collect(),
    ));
    out
}

/// Lowest and highest `top` specifications of a ranked curve.
pub fn format_curve_extremes(label: ParamLabel, curve: &[CurvePoint], top: usize) -> String {
    let mut out = String::new();
    if curve.is_empty() {
        out.push_str(&format!("No estimates for {label}.\n"));
        return out;
    }

    out.push_str(&format!("Lowest {label} (standardized):\n"));
    out.push_str(&format_curve_table(curve.iter().take(top)));
    out.push('\n');
    out.push_str(&format!("Highest {label} (standardized):\n"));
    out.push_str(&format_curve_table(curve.iter().rev().take(top)));
    out
}

fn format_curve_table<'a>(points: impl Iterator<Item = &'a CurvePoint>) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>6} {:>9} {:>19} {:>8}  {}\n",
            "index", "std", "std CI", "p", "specification"
        )
        .trim_end(),
    );
    out.push('\n');
    for p in points {
        let e = &p.estimate;
        out.push_str(&format!(
            "{:>6} {:>9.3} {:>19} {:>8.4}  {}\n",
            p.index,
            e.std_estimate,
            format!("[{:.3}, {:.3}]", e.std_ci_lower, e.std_ci_upper),
            e.p_value,
            truncate(&p.key, 72),
        ));
    }
    out
}

fn fmt_share(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

fn fmt_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
