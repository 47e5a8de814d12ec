//! Sample covariance and numerical rank of indicator data.
//!
//! Used as a cheap pre-check before a fit is handed to the solver: a
//! covariance matrix with rank below its dimension means some indicator is
//! an exact linear combination of the others and the model cannot be
//! identified on this slice.
//!
//! Implementation choices:
//! - We center columns and form `XᵀX / (n - 1)` with nalgebra.
//! - Rank comes from the singular values relative to the largest one, so the
//!   check is scale-free across Likert and continuous indicators.

use nalgebra::DMatrix;

/// Relative singular-value tolerance below which a direction counts as null.
pub const RANK_TOLERANCE: f64 = 1e-9;

/// Sample covariance of complete rows (`rows[i][j]` = observation i, variable j).
///
/// Returns `None` with fewer than two rows or ragged input.
pub fn covariance_matrix(rows: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let n = rows.len();
    let p = rows.first()?.len();
    if n < 2 || p == 0 || rows.iter().any(|r| r.len() != p) {
        return None;
    }

    let mut x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    for j in 0..p {
        let mean = x.column(j).mean();
        x.column_mut(j).add_scalar_mut(-mean);
    }

    Some((x.transpose() * &x) / (n as f64 - 1.0))
}

/// Number of singular values above `tolerance * max_singular_value`.
pub fn numerical_rank(matrix: &DMatrix<f64>, tolerance: f64) -> usize {
    if matrix.is_empty() {
        return 0;
    }
    let singular = matrix.clone().svd(false, false).singular_values;
    let max = singular.iter().cloned().fold(0.0_f64, f64::max);
    if !(max.is_finite() && max > 0.0) {
        return 0;
    }
    singular.iter().filter(|s| **s > tolerance * max).count()
}
