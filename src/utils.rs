//! Utilities
//!
//! Parameter validation, summary statistics and the small symmetric
//! positive definite solves needed by the best-linear-predictor code.
use crate::errors::DoubleMLError;
use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, MatRef, Side};
use std::cmp::Ordering;

/// Format a vector of floats with four decimals.
pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), DoubleMLError> {
    if value.is_nan() || value <= 0.0 || value.is_infinite() {
        Err(DoubleMLError::invalid(parameter, "a positive finite real value", value))
    } else {
        Ok(())
    }
}

/// Validate that `value` lies in the open interval `(min, max)`.
pub fn validate_open_interval(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), DoubleMLError> {
    if value.is_nan() || value <= min || max <= value {
        Err(DoubleMLError::invalid(
            parameter,
            format!("real value strictly between {} and {}", min, max),
            value,
        ))
    } else {
        Ok(())
    }
}

/// Whether every value is exactly `0.0` or `1.0`.
pub fn is_binary(v: &[f64]) -> bool {
    v.iter().all(|x| *x == 0.0 || *x == 1.0)
}

/// Arithmetic mean, `NaN` for an empty slice.
#[inline]
pub fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

/// Mean of `v` restricted to `index`.
#[inline]
pub fn mean_at(v: &[f64], index: &[usize]) -> f64 {
    if index.is_empty() {
        return f64::NAN;
    }
    index.iter().map(|i| v[*i]).sum::<f64>() / index.len() as f64
}

fn sorted(v: &[f64]) -> Vec<f64> {
    let mut s = v.to_vec();
    s.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    s
}

/// Median; the average of the two central values for even lengths.
pub fn median(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let s = sorted(v);
    let mid = s.len() / 2;
    if s.len() % 2 == 0 {
        (s[mid - 1] + s[mid]) / 2.0
    } else {
        s[mid]
    }
}

/// Empirical quantile with linear interpolation between order statistics.
///
/// * `v` - Values, need not be sorted.
/// * `q` - Probability in `[0, 1]`.
pub fn quantile(v: &[f64], q: f64) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let s = sorted(v);
    let pos = q.clamp(0.0, 1.0) * (s.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    s[lo] + (s[hi] - s[lo]) * frac
}

/// Minimum and maximum of a non-empty slice.
pub fn min_max(v: &[f64]) -> Option<(f64, f64)> {
    let first = *v.first()?;
    Some(v.iter().fold((first, first), |(lo, hi), x| (lo.min(*x), hi.max(*x))))
}

/// Numerically rank deficient if a squared Cholesky pivot falls below this
/// share of its diagonal entry.
const RANK_TOLERANCE: f64 = 1e-10;

/// Row-major `n x n` slice as a `faer` matrix.
pub fn mat_from_row_major(a: &[f64], n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| a[i * n + j])
}

/// A `faer` matrix flattened in row-major order.
pub fn row_major(m: MatRef<'_, f64>) -> Vec<f64> {
    (0..m.nrows())
        .flat_map(|i| (0..m.ncols()).map(move |j| m[(i, j)]))
        .collect()
}

/// Cholesky factorization `a = L Lᵀ` of a symmetric positive definite matrix.
pub struct SpdFactor {
    llt: Llt<f64>,
    n: usize,
}

impl SpdFactor {
    /// Factor a row-major `n x n` matrix. `None` if it is not numerically
    /// positive definite.
    pub fn new(a: &[f64], n: usize) -> Option<Self> {
        let m = mat_from_row_major(a, n);
        let llt = Llt::new(m.as_ref(), Side::Lower).ok()?;
        let l = llt.L();
        if (0..n).any(|j| l[(j, j)] * l[(j, j)] <= RANK_TOLERANCE * m[(j, j)].abs()) {
            return None;
        }
        Some(SpdFactor { llt, n })
    }

    /// Solve `a x = b`.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let rhs = Mat::from_fn(self.n, 1, |i, _| b[i]);
        let x = self.llt.solve(rhs.as_ref());
        (0..self.n).map(|i| x[(i, 0)]).collect()
    }

    /// `a⁻¹`, row-major.
    pub fn inverse(&self) -> Vec<f64> {
        let identity = Mat::<f64>::identity(self.n, self.n);
        row_major(self.llt.solve(identity.as_ref()).as_ref())
    }

    /// The lower triangular factor `L`, row-major.
    pub fn lower(&self) -> Vec<f64> {
        let l = self.llt.L();
        (0..self.n)
            .flat_map(|i| (0..self.n).map(move |j| if j <= i { l[(i, j)] } else { 0.0 }))
            .collect()
    }
}

/// Solve `a x = b` for a symmetric positive definite row-major matrix.
pub fn solve_spd(a: &[f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    SpdFactor::new(a, n).map(|f| f.solve(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[1.0, 5.0, 1.2]), 1.2);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_abs_diff_eq!(quantile(&v, 0.5), 3.0);
        assert_abs_diff_eq!(quantile(&v, 0.25), 2.0);
        assert_abs_diff_eq!(quantile(&v, 0.1), 1.4, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&v, 1.0), 5.0);
    }

    #[test]
    fn test_validate_open_interval() {
        assert!(validate_open_interval(0.05, 0.0, 0.5, "trimming_threshold").is_ok());
        assert!(validate_open_interval(0.5, 0.0, 0.5, "trimming_threshold").is_err());
        assert!(validate_open_interval(0.0, 0.0, 0.5, "trimming_threshold").is_err());
        assert!(validate_open_interval(f64::NAN, 0.0, 0.5, "trimming_threshold").is_err());
    }

    #[test]
    fn test_spd_solve_and_inverse() {
        // [[4, 2], [2, 3]] x = [1, 2]
        let a = vec![4.0, 2.0, 2.0, 3.0];
        let x = solve_spd(&a, &[1.0, 2.0], 2).unwrap();
        assert_abs_diff_eq!(x[0], -0.125, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.75, epsilon = 1e-12);

        let inv = SpdFactor::new(&a, 2).unwrap().inverse();
        assert_abs_diff_eq!(inv[0], 0.375, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[1], -0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[2], -0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[3], 0.5, epsilon = 1e-12);

        assert!(solve_spd(&[1.0, 2.0, 2.0, 4.0], &[1.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_cholesky_lower_factor() {
        let a = vec![4.0, 2.0, 2.0, 3.0];
        let l = SpdFactor::new(&a, 2).unwrap().lower();
        assert_abs_diff_eq!(l[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[3], 2f64.sqrt(), epsilon = 1e-12);
        assert!(SpdFactor::new(&[1.0, 2.0, 2.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_row_major_round_trip() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let m = mat_from_row_major(&a, 2);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(row_major(m.as_ref()), a);
    }
}
