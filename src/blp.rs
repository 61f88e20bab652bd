//! Best Linear Predictor
//!
//! Projection of an orthogonal signal (for example the doubly robust score
//! of an average treatment effect) on a basis of covariates, with HC0
//! covariance and pointwise or simultaneous confidence bands.
use crate::constants::{CONFIDENCE_LEVEL, N_REP_BOOT};
use crate::errors::DoubleMLError;
use crate::utils::{mat_from_row_major, quantile, row_major, validate_open_interval, SpdFactor};
use faer::Mat;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Fitted OLS projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlpFit {
    pub coef: Vec<f64>,
    /// HC0 covariance of `coef`, row-major `k x k`.
    pub omega: Vec<f64>,
    pub fitted_values: Vec<f64>,
}

/// One band row: `(lower, prediction, upper)`.
pub type BandRow = (f64, f64, f64);

/// Best linear predictor of `signal` given `basis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestLinearPredictor {
    signal: Vec<f64>,
    /// Basis columns, each of length `n_obs`.
    basis: Vec<Vec<f64>>,
    fit: Option<BlpFit>,
}

fn check_basis(basis: &[Vec<f64>], n_obs: usize, k: Option<usize>) -> Result<(), DoubleMLError> {
    if basis.is_empty() {
        return Err(DoubleMLError::IncompatibleData("the basis has no columns".to_string()));
    }
    if let Some(k) = k {
        if basis.len() != k {
            return Err(DoubleMLError::IncompatibleData(format!(
                "the basis has {} columns, the fit used {}",
                basis.len(),
                k
            )));
        }
    }
    if let Some(col) = basis.iter().position(|c| c.len() != n_obs) {
        return Err(DoubleMLError::IncompatibleData(format!(
            "basis column {} has {} rows, expected {}",
            col,
            basis[col].len(),
            n_obs
        )));
    }
    Ok(())
}

fn row_dot(basis: &[Vec<f64>], i: usize, v: &[f64]) -> f64 {
    basis.iter().zip(v).map(|(col, b)| col[i] * b).sum()
}

impl BestLinearPredictor {
    /// * `signal` - Orthogonal signal, one value per observation.
    /// * `basis` - Basis columns, each with one value per observation.
    pub fn new(signal: Vec<f64>, basis: Vec<Vec<f64>>) -> Result<Self, DoubleMLError> {
        check_basis(&basis, signal.len(), None)?;
        if signal.len() <= basis.len() {
            return Err(DoubleMLError::IncompatibleData(format!(
                "{} observations are too few for {} basis columns",
                signal.len(),
                basis.len()
            )));
        }
        Ok(BestLinearPredictor {
            signal,
            basis,
            fit: None,
        })
    }

    /// Ordinary least squares with heteroskedasticity-robust (HC0) covariance.
    pub fn fit(mut self) -> Result<Self, DoubleMLError> {
        let k = self.basis.len();
        let n = self.signal.len();
        let x = Mat::from_fn(n, k, |i, a| self.basis[a][i]);
        let y = Mat::from_fn(n, 1, |i, _| self.signal[i]);
        let xtx = x.as_ref().transpose() * x.as_ref();
        let xty = x.as_ref().transpose() * y.as_ref();

        let factor = SpdFactor::new(&row_major(xtx.as_ref()), k)
            .ok_or_else(|| DoubleMLError::IncompatibleData("the basis is collinear".to_string()))?;
        let coef = factor.solve(&(0..k).map(|a| xty[(a, 0)]).collect::<Vec<_>>());
        let bread = mat_from_row_major(&factor.inverse(), k);

        let fitted_values: Vec<f64> = (0..n).map(|i| row_dot(&self.basis, i, &coef)).collect();
        let scaled = Mat::from_fn(n, k, |i, a| (self.signal[i] - fitted_values[i]) * x[(i, a)]);
        let meat = scaled.as_ref().transpose() * scaled.as_ref();
        let bm = bread.as_ref() * meat.as_ref();
        let omega = bm.as_ref() * bread.as_ref();

        self.fit = Some(BlpFit {
            coef,
            omega: row_major(omega.as_ref()),
            fitted_values,
        });
        Ok(self)
    }

    pub fn result(&self) -> Result<&BlpFit, DoubleMLError> {
        self.fit
            .as_ref()
            .ok_or_else(|| DoubleMLError::NotFitted("call fit on the best linear predictor first".to_string()))
    }

    pub fn coef(&self) -> Result<&[f64], DoubleMLError> {
        Ok(&self.result()?.coef)
    }

    /// Predictions and confidence bands at the rows of `basis`.
    ///
    /// * `basis` - Basis columns at the evaluation points.
    /// * `joint` - Simultaneous band over all rows instead of pointwise intervals.
    /// * `level` - Confidence level in `(0, 1)`.
    /// * `n_rep_boot` - Gaussian draws for the joint critical value.
    /// * `rng` - Explicitly seeded generator for the joint band.
    pub fn confint(
        &self,
        basis: &[Vec<f64>],
        joint: bool,
        level: f64,
        n_rep_boot: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<BandRow>, DoubleMLError> {
        validate_open_interval(level, 0.0, 1.0, "level")?;
        let fit = self.result()?;
        let k = fit.coef.len();
        let n_points = basis.first().map(|c| c.len()).unwrap_or(0);
        check_basis(basis, n_points, Some(k))?;

        let g_hat: Vec<f64> = (0..n_points).map(|i| row_dot(basis, i, &fit.coef)).collect();
        let se: Vec<f64> = (0..n_points)
            .map(|i| {
                let row: Vec<f64> = basis.iter().map(|c| c[i]).collect();
                let mut v = 0.0;
                for a in 0..k {
                    for b in 0..k {
                        v += row[a] * fit.omega[a * k + b] * row[b];
                    }
                }
                v.sqrt()
            })
            .collect();

        let critical = if joint {
            if n_rep_boot < 1 {
                return Err(DoubleMLError::invalid("n_rep_boot", "a positive integer", n_rep_boot));
            }
            let chol = SpdFactor::new(&fit.omega, k)
                .ok_or_else(|| {
                    DoubleMLError::IncompatibleData(
                        "the covariance of the projection is not positive definite".to_string(),
                    )
                })?
                .lower();
            let max_t: Vec<f64> = (0..n_rep_boot)
                .map(|_| {
                    let u: Vec<f64> = (0..k).map(|_| rng.sample(StandardNormal)).collect();
                    let draw: Vec<f64> = (0..k)
                        .map(|a| (0..=a).map(|b| chol[a * k + b] * u[b]).sum())
                        .collect();
                    (0..n_points)
                        .map(|i| (row_dot(basis, i, &draw) / se[i]).abs())
                        .fold(0.0_f64, f64::max)
                })
                .collect();
            quantile(&max_t, level)
        } else {
            Normal::new(0.0, 1.0)
                .map_err(|e| DoubleMLError::IncompatibleData(e.to_string()))?
                .inverse_cdf(1.0 - (1.0 - level) / 2.0)
        };

        Ok(g_hat
            .iter()
            .zip(&se)
            .map(|(g, s)| (g - critical * s, *g, g + critical * s))
            .collect())
    }

    /// Pointwise 95% band with the default number of draws.
    pub fn confint_default(&self, basis: &[Vec<f64>], rng: &mut StdRng) -> Result<Vec<BandRow>, DoubleMLError> {
        self.confint(basis, false, CONFIDENCE_LEVEL, N_REP_BOOT, rng)
    }
}
