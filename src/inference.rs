//! Inference
//!
//! The fitted parameters of a double machine learning model together with
//! Wald inference, multiplier bootstrap for simultaneous confidence bands
//! and multiple-testing adjustments.
use crate::errors::DoubleMLError;
use crate::utils::{fmt_vec_output, quantile, validate_open_interval};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;

/// Multiplier distribution of the bootstrap.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BootstrapMethod {
    /// Standard normal multipliers.
    #[default]
    Normal,
    /// Exponential(1) minus one.
    Bayes,
    /// `u1 / sqrt(2) + (u2^2 - 1) / 2` with independent standard normals.
    Wild,
}

impl BootstrapMethod {
    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            BootstrapMethod::Normal => rng.sample(StandardNormal),
            BootstrapMethod::Bayes => {
                let e: f64 = rng.sample(Exp1);
                e - 1.0
            }
            BootstrapMethod::Wild => {
                let u1: f64 = rng.sample(StandardNormal);
                let u2: f64 = rng.sample(StandardNormal);
                u1 / 2f64.sqrt() + (u2 * u2 - 1.0) / 2.0
            }
        }
    }
}

/// Multiple testing adjustment of p-values.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum PAdjustMethod {
    Bonferroni,
    Holm,
    /// Step-down procedure on the bootstrap t-statistics.
    RomanoWolf,
}

/// Bootstrapped t-statistics, one row per draw, stacked over repetitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub method: BootstrapMethod,
    pub n_rep_boot: usize,
    /// `[draw][treatment]`, `n_rep_boot * n_rep` rows.
    pub t_stat: Vec<Vec<f64>>,
}

/// One row of [`CausalEstimate::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub name: String,
    pub coef: f64,
    pub se: f64,
    pub t: f64,
    pub p_value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Tabular summary of the fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub level: f64,
    pub rows: Vec<SummaryRow>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = format!("{:.1} %", (1.0 - self.level) / 2.0 * 100.0);
        let hi = format!("{:.1} %", (1.0 + self.level) / 2.0 * 100.0);
        writeln!(
            f,
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "", "coef", "std err", "t", "P>|t|", lo, hi
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:>10} {:>10.6} {:>10.6} {:>10.4} {:>10.4e} {:>10.6} {:>10.6}",
                r.name, r.coef, r.se, r.t, r.p_value, r.lower, r.upper
            )?;
        }
        Ok(())
    }
}

fn standard_normal() -> Result<Normal, DoubleMLError> {
    Normal::new(0.0, 1.0).map_err(|e| DoubleMLError::IncompatibleData(e.to_string()))
}

/// Fitted causal parameters of all treatment columns.
///
/// Besides the aggregated coefficients and standard errors this keeps, per
/// treatment and repetition, the score evaluated at the repetition's
/// estimate and the mean score derivative; the bootstrap needs both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalEstimate {
    names: Vec<String>,
    coef: Vec<f64>,
    se: Vec<f64>,
    /// `[treatment][rep]`
    all_coef: Vec<Vec<f64>>,
    /// `[treatment][rep]`
    all_se: Vec<Vec<f64>>,
    /// `[treatment][rep][obs]`
    psi: Vec<Vec<Vec<f64>>>,
    /// `[treatment][rep]`
    jacobian: Vec<Vec<f64>>,
    n_obs: usize,
    boot: Option<BootstrapResult>,
}

impl CausalEstimate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        names: Vec<String>,
        coef: Vec<f64>,
        se: Vec<f64>,
        all_coef: Vec<Vec<f64>>,
        all_se: Vec<Vec<f64>>,
        psi: Vec<Vec<Vec<f64>>>,
        jacobian: Vec<Vec<f64>>,
        n_obs: usize,
    ) -> Self {
        CausalEstimate {
            names,
            coef,
            se,
            all_coef,
            all_se,
            psi,
            jacobian,
            n_obs,
            boot: None,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn coef(&self) -> &[f64] {
        &self.coef
    }

    pub fn se(&self) -> &[f64] {
        &self.se
    }

    /// Per-repetition estimates, `[treatment][rep]`.
    pub fn all_coef(&self) -> &[Vec<f64>] {
        &self.all_coef
    }

    /// Per-repetition standard errors, `[treatment][rep]`.
    pub fn all_se(&self) -> &[Vec<f64>] {
        &self.all_se
    }

    /// Score at the repetition estimate, `[treatment][rep][obs]`.
    pub fn psi(&self) -> &[Vec<Vec<f64>>] {
        &self.psi
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn n_rep(&self) -> usize {
        self.all_coef.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn t_stat(&self) -> Vec<f64> {
        self.coef.iter().zip(&self.se).map(|(c, s)| c / s).collect()
    }

    /// Two-sided p-values of the Wald test against zero.
    pub fn pval(&self) -> Result<Vec<f64>, DoubleMLError> {
        let normal = standard_normal()?;
        Ok(self
            .t_stat()
            .iter()
            .map(|t| 2.0 * (1.0 - normal.cdf(t.abs())))
            .collect())
    }

    pub fn bootstrap_result(&self) -> Option<&BootstrapResult> {
        self.boot.as_ref()
    }

    /// Multiplier bootstrap of the t-statistics.
    ///
    /// For every repetition, `n_rep_boot` multiplier vectors are drawn and
    /// shared across treatments so the joint distribution is preserved.
    ///
    /// * `method` - Distribution of the multipliers.
    /// * `n_rep_boot` - Draws per repetition.
    /// * `rng` - Explicitly seeded generator.
    pub fn bootstrap(
        &mut self,
        method: BootstrapMethod,
        n_rep_boot: usize,
        rng: &mut StdRng,
    ) -> Result<&BootstrapResult, DoubleMLError> {
        if n_rep_boot < 1 {
            return Err(DoubleMLError::invalid("n_rep_boot", "a positive integer", n_rep_boot));
        }
        let n = self.n_obs as f64;
        let n_treat = self.coef.len();
        let mut t_stat = Vec::with_capacity(n_rep_boot * self.n_rep());
        for rep in 0..self.n_rep() {
            for _ in 0..n_rep_boot {
                let weights: Vec<f64> = (0..self.n_obs).map(|_| method.draw(rng)).collect();
                let row = (0..n_treat)
                    .map(|j| {
                        let psi = &self.psi[j][rep];
                        let s: f64 = weights.iter().zip(psi).map(|(w, p)| w * p).sum();
                        -s / (n * self.all_se[j][rep] * self.jacobian[j][rep])
                    })
                    .collect();
                t_stat.push(row);
            }
        }
        Ok(&*self.boot.insert(BootstrapResult {
            method,
            n_rep_boot,
            t_stat,
        }))
    }

    fn require_bootstrap(&self, what: &str) -> Result<&BootstrapResult, DoubleMLError> {
        self.boot
            .as_ref()
            .ok_or_else(|| DoubleMLError::NotFitted(format!("bootstrap must be run before {}", what)))
    }

    /// Critical value of the simultaneous band: the `level` quantile of the
    /// maximum absolute bootstrap t-statistic over treatments.
    pub fn joint_critical_value(&self, level: f64) -> Result<f64, DoubleMLError> {
        validate_open_interval(level, 0.0, 1.0, "level")?;
        let boot = self.require_bootstrap("joint confidence intervals")?;
        let max_abs: Vec<f64> = boot
            .t_stat
            .iter()
            .map(|row| row.iter().fold(0.0_f64, |m, t| m.max(t.abs())))
            .collect();
        Ok(quantile(&max_abs, level))
    }

    /// Confidence intervals `(lower, upper)` per treatment.
    ///
    /// * `level` - Confidence level in `(0, 1)`.
    /// * `joint` - Simultaneous intervals from the bootstrap instead of pointwise Wald intervals.
    pub fn confint(&self, level: f64, joint: bool) -> Result<Vec<(f64, f64)>, DoubleMLError> {
        validate_open_interval(level, 0.0, 1.0, "level")?;
        let critical = if joint {
            self.joint_critical_value(level)?
        } else {
            standard_normal()?.inverse_cdf(1.0 - (1.0 - level) / 2.0)
        };
        Ok(self
            .coef
            .iter()
            .zip(&self.se)
            .map(|(c, s)| (c - critical * s, c + critical * s))
            .collect())
    }

    /// Adjusted p-values.
    pub fn p_adjust(&self, method: PAdjustMethod) -> Result<Vec<f64>, DoubleMLError> {
        let pvals = self.pval()?;
        let m = pvals.len();
        match method {
            PAdjustMethod::Bonferroni => Ok(pvals.iter().map(|p| (p * m as f64).min(1.0)).collect()),
            PAdjustMethod::Holm => {
                let mut order: Vec<usize> = (0..m).collect();
                order.sort_by(|a, b| pvals[*a].total_cmp(&pvals[*b]));
                let mut adjusted = vec![0.0; m];
                let mut running = 0.0_f64;
                for (k, i) in order.iter().enumerate() {
                    running = running.max(((m - k) as f64 * pvals[*i]).min(1.0));
                    adjusted[*i] = running;
                }
                Ok(adjusted)
            }
            PAdjustMethod::RomanoWolf => {
                let boot = self.require_bootstrap("the Romano-Wolf adjustment")?;
                let t_abs: Vec<f64> = self.t_stat().iter().map(|t| t.abs()).collect();
                let mut order: Vec<usize> = (0..m).collect();
                order.sort_by(|a, b| t_abs[*b].total_cmp(&t_abs[*a]));

                let n_draws = boot.t_stat.len() as f64;
                let mut adjusted = vec![0.0; m];
                let mut running = 0.0_f64;
                for (k, i) in order.iter().enumerate() {
                    let remaining = &order[k..];
                    let exceed = boot
                        .t_stat
                        .iter()
                        .filter(|row| {
                            let max = remaining.iter().fold(0.0_f64, |acc, j| acc.max(row[*j].abs()));
                            max >= t_abs[*i]
                        })
                        .count() as f64;
                    running = running.max((exceed / n_draws).min(1.0));
                    adjusted[*i] = running;
                }
                Ok(adjusted)
            }
        }
    }

    /// Coefficients, standard errors, t-statistics, p-values and Wald intervals.
    pub fn summary(&self, level: f64) -> Result<Summary, DoubleMLError> {
        let ci = self.confint(level, false)?;
        let pval = self.pval()?;
        let t = self.t_stat();
        let rows = (0..self.coef.len())
            .map(|j| SummaryRow {
                name: self.names[j].clone(),
                coef: self.coef[j],
                se: self.se[j],
                t: t[j],
                p_value: pval[j],
                lower: ci[j].0,
                upper: ci[j].1,
            })
            .collect();
        Ok(Summary { level, rows })
    }
}

impl fmt::Display for CausalEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "coef: [{}], se: [{}]",
            fmt_vec_output(&self.coef),
            fmt_vec_output(&self.se)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn estimate() -> CausalEstimate {
        let n = 200;
        let mut rng = StdRng::seed_from_u64(11);
        let psi: Vec<Vec<Vec<f64>>> = (0..2)
            .map(|_| vec![(0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()])
            .collect();
        let se: Vec<f64> = psi
            .iter()
            .map(|p| (p[0].iter().map(|v| v * v).sum::<f64>() / n as f64 / n as f64).sqrt())
            .collect();
        CausalEstimate::new(
            vec!["d1".to_string(), "d2".to_string()],
            vec![0.5, 0.001],
            se.clone(),
            vec![vec![0.5], vec![0.001]],
            vec![vec![se[0]], vec![se[1]]],
            psi,
            vec![vec![-1.0], vec![-1.0]],
            n,
        )
    }

    #[test]
    fn test_wald_confint_and_pval() {
        let est = estimate();
        let ci = est.confint(0.95, false).unwrap();
        let se = est.se()[0];
        assert_abs_diff_eq!(ci[0].0, 0.5 - 1.959964 * se, epsilon = 1e-6);
        assert_abs_diff_eq!(ci[0].1, 0.5 + 1.959964 * se, epsilon = 1e-6);
        let p = est.pval().unwrap();
        assert!(p[0] < 1e-5);
        assert!(p[1] > 0.9);
        assert!(est.confint(1.0, false).is_err());
    }

    #[test]
    fn test_joint_confint_requires_bootstrap() {
        let est = estimate();
        assert!(matches!(est.confint(0.95, true), Err(DoubleMLError::NotFitted(_))));
        assert!(est.p_adjust(PAdjustMethod::RomanoWolf).is_err());
    }

    #[test]
    fn test_bootstrap_is_deterministic() {
        for method in [BootstrapMethod::Normal, BootstrapMethod::Bayes, BootstrapMethod::Wild] {
            let mut a = estimate();
            let mut b = estimate();
            a.bootstrap(method, 300, &mut StdRng::seed_from_u64(42)).unwrap();
            b.bootstrap(method, 300, &mut StdRng::seed_from_u64(42)).unwrap();
            let cv_a = a.joint_critical_value(0.95).unwrap();
            let cv_b = b.joint_critical_value(0.95).unwrap();
            assert_eq!(cv_a, cv_b);
            assert!(cv_a > 1.0 && cv_a < 5.0);
            assert_eq!(a.bootstrap_result().map(|r| r.t_stat.len()), Some(300));
        }
    }

    #[test]
    fn test_joint_band_is_wider_than_pointwise() {
        let mut est = estimate();
        est.bootstrap(BootstrapMethod::Normal, 500, &mut StdRng::seed_from_u64(1)).unwrap();
        let joint = est.confint(0.95, true).unwrap();
        let pointwise = est.confint(0.95, false).unwrap();
        assert!(joint[0].1 - joint[0].0 > pointwise[0].1 - pointwise[0].0);
    }

    #[test]
    fn test_p_adjust() {
        let mut est = estimate();
        let p = est.pval().unwrap();
        let bonf = est.p_adjust(PAdjustMethod::Bonferroni).unwrap();
        assert_abs_diff_eq!(bonf[0], (2.0 * p[0]).min(1.0));
        assert_abs_diff_eq!(bonf[1], (2.0 * p[1]).min(1.0));
        let holm = est.p_adjust(PAdjustMethod::Holm).unwrap();
        assert_abs_diff_eq!(holm[0], 2.0 * p[0]);
        assert_abs_diff_eq!(holm[1], p[1].max(2.0 * p[0]));

        est.bootstrap(BootstrapMethod::Normal, 500, &mut StdRng::seed_from_u64(3)).unwrap();
        let rw = est.p_adjust(PAdjustMethod::RomanoWolf).unwrap();
        assert!(rw[0] < 0.01);
        assert!(rw[1] >= rw[0]);
    }

    #[test]
    fn test_summary_display() {
        let est = estimate();
        let summary = est.summary(0.95).unwrap();
        assert_eq!(summary.rows.len(), 2);
        let text = summary.to_string();
        assert!(text.contains("coef"));
        assert!(text.contains("2.5 %"));
        assert!(text.contains("d2"));
    }
}
