//! Local Potential Quantiles (LPQ)
//!
//! The `quantile` of the potential outcome `Y(treatment)` among compliers,
//! identified with a binary instrument `Z`. The score is not linear in the
//! parameter: it contains the indicator `1{Y <= theta}`, so the outcome
//! nuisances depend on the parameter itself. A preliminary inverse
//! propensity estimate of the quantile is therefore computed inside every
//! fold on one half of the training data, and the indicator nuisances are
//! fitted at that estimate on the other half.
use crate::causal::{
    instrument, mask_eq, require_single_binary_instrument, require_single_binary_treatment,
};
use crate::constants::{BANDWIDTH_EXPONENT, JACOBIAN_EPS, LPQ_TRIMMING_THRESHOLD, NESTED_SPLIT_SEED, NESTED_TEST_SIZE};
use crate::data::{DoubleMLData, Matrix, TreatmentView};
use crate::double_ml::CausalModel;
use crate::errors::DoubleMLError;
use crate::learner::{check_learner, Learner, LearnerRole, PredictMethod};
use crate::nuisance::{
    fit_predict, CrossFitter, NuisanceCollector, NuisanceEstimate, NuisanceOutput, NuisanceTask, Trimming,
};
use crate::resampling::{kfold_contiguous, train_test_split};
use crate::root::find_root;
use crate::score::{NonLinearScore, Score, ScoreElements};
use crate::utils::{mean, min_max, quantile, validate_open_interval, validate_positive_float_parameter};
use log::{debug, warn};
use std::f64::consts::PI;

const PI_Z: &str = "ml_pi_z";
const PI_D_Z0: &str = "ml_pi_d_z0";
const PI_D_Z1: &str = "ml_pi_d_z1";
const PI_DU_Z0: &str = "ml_pi_du_z0";
const PI_DU_Z1: &str = "ml_pi_du_z1";
/// Preliminary quantile of each observation's fold.
const IPW_QUANTILE: &str = "ipw_quantile";

/// Local potential quantile model.
pub struct Lpq {
    ml_m: Box<dyn Learner>,
    treatment: f64,
    quantile: f64,
    bandwidth: Option<f64>,
    normalize: bool,
    trimming: Trimming,
    nested_seed: u64,
}

impl Lpq {
    /// * `ml_m` - Classifier used for every propensity nuisance.
    /// * `treatment` - Treatment arm of the potential outcome, 0 or 1.
    /// * `quantile` - Quantile level in `(0, 1)`.
    pub fn new(ml_m: Box<dyn Learner>, treatment: i64, quantile: f64) -> Result<Self, DoubleMLError> {
        check_learner(ml_m.as_ref(), "ml_m", LearnerRole::Classifier)?;
        if treatment != 0 && treatment != 1 {
            return Err(DoubleMLError::invalid("treatment", "either 0 or 1", treatment));
        }
        validate_open_interval(quantile, 0.0, 1.0, "quantile")?;
        Ok(Lpq {
            ml_m,
            treatment: treatment as f64,
            quantile,
            bandwidth: None,
            normalize: true,
            trimming: Trimming::truncate(LPQ_TRIMMING_THRESHOLD)?,
            nested_seed: NESTED_SPLIT_SEED,
        })
    }

    /// Kernel bandwidth of the score derivative. Defaults to `n_obs^-0.2`.
    pub fn with_bandwidth(mut self, bandwidth: f64) -> Result<Self, DoubleMLError> {
        validate_positive_float_parameter(bandwidth, "bandwidth")?;
        self.bandwidth = Some(bandwidth);
        Ok(self)
    }

    /// Normalize the derivative weights to mean one.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_trimming(mut self, trimming: Trimming) -> Self {
        self.trimming = trimming;
        self
    }

    /// Seed of the split of each training fold for the preliminary estimate.
    pub fn with_nested_seed(mut self, seed: u64) -> Self {
        self.nested_seed = seed;
        self
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn treatment(&self) -> f64 {
        self.treatment
    }

    fn sign(&self) -> f64 {
        2.0 * self.treatment - 1.0
    }

    fn propensity<'a>(&'a self, name: &'a str, target: &'a [f64], mask: Option<&'a [bool]>) -> NuisanceTask<'a> {
        NuisanceTask {
            name,
            learner: self.ml_m.as_ref(),
            target,
            method: PredictMethod::PredictProba,
            train_mask: mask,
            trimming: Some(self.trimming),
        }
    }
}

/// Share of compliers: `mean(pi_d_z1 - pi_d_z0 + z / pi_z (d - pi_d_z1) - (1 - z) / (1 - pi_z) (d - pi_d_z0))`.
fn complier_probability(d: &[f64], z: &[f64], pi_z: &[f64], pi_d_z0: &[f64], pi_d_z1: &[f64]) -> f64 {
    let total: f64 = (0..d.len())
        .map(|i| {
            pi_d_z1[i] - pi_d_z0[i] + z[i] / pi_z[i] * (d[i] - pi_d_z1[i])
                - (1.0 - z[i]) / (1.0 - pi_z[i]) * (d[i] - pi_d_z0[i])
        })
        .sum();
    total / d.len() as f64
}

/// Per-fold output of the nested preliminary stage.
struct PreliminaryFold {
    ipw: f64,
    pi_du_z0: Vec<f64>,
    pi_du_z1: Vec<f64>,
    models: (Box<dyn Learner>, Box<dyn Learner>),
}

struct NestedStage {
    /// Preliminary quantile of the fold each observation is tested in.
    ipw: Vec<f64>,
    pi_du_z0: NuisanceOutput,
    pi_du_z1: NuisanceOutput,
}

/// Average of the per-fold preliminary quantiles, read at the first test
/// observation of every fold.
fn preliminary_start(ipw: &[f64], fitter: &CrossFitter) -> f64 {
    let per_fold: Vec<f64> = fitter
        .folds()
        .iter()
        .filter_map(|fold| fold.test.first().map(|i| ipw[*i]))
        .collect();
    mean(&per_fold)
}

impl Lpq {
    /// Fit the indicator nuisances of every fold at a preliminary quantile
    /// estimated on the other half of the fold's training data.
    fn nested_stage(
        &self,
        view: &TreatmentView,
        z: &[f64],
        fitter: &CrossFitter,
        bounds: (f64, f64),
        start: f64,
    ) -> Result<NestedStage, DoubleMLError> {
        let n_folds = fitter.folds().len();
        let x = fitter.x();
        let learner = self.ml_m.as_ref();
        let proba = PredictMethod::PredictProba;

        let folds = fitter.map_folds(|k, fold| {
            let degenerate = |nuisance: &str, reason: &str| DoubleMLError::DegenerateFold {
                nuisance: nuisance.to_string(),
                rep: fitter.rep(),
                fold: k,
                reason: reason.to_string(),
            };
            let (train_1, train_2) = train_test_split(&fold.train, NESTED_TEST_SIZE, self.nested_seed);
            if train_1.len() < n_folds {
                return Err(degenerate(PI_Z, "too few observations for the preliminary cross-fitting"));
            }
            let x1_data = x.select_rows(&train_1);
            let x1 = Matrix::new(&x1_data, train_1.len(), x.cols);
            let z1: Vec<f64> = train_1.iter().map(|i| z[*i]).collect();
            let d1: Vec<f64> = train_1.iter().map(|i| view.d[*i]).collect();
            let y1: Vec<f64> = train_1.iter().map(|i| view.y[*i]).collect();
            let local: Vec<usize> = (0..train_1.len()).collect();

            // instrument propensity, cross-fitted on the first half
            let mut pi_z = vec![f64::NAN; train_1.len()];
            for prelim in kfold_contiguous(train_1.len(), n_folds) {
                let target: Vec<f64> = prelim.train.iter().map(|i| z1[*i]).collect();
                let (preds, _) = fit_predict(PI_Z, k, learner, &x1, &prelim.train, &target, &prelim.test, proba)?;
                for (i, p) in prelim.test.iter().zip(preds) {
                    pi_z[*i] = p;
                }
            }
            self.trimming.apply(&mut pi_z);

            // treatment uptake per instrument arm, in-sample on the first half
            let uptake = |name: &str, arm: f64| -> Result<Vec<f64>, DoubleMLError> {
                let rows: Vec<usize> = local.iter().copied().filter(|i| z1[*i] == arm).collect();
                if rows.is_empty() {
                    return Err(degenerate(name, "no observations in the instrument arm"));
                }
                let target: Vec<f64> = rows.iter().map(|i| d1[*i]).collect();
                let (mut preds, _) = fit_predict(name, k, learner, &x1, &rows, &target, &local, proba)?;
                self.trimming.apply(&mut preds);
                Ok(preds)
            };
            let pi_d_z0 = uptake(PI_D_Z0, 0.0)?;
            let pi_d_z1 = uptake(PI_D_Z1, 1.0)?;
            let comp_prob = complier_probability(&d1, &z1, &pi_z, &pi_d_z0, &pi_d_z1);

            let sign = self.sign();
            let weights: Vec<f64> = (0..train_1.len())
                .map(|i| {
                    let w = sign * (z1[i] / pi_z[i] - (1.0 - z1[i]) / (1.0 - pi_z[i])) / comp_prob;
                    if d1[i] == self.treatment {
                        w
                    } else {
                        0.0
                    }
                })
                .collect();
            let ipw_score = |theta: f64| {
                let s: f64 = weights
                    .iter()
                    .zip(&y1)
                    .filter(|(_, y)| **y <= theta)
                    .map(|(w, _)| w)
                    .sum();
                s / weights.len() as f64 - self.quantile
            };
            let ipw = find_root(&ipw_score, start, bounds)?;
            debug!("Preliminary quantile estimate in fold {} of repetition {}: {}", k, fitter.rep(), ipw);

            // indicator nuisances on the second half, predicted on the test fold
            let indicator = |name: &str, arm: f64| -> Result<(Vec<f64>, Box<dyn Learner>), DoubleMLError> {
                let rows: Vec<usize> = train_2.iter().copied().filter(|i| z[*i] == arm).collect();
                if rows.is_empty() {
                    return Err(degenerate(name, "no observations in the instrument arm"));
                }
                let labels: Vec<f64> = rows
                    .iter()
                    .map(|i| f64::from(u8::from(view.d[*i] == self.treatment && view.y[*i] <= ipw)))
                    .collect();
                fit_predict(name, k, learner, x, &rows, &labels, &fold.test, proba)
            };
            let (pi_du_z0, model_z0) = indicator(PI_DU_Z0, 0.0)?;
            let (pi_du_z1, model_z1) = indicator(PI_DU_Z1, 1.0)?;

            Ok(PreliminaryFold {
                ipw,
                pi_du_z0,
                pi_du_z1,
                models: (model_z0, model_z1),
            })
        })?;

        let n = view.n_obs;
        let mut ipw = vec![f64::NAN; n];
        let mut pi_du_z0 = vec![f64::NAN; n];
        let mut pi_du_z1 = vec![f64::NAN; n];
        let mut models_z0 = Vec::with_capacity(folds.len());
        let mut models_z1 = Vec::with_capacity(folds.len());
        for (fold, prelim) in fitter.folds().iter().zip(folds) {
            for (j, i) in fold.test.iter().enumerate() {
                ipw[*i] = prelim.ipw;
                pi_du_z0[*i] = prelim.pi_du_z0[j];
                pi_du_z1[*i] = prelim.pi_du_z1[j];
            }
            models_z0.push(prelim.models.0);
            models_z1.push(prelim.models.1);
        }
        let store = fitter.store_models();
        Ok(NestedStage {
            ipw,
            pi_du_z0: NuisanceOutput {
                predictions: pi_du_z0,
                models: store.then_some(models_z0),
            },
            pi_du_z1: NuisanceOutput {
                predictions: pi_du_z1,
                models: store.then_some(models_z1),
            },
        })
    }
}

fn external_output(fitter: &CrossFitter, name: &str) -> Option<NuisanceOutput> {
    fitter.external(name).map(|v| NuisanceOutput {
        predictions: v.to_vec(),
        models: None,
    })
}

impl CausalModel for Lpq {
    fn name(&self) -> &'static str {
        "LPQ"
    }

    fn nuisance_names(&self) -> Vec<&'static str> {
        vec![PI_Z, PI_D_Z0, PI_D_Z1, PI_DU_Z0, PI_DU_Z1]
    }

    fn auxiliary_names(&self) -> Vec<&'static str> {
        vec![IPW_QUANTILE]
    }

    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError> {
        if data.is_cluster_data() {
            return Err(DoubleMLError::IncompatibleData(
                "estimation with clustering is not implemented for LPQ".to_string(),
            ));
        }
        require_single_binary_treatment(data, "LPQ")?;
        require_single_binary_instrument(data, "LPQ")?;
        if !data.d(0).iter().any(|d| *d == self.treatment) {
            return Err(DoubleMLError::IncompatibleData(format!(
                "no observation received treatment {}",
                self.treatment
            )));
        }
        Ok(())
    }

    fn estimate_nuisance(&self, view: &TreatmentView, fitter: &CrossFitter) -> Result<NuisanceEstimate, DoubleMLError> {
        let z = instrument(view, "LPQ")?;
        let y_treat: Vec<f64> = view
            .y
            .iter()
            .zip(view.d)
            .filter(|(_, d)| **d == self.treatment)
            .map(|(y, _)| *y)
            .collect();
        let bounds = min_max(&y_treat).ok_or_else(|| {
            DoubleMLError::IncompatibleData(format!("no observation received treatment {}", self.treatment))
        })?;
        let initial = quantile(&y_treat, self.quantile);
        let n = view.n_obs;
        let bandwidth = self.bandwidth.unwrap_or_else(|| (n as f64).powf(BANDWIDTH_EXPONENT));

        let z0 = mask_eq(z, 0.0);
        let z1 = mask_eq(z, 1.0);
        let mut collector = NuisanceCollector::default();

        let needs_nested = fitter.external(PI_DU_Z0).is_none() || fitter.external(PI_DU_Z1).is_none();
        let (nested_ipw, mut du_z0, mut du_z1) = if needs_nested {
            let nested = self.nested_stage(view, z, fitter, bounds, initial)?;
            (
                Some(nested.ipw),
                external_output(fitter, PI_DU_Z0).unwrap_or(nested.pi_du_z0),
                external_output(fitter, PI_DU_Z1).unwrap_or(nested.pi_du_z1),
            )
        } else {
            (
                None,
                external_output(fitter, PI_DU_Z0).unwrap_or_else(|| unreachable_output(n)),
                external_output(fitter, PI_DU_Z1).unwrap_or_else(|| unreachable_output(n)),
            )
        };
        let preliminary = fitter.external(IPW_QUANTILE).map(|v| v.to_vec()).or(nested_ipw);
        let start = match &preliminary {
            Some(ipw) => preliminary_start(ipw, fitter),
            None => {
                debug!("No preliminary quantiles, solving from the treated-arm quantile {}.", initial);
                initial
            }
        };
        if let Some(ipw) = preliminary {
            collector.record(
                IPW_QUANTILE,
                NuisanceOutput {
                    predictions: ipw,
                    models: None,
                },
            );
        }
        self.trimming.apply(&mut du_z0.predictions);
        self.trimming.apply(&mut du_z1.predictions);

        let pi_z = collector.record(PI_Z, fitter.predict(&self.propensity(PI_Z, z, None))?);
        let pi_d_z0 = collector.record(PI_D_Z0, fitter.predict(&self.propensity(PI_D_Z0, view.d, Some(z0.as_slice())))?);
        let pi_d_z1 = collector.record(PI_D_Z1, fitter.predict(&self.propensity(PI_D_Z1, view.d, Some(z1.as_slice())))?);
        let pi_du_z0 = collector.record(PI_DU_Z0, du_z0);
        let pi_du_z1 = collector.record(PI_DU_Z1, du_z1);

        let comp_prob = complier_probability(view.d, z, &pi_z, &pi_d_z0, &pi_d_z1);
        if comp_prob.abs() < JACOBIAN_EPS {
            warn!("Estimated share of compliers is {:e}; the instrument barely moves the treatment.", comp_prob);
        }

        let score = LpqScore {
            ind_d: view.d.iter().map(|d| f64::from(u8::from(*d == self.treatment))).collect(),
            pi_z,
            pi_du_z0,
            pi_du_z1,
            y: view.y.to_vec(),
            z: z.to_vec(),
            comp_prob,
            treatment: self.treatment,
            quantile: self.quantile,
            bandwidth,
            normalize: self.normalize,
            start,
            bounds,
        };
        Ok(collector.finish(Score::NonLinear(Box::new(score))))
    }
}

/// Placeholder when both indicator nuisances are supplied externally; never read.
fn unreachable_output(n: usize) -> NuisanceOutput {
    NuisanceOutput {
        predictions: vec![f64::NAN; n],
        models: None,
    }
}

/// The local potential quantile score and its kernel-smoothed derivative.
pub struct LpqScore {
    ind_d: Vec<f64>,
    pi_z: Vec<f64>,
    pi_du_z0: Vec<f64>,
    pi_du_z1: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    comp_prob: f64,
    treatment: f64,
    quantile: f64,
    bandwidth: f64,
    normalize: bool,
    start: f64,
    bounds: (f64, f64),
}

impl LpqScore {
    fn indices(&self, inds: Option<&[usize]>) -> Vec<usize> {
        match inds {
            Some(inds) => inds.to_vec(),
            None => (0..self.y.len()).collect(),
        }
    }

    fn sign(&self) -> f64 {
        2.0 * self.treatment - 1.0
    }
}

impl NonLinearScore for LpqScore {
    fn score(&self, theta: f64, inds: Option<&[usize]>) -> Vec<f64> {
        let sign = self.sign();
        self.indices(inds)
            .into_iter()
            .map(|i| {
                let (z, pi_z) = (self.z[i], self.pi_z[i]);
                let u = if self.y[i] <= theta { self.ind_d[i] } else { 0.0 };
                let s = self.pi_du_z1[i] - self.pi_du_z0[i] + z / pi_z * (u - self.pi_du_z1[i])
                    - (1.0 - z) / (1.0 - pi_z) * (u - self.pi_du_z0[i]);
                sign * s / self.comp_prob - self.quantile
            })
            .collect()
    }

    fn score_deriv(&self, theta: f64, inds: Option<&[usize]>) -> Vec<f64> {
        let sign = self.sign();
        let idx = self.indices(inds);
        let mut weights: Vec<f64> = idx
            .iter()
            .map(|i| {
                let (z, pi_z) = (self.z[*i], self.pi_z[*i]);
                sign * (z / pi_z - (1.0 - z) / (1.0 - pi_z)) * self.ind_d[*i] / self.comp_prob
            })
            .collect();
        if self.normalize {
            let normalization = mean(&weights);
            for w in weights.iter_mut() {
                *w /= normalization;
            }
        }
        let h = self.bandwidth;
        idx.iter()
            .zip(weights)
            .map(|(i, w)| {
                let u = (self.y[*i] - theta) / h;
                w * (-u * u / 2.0).exp() / (2.0 * PI).sqrt() / h
            })
            .collect()
    }

    fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    fn start(&self) -> f64 {
        self.start
    }

    fn elements(&self) -> ScoreElements {
        let mut elements = ScoreElements::new();
        elements.insert("ind_d".to_string(), self.ind_d.clone());
        elements.insert("pi_z".to_string(), self.pi_z.clone());
        elements.insert("pi_du_z0".to_string(), self.pi_du_z0.clone());
        elements.insert("pi_du_z1".to_string(), self.pi_du_z1.clone());
        elements.insert("y".to_string(), self.y.clone());
        elements.insert("z".to_string(), self.z.clone());
        elements.insert("comp_prob".to_string(), vec![self.comp_prob; self.y.len()]);
        elements
    }
}
