//! Double Machine Learning
//!
//! The generic cross-fitting engine. A concrete model only names its
//! nuisance functions and turns their out-of-fold predictions into an
//! orthogonal score; drawing the sample splitting, running the folds,
//! solving the moment condition and aggregating over repetitions happens
//! here.
pub mod setters;

use crate::config::{DmlProcedure, DoubleMLConfig};
use crate::constants::JACOBIAN_EPS;
use crate::data::{DoubleMLData, Matrix, TreatmentView};
use crate::errors::DoubleMLError;
use crate::inference::{BootstrapMethod, BootstrapResult, CausalEstimate, PAdjustMethod, Summary};
use crate::nuisance::{
    CrossFitter, ExternalPredictions, FittedLearners, NuisanceEstimate, NuisancePredictions,
};
use crate::resampling::{DoubleMLResampling, Fold, SampleSplitting};
use crate::root::solve_score;
use crate::score::ScoreElements;
use crate::utils::{mean, median};
use hashbrown::HashMap;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// A causal model estimated by double machine learning.
///
/// Implementors supply the nuisance functions they need and the score
/// assembly; [`DoubleML`] does the rest.
pub trait CausalModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Names of the nuisance functions, as used for external predictions
    /// and stored predictions.
    fn nuisance_names(&self) -> Vec<&'static str>;

    /// Per-observation by-products of the nuisance stage that the solve
    /// depends on. They are stored next to the predictions and accepted as
    /// external predictions, so a replay reproduces the fit.
    fn auxiliary_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Nuisance and auxiliary names together.
    fn prediction_names(&self) -> Vec<&'static str> {
        let mut names = self.nuisance_names();
        names.extend(self.auxiliary_names());
        names
    }

    /// Reject datasets the model cannot handle.
    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError>;

    /// Cross-fit the nuisance functions for one repetition of one treatment
    /// and assemble the score.
    fn estimate_nuisance(
        &self,
        view: &TreatmentView,
        fitter: &CrossFitter,
    ) -> Result<NuisanceEstimate, DoubleMLError>;
}

/// Outcome of one repetition for one treatment.
struct RepetitionFit {
    coef: f64,
    se: f64,
    psi: Vec<f64>,
    jacobian: f64,
    predictions: NuisancePredictions,
    models: FittedLearners,
    elements: ScoreElements,
}

/// Everything produced by [`DoubleML::fit`].
struct Fitted {
    estimate: CausalEstimate,
    /// `[treatment][rep]`, empty unless predictions are stored.
    predictions: Vec<Vec<NuisancePredictions>>,
    /// `[treatment][rep]`, empty unless predictions are stored.
    score_elements: Vec<Vec<ScoreElements>>,
    /// `[treatment][rep]`, empty unless models are stored.
    models: Vec<Vec<FittedLearners>>,
}

/// Double machine learning estimator for a causal model `M`.
pub struct DoubleML<M: CausalModel> {
    data: DoubleMLData,
    model: M,
    cfg: DoubleMLConfig,
    smpls: Option<SampleSplitting>,
    strata: Option<Vec<i64>>,
    fitted: Option<Fitted>,
}

/// Final coefficient and standard error from per-repetition estimates.
///
/// The coefficient is the median over repetitions. The variance is the
/// median of `se_r^2 * n + (theta_r - coef)^2`, scaled back by `1 / n`, so
/// dispersion between repetitions widens the standard error.
pub fn aggregate_repetitions(all_coef: &[f64], all_se: &[f64], n_obs: usize) -> (f64, f64) {
    let n = n_obs as f64;
    let coef = median(all_coef);
    let spread: Vec<f64> = all_coef
        .iter()
        .zip(all_se)
        .map(|(theta, se)| se * se * n + (theta - coef).powi(2))
        .collect();
    (coef, (median(&spread) / n).sqrt())
}

/// Sandwich variance of one repetition: `mean(psi^2) / J^2 / n`.
///
/// With clusters the meat is one-way cluster-robust,
/// `sum_c (sum_{i in c} psi_i)^2 / n`.
pub fn repetition_variance(psi: &[f64], jacobian: f64, clusters: Option<&[i64]>) -> f64 {
    let n = psi.len() as f64;
    let meat = match clusters {
        None => psi.iter().map(|p| p * p).sum::<f64>() / n,
        Some(clusters) => {
            let mut sums: HashMap<i64, f64> = HashMap::new();
            for (c, p) in clusters.iter().zip(psi) {
                *sums.entry(*c).or_insert(0.0) += p;
            }
            sums.values().map(|s| s * s).sum::<f64>() / n
        }
    };
    meat / (jacobian * jacobian) / n
}

impl<M: CausalModel> DoubleML<M> {
    /// Validate the configuration, data and model and draw the sample splitting.
    ///
    /// * `data` - Dataset with variable roles.
    /// * `model` - The causal model, holding its learners.
    /// * `cfg` - Cross-fitting configuration.
    pub fn new(data: DoubleMLData, model: M, cfg: DoubleMLConfig) -> Result<Self, DoubleMLError> {
        cfg.validate()?;
        model.check_data(&data)?;
        let mut dml = DoubleML {
            data,
            model,
            cfg,
            smpls: None,
            strata: None,
            fitted: None,
        };
        if dml.cfg.draw_sample_splitting {
            dml.smpls = Some(dml.draw_sample_splitting()?);
        } else if dml.data.n_obs() < dml.cfg.n_folds {
            return Err(DoubleMLError::invalid(
                "n_folds",
                format!("at most the number of observations ({})", dml.data.n_obs()),
                dml.cfg.n_folds,
            ));
        }
        Ok(dml)
    }

    fn draw_sample_splitting(&self) -> Result<SampleSplitting, DoubleMLError> {
        let mut resampling = DoubleMLResampling::new(self.cfg.n_folds, self.cfg.n_rep, self.data.n_obs())?;
        if let Some(clusters) = self.data.clusters() {
            if self.strata.is_some() {
                return Err(DoubleMLError::invalid(
                    "strata",
                    "no stratification for cluster data",
                    "strata",
                ));
            }
            resampling = resampling.cluster(clusters.to_vec())?;
        } else if let Some(groups) = &self.strata {
            resampling = resampling.stratify(groups.clone())?;
        }
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        Ok(resampling.split(&mut rng))
    }

    /// Use an externally drawn sample splitting. Fold and repetition counts
    /// are taken from it.
    pub fn set_sample_splitting(&mut self, smpls: SampleSplitting) -> Result<(), DoubleMLError> {
        smpls.validate()?;
        if smpls.n_obs() != self.data.n_obs() {
            return Err(DoubleMLError::invalid(
                "sample splitting",
                format!("partitions of {} observations", self.data.n_obs()),
                smpls.n_obs(),
            ));
        }
        self.cfg.n_folds = smpls.n_folds();
        self.cfg.n_rep = smpls.n_rep();
        self.smpls = Some(smpls);
        self.fitted = None;
        Ok(())
    }

    /// Redraw the sample splitting stratified by `groups`.
    pub fn set_strata(&mut self, groups: Vec<i64>) -> Result<(), DoubleMLError> {
        self.strata = Some(groups);
        match self.draw_sample_splitting() {
            Ok(smpls) => {
                self.smpls = Some(smpls);
                self.fitted = None;
                Ok(())
            }
            Err(e) => {
                self.strata = None;
                Err(e)
            }
        }
    }

    pub fn data(&self) -> &DoubleMLData {
        &self.data
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn cfg(&self) -> &DoubleMLConfig {
        &self.cfg
    }

    pub fn smpls(&self) -> Option<&SampleSplitting> {
        self.smpls.as_ref()
    }

    /// Estimate the causal parameter of every treatment column.
    pub fn fit(&mut self) -> Result<&CausalEstimate, DoubleMLError> {
        self.fit_with_external(None)
    }

    /// Estimate the causal parameters, using `external` in place of fitting
    /// for the nuisances it contains.
    pub fn fit_with_external(
        &mut self,
        external: Option<&ExternalPredictions>,
    ) -> Result<&CausalEstimate, DoubleMLError> {
        let start = Instant::now();
        let smpls = self.smpls.as_ref().ok_or_else(|| {
            DoubleMLError::invalid(
                "sample splitting",
                "a drawn or supplied sample splitting",
                "none",
            )
        })?;
        let n_obs = self.data.n_obs();
        let n_rep = smpls.n_rep();
        if let Some(external) = external {
            external.validate(self.data.d_cols(), &self.model.prediction_names(), n_rep, n_obs)?;
        }

        let num_threads = match self.cfg.num_threads {
            Some(num_threads) => num_threads,
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| DoubleMLError::invalid("num_threads", "a buildable thread pool", e))?;

        info!(
            "Fitting {} with {} observations, {} treatment(s), {} folds and {} repetition(s).",
            self.model.name(),
            n_obs,
            self.data.n_treat(),
            smpls.n_folds(),
            n_rep
        );

        let n_treat = self.data.n_treat();
        let mut fits: Vec<Vec<RepetitionFit>> = Vec::with_capacity(n_treat);
        for j in 0..n_treat {
            let treatment = &self.data.d_cols()[j];
            let (features, n_features) = self.data.features(j, self.cfg.use_other_treat_as_covariate);
            let view = TreatmentView {
                treatment,
                x: Matrix::new(&features, n_obs, n_features),
                y: self.data.y(),
                d: self.data.d(j),
                z: (self.data.n_instr() > 0).then(|| self.data.z(0)),
                n_obs,
            };
            let mut by_rep = Vec::with_capacity(n_rep);
            for (rep, folds) in smpls.iter().enumerate() {
                let ext = external
                    .map(|e| e.for_repetition(treatment, rep))
                    .unwrap_or_default();
                let fitter = CrossFitter::new(&view.x, folds, rep, &pool, ext, self.cfg.store_models);
                let estimate = self.model.estimate_nuisance(&view, &fitter)?;
                let fit = self.solve_repetition(estimate, folds, treatment, rep)?;
                by_rep.push(fit);
            }
            fits.push(by_rep);
        }

        let fitted = self.aggregate(fits, n_obs);
        info!(
            "Finished fitting {} in {} seconds: {}",
            self.model.name(),
            start.elapsed().as_secs_f32(),
            fitted.estimate
        );
        Ok(&self.fitted.insert(fitted).estimate)
    }

    fn solve_repetition(
        &self,
        estimate: NuisanceEstimate,
        folds: &[Fold],
        treatment: &str,
        rep: usize,
    ) -> Result<RepetitionFit, DoubleMLError> {
        let score = estimate.score;
        let coef = match self.cfg.dml_procedure {
            DmlProcedure::Dml1 => {
                let roots = folds
                    .iter()
                    .map(|fold| solve_score(&score, Some(fold.test.as_slice())))
                    .collect::<Result<Vec<f64>, DoubleMLError>>()?;
                mean(&roots)
            }
            DmlProcedure::Dml2 => solve_score(&score, None)?,
        };
        let psi = score.psi(coef);
        let jacobian = mean(&score.psi_deriv(coef));
        if jacobian.abs() < JACOBIAN_EPS {
            warn!(
                "Mean score derivative of {} in repetition {} is {:e}; the variance estimate is unreliable.",
                treatment, rep, jacobian
            );
        }
        let se = repetition_variance(&psi, jacobian, self.data.clusters()).sqrt();
        debug!("Repetition {} of {}: coef {:.6}, se {:.6}", rep, treatment, coef, se);

        let elements = if self.cfg.store_predictions {
            score.elements()
        } else {
            ScoreElements::new()
        };
        Ok(RepetitionFit {
            coef,
            se,
            psi,
            jacobian,
            predictions: estimate.predictions,
            models: estimate.models,
            elements,
        })
    }

    fn aggregate(&self, fits: Vec<Vec<RepetitionFit>>, n_obs: usize) -> Fitted {
        let n_treat = fits.len();
        let mut coef = Vec::with_capacity(n_treat);
        let mut se = Vec::with_capacity(n_treat);
        let mut all_coef = Vec::with_capacity(n_treat);
        let mut all_se = Vec::with_capacity(n_treat);
        let mut psi = Vec::with_capacity(n_treat);
        let mut jacobian = Vec::with_capacity(n_treat);
        let mut predictions = Vec::new();
        let mut score_elements = Vec::new();
        let mut models = Vec::new();

        for (j, by_rep) in fits.into_iter().enumerate() {
            let rep_coef: Vec<f64> = by_rep.iter().map(|f| f.coef).collect();
            let rep_se: Vec<f64> = by_rep.iter().map(|f| f.se).collect();
            let (c, s) = aggregate_repetitions(&rep_coef, &rep_se, n_obs);
            if by_rep.len() > 1 && s > 2.0 * median(&rep_se) {
                warn!(
                    "Estimates of {} disagree strongly across repetitions: {:?}",
                    self.data.d_cols()[j],
                    rep_coef
                );
            }
            coef.push(c);
            se.push(s);
            all_coef.push(rep_coef);
            all_se.push(rep_se);
            jacobian.push(by_rep.iter().map(|f| f.jacobian).collect());

            let mut treat_psi = Vec::with_capacity(by_rep.len());
            let mut treat_predictions = Vec::new();
            let mut treat_elements = Vec::new();
            let mut treat_models = Vec::new();
            for fit in by_rep {
                treat_psi.push(fit.psi);
                if self.cfg.store_predictions {
                    treat_predictions.push(fit.predictions);
                    treat_elements.push(fit.elements);
                }
                if self.cfg.store_models {
                    treat_models.push(fit.models);
                }
            }
            psi.push(treat_psi);
            predictions.push(treat_predictions);
            score_elements.push(treat_elements);
            models.push(treat_models);
        }

        Fitted {
            estimate: CausalEstimate::new(
                self.data.d_cols().to_vec(),
                coef,
                se,
                all_coef,
                all_se,
                psi,
                jacobian,
                n_obs,
            ),
            predictions,
            score_elements,
            models,
        }
    }

    fn fitted(&self) -> Result<&Fitted, DoubleMLError> {
        self.fitted
            .as_ref()
            .ok_or_else(|| DoubleMLError::NotFitted(format!("call fit on {} first", self.model.name())))
    }

    /// The fitted parameters.
    pub fn estimate(&self) -> Result<&CausalEstimate, DoubleMLError> {
        Ok(&self.fitted()?.estimate)
    }

    pub fn coef(&self) -> Result<&[f64], DoubleMLError> {
        Ok(self.estimate()?.coef())
    }

    pub fn se(&self) -> Result<&[f64], DoubleMLError> {
        Ok(self.estimate()?.se())
    }

    /// See [`CausalEstimate::confint`].
    pub fn confint(&self, level: f64, joint: bool) -> Result<Vec<(f64, f64)>, DoubleMLError> {
        self.estimate()?.confint(level, joint)
    }

    /// See [`CausalEstimate::bootstrap`].
    pub fn bootstrap(
        &mut self,
        method: BootstrapMethod,
        n_rep_boot: usize,
        rng: &mut StdRng,
    ) -> Result<&BootstrapResult, DoubleMLError> {
        let name = self.model.name();
        self.fitted
            .as_mut()
            .ok_or_else(|| DoubleMLError::NotFitted(format!("call fit on {} first", name)))?
            .estimate
            .bootstrap(method, n_rep_boot, rng)
    }

    /// See [`CausalEstimate::p_adjust`].
    pub fn p_adjust(&self, method: PAdjustMethod) -> Result<Vec<f64>, DoubleMLError> {
        self.estimate()?.p_adjust(method)
    }

    /// See [`CausalEstimate::summary`].
    pub fn summary(&self, level: f64) -> Result<Summary, DoubleMLError> {
        self.estimate()?.summary(level)
    }

    fn treatment_index(&self, treatment: &str) -> Result<usize, DoubleMLError> {
        self.data
            .d_cols()
            .iter()
            .position(|d| d == treatment)
            .ok_or_else(|| DoubleMLError::invalid("treatment", format!("one of {:?}", self.data.d_cols()), treatment))
    }

    fn stored<'a, T>(&self, table: &'a [Vec<T>], treatment: &str, rep: usize, flag: &str) -> Result<&'a T, DoubleMLError> {
        let j = self.treatment_index(treatment)?;
        table
            .get(j)
            .and_then(|r| r.get(rep))
            .ok_or_else(|| DoubleMLError::NotFitted(format!("{} is not set or repetition {} does not exist", flag, rep)))
    }

    /// Out-of-fold nuisance predictions of `treatment` in repetition `rep`.
    /// Requires `store_predictions`.
    pub fn predictions(&self, treatment: &str, rep: usize) -> Result<&NuisancePredictions, DoubleMLError> {
        self.stored(&self.fitted()?.predictions, treatment, rep, "store_predictions")
    }

    /// Score elements of `treatment` in repetition `rep`. Requires `store_predictions`.
    pub fn score_elements(&self, treatment: &str, rep: usize) -> Result<&ScoreElements, DoubleMLError> {
        self.stored(&self.fitted()?.score_elements, treatment, rep, "store_predictions")
    }

    /// Fitted learners per nuisance and fold. Requires `store_models`.
    pub fn models(&self, treatment: &str, rep: usize) -> Result<&FittedLearners, DoubleMLError> {
        self.stored(&self.fitted()?.models, treatment, rep, "store_models")
    }

    /// The stored predictions in the layout accepted by
    /// [`DoubleML::fit_with_external`].
    pub fn predictions_as_external(&self) -> Result<ExternalPredictions, DoubleMLError> {
        let fitted = self.fitted()?;
        let mut external = ExternalPredictions::new();
        for (j, treatment) in self.data.d_cols().iter().enumerate() {
            let by_rep = fitted
                .predictions
                .get(j)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| DoubleMLError::NotFitted("store_predictions is not set".to_string()))?;
            for name in self.model.prediction_names() {
                let reps: Option<Vec<Vec<f64>>> = by_rep.iter().map(|p| p.get(name).cloned()).collect();
                if let Some(reps) = reps {
                    external.insert(treatment, name, reps);
                }
            }
        }
        Ok(external)
    }
}
