//! Nuisance estimation
//!
//! The cross-fitting driver: for every fold of a repetition it fits a fresh
//! copy of a learner on the training indices and predicts on the test
//! indices. Folds are independent and run in parallel on a rayon pool; their
//! outputs are assembled into one immutable prediction vector per nuisance
//! once every fold of the repetition has finished.
use crate::data::Matrix;
use crate::errors::DoubleMLError;
use crate::learner::{Learner, PredictMethod};
use crate::resampling::Fold;
use crate::score::Score;
use crate::utils::validate_open_interval;
use hashbrown::HashMap;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// Out-of-fold predictions for one repetition, keyed by nuisance name.
pub type NuisancePredictions = HashMap<String, Vec<f64>>;

/// Fitted learners of one repetition, keyed by nuisance name, one per fold.
pub type FittedLearners = HashMap<String, Vec<Box<dyn Learner>>>;

/// How probability predictions are kept away from 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrimmingRule {
    /// Clip to `[threshold, 1 - threshold]`.
    #[default]
    Truncate,
}

/// Trimming applied to probability-valued nuisance predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trimming {
    pub rule: TrimmingRule,
    pub threshold: f64,
}

impl Trimming {
    /// * `threshold` - Must lie strictly between 0 and 0.5.
    pub fn new(rule: TrimmingRule, threshold: f64) -> Result<Self, DoubleMLError> {
        validate_open_interval(threshold, 0.0, 0.5, "trimming_threshold")?;
        Ok(Trimming { rule, threshold })
    }

    pub fn truncate(threshold: f64) -> Result<Self, DoubleMLError> {
        Trimming::new(TrimmingRule::Truncate, threshold)
    }

    /// Trim in place. `NaN` entries (outside a fitted subgroup) stay `NaN`.
    pub fn apply(&self, values: &mut [f64]) {
        match self.rule {
            TrimmingRule::Truncate => {
                let (lo, hi) = (self.threshold, 1.0 - self.threshold);
                for v in values.iter_mut().filter(|v| !v.is_nan()) {
                    *v = v.clamp(lo, hi);
                }
            }
        }
    }
}

/// Externally computed nuisance predictions.
///
/// Indexed by treatment column name, then nuisance name, then
/// `[repetition][observation]`. Any nuisance found here is not fitted by
/// the driver; its values are used as they are, after trimming.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalPredictions {
    inner: HashMap<String, HashMap<String, Vec<Vec<f64>>>>,
}

impl ExternalPredictions {
    pub fn new() -> Self {
        ExternalPredictions::default()
    }

    /// Register predictions for `nuisance` of `treatment`, one vector per repetition.
    pub fn insert(&mut self, treatment: &str, nuisance: &str, predictions: Vec<Vec<f64>>) {
        self.inner
            .entry(treatment.to_string())
            .or_default()
            .insert(nuisance.to_string(), predictions);
    }

    pub fn get(&self, treatment: &str, nuisance: &str) -> Option<&[Vec<f64>]> {
        self.inner
            .get(treatment)
            .and_then(|m| m.get(nuisance))
            .map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values().all(|m| m.is_empty())
    }

    /// The predictions of `treatment` for repetition `rep`.
    pub fn for_repetition(&self, treatment: &str, rep: usize) -> NuisancePredictions {
        self.inner
            .get(treatment)
            .map(|m| m.iter().map(|(name, reps)| (name.clone(), reps[rep].clone())).collect())
            .unwrap_or_default()
    }

    /// Check names and shapes against the model being fitted.
    pub fn validate(
        &self,
        treatments: &[String],
        nuisances: &[&str],
        n_rep: usize,
        n_obs: usize,
    ) -> Result<(), DoubleMLError> {
        for (treatment, by_nuisance) in &self.inner {
            if !treatments.contains(treatment) {
                return Err(DoubleMLError::invalid(
                    "external_predictions",
                    format!("treatment names among {:?}", treatments),
                    treatment,
                ));
            }
            for (nuisance, reps) in by_nuisance {
                if !nuisances.contains(&nuisance.as_str()) {
                    return Err(DoubleMLError::invalid(
                        "external_predictions",
                        format!("nuisance names among {:?}", nuisances),
                        nuisance,
                    ));
                }
                if reps.len() != n_rep || reps.iter().any(|r| r.len() != n_obs) {
                    return Err(DoubleMLError::invalid(
                        "external_predictions",
                        format!("{} repetitions of {} predictions for {}", n_rep, n_obs, nuisance),
                        format!("{} repetitions", reps.len()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Fit a fresh copy of `learner` on `train` and predict on `predict_rows`.
///
/// Returns the predictions in the order of `predict_rows` and the fitted copy.
#[allow(clippy::too_many_arguments)]
pub fn fit_predict(
    name: &str,
    fold: usize,
    learner: &dyn Learner,
    x: &Matrix<f64>,
    train: &[usize],
    y_train: &[f64],
    predict_rows: &[usize],
    method: PredictMethod,
) -> Result<(Vec<f64>, Box<dyn Learner>), DoubleMLError> {
    let wrap = |e: DoubleMLError| match e {
        DoubleMLError::IncompatibleLearner { .. } => e,
        other => DoubleMLError::LearnerFailure {
            nuisance: name.to_string(),
            fold,
            reason: other.to_string(),
        },
    };

    let x_train_data = x.select_rows(train);
    let x_train = Matrix::new(&x_train_data, train.len(), x.cols);
    let mut model = learner.clone_learner();
    model.fit(&x_train, y_train).map_err(wrap)?;

    let x_pred_data = x.select_rows(predict_rows);
    let x_pred = Matrix::new(&x_pred_data, predict_rows.len(), x.cols);
    let preds = match method {
        PredictMethod::Predict => model.predict(&x_pred),
        PredictMethod::PredictProba => model.predict_proba(&x_pred),
    }
    .map_err(wrap)?;

    if preds.len() != predict_rows.len() {
        return Err(DoubleMLError::LearnerFailure {
            nuisance: name.to_string(),
            fold,
            reason: format!("returned {} predictions for {} rows", preds.len(), predict_rows.len()),
        });
    }
    Ok((preds, model))
}

/// A single nuisance function to cross-fit.
pub struct NuisanceTask<'a> {
    pub name: &'a str,
    pub learner: &'a dyn Learner,
    pub target: &'a [f64],
    pub method: PredictMethod,
    /// Restrict training to observations where the mask is `true`.
    pub train_mask: Option<&'a [bool]>,
    pub trimming: Option<Trimming>,
}

/// Predictions of one nuisance for a full repetition.
pub struct NuisanceOutput {
    pub predictions: Vec<f64>,
    /// Fitted learner per fold, if retention was requested.
    pub models: Option<Vec<Box<dyn Learner>>>,
}

/// What a model hands back after estimating the nuisances of one repetition.
pub struct NuisanceEstimate {
    pub predictions: NuisancePredictions,
    pub models: FittedLearners,
    pub score: Score,
}

impl NuisanceEstimate {
    pub fn new(score: Score) -> Self {
        NuisanceEstimate {
            predictions: NuisancePredictions::new(),
            models: FittedLearners::new(),
            score,
        }
    }
}

/// Collects nuisance outputs while a model assembles its score.
#[derive(Default)]
pub struct NuisanceCollector {
    pub predictions: NuisancePredictions,
    pub models: FittedLearners,
}

impl NuisanceCollector {
    /// Store `output` under `name` and return its predictions for score assembly.
    pub fn record(&mut self, name: &str, output: NuisanceOutput) -> Vec<f64> {
        if let Some(models) = output.models {
            self.models.insert(name.to_string(), models);
        }
        self.predictions.insert(name.to_string(), output.predictions.clone());
        output.predictions
    }

    pub fn finish(self, score: Score) -> NuisanceEstimate {
        NuisanceEstimate {
            predictions: self.predictions,
            models: self.models,
            score,
        }
    }
}

/// Cross-fitting driver for one repetition of one treatment.
pub struct CrossFitter<'a> {
    x: &'a Matrix<'a, f64>,
    folds: &'a [Fold],
    rep: usize,
    pool: &'a ThreadPool,
    external: NuisancePredictions,
    store_models: bool,
}

impl<'a> CrossFitter<'a> {
    pub fn new(
        x: &'a Matrix<'a, f64>,
        folds: &'a [Fold],
        rep: usize,
        pool: &'a ThreadPool,
        external: NuisancePredictions,
        store_models: bool,
    ) -> Self {
        CrossFitter {
            x,
            folds,
            rep,
            pool,
            external,
            store_models,
        }
    }

    pub fn x(&self) -> &Matrix<'a, f64> {
        self.x
    }

    pub fn folds(&self) -> &[Fold] {
        self.folds
    }

    pub fn rep(&self) -> usize {
        self.rep
    }

    pub fn n_obs(&self) -> usize {
        self.x.rows
    }

    pub fn store_models(&self) -> bool {
        self.store_models
    }

    /// Externally supplied predictions for `name`, if any.
    pub fn external(&self, name: &str) -> Option<&[f64]> {
        self.external.get(name).map(|v| v.as_slice())
    }

    /// Run `f` on every fold in parallel; results come back in fold order.
    pub fn map_folds<T, F>(&self, f: F) -> Result<Vec<T>, DoubleMLError>
    where
        T: Send,
        F: Fn(usize, &Fold) -> Result<T, DoubleMLError> + Sync + Send,
    {
        self.pool.install(|| {
            self.folds
                .par_iter()
                .enumerate()
                .map(|(k, fold)| f(k, fold))
                .collect::<Result<Vec<T>, DoubleMLError>>()
        })
    }

    /// Cross-fit a nuisance: out-of-fold predictions for every observation.
    pub fn predict(&self, task: &NuisanceTask) -> Result<NuisanceOutput, DoubleMLError> {
        if let Some(values) = self.external(task.name) {
            let mut predictions = values.to_vec();
            if let Some(trimming) = task.trimming {
                trimming.apply(&mut predictions);
            }
            return Ok(NuisanceOutput {
                predictions,
                models: None,
            });
        }

        let results = self.map_folds(|k, fold| {
            let train: Vec<usize> = match task.train_mask {
                Some(mask) => fold.train.iter().filter(|i| mask[**i]).copied().collect(),
                None => fold.train.clone(),
            };
            if train.is_empty() {
                return Err(DoubleMLError::DegenerateFold {
                    nuisance: task.name.to_string(),
                    rep: self.rep,
                    fold: k,
                    reason: "no training observations in the required subgroup".to_string(),
                });
            }
            let y_train: Vec<f64> = train.iter().map(|i| task.target[*i]).collect();
            fit_predict(task.name, k, task.learner, self.x, &train, &y_train, &fold.test, task.method)
        })?;

        let mut predictions = vec![f64::NAN; self.n_obs()];
        let mut models = Vec::with_capacity(results.len());
        for (fold, (preds, model)) in self.folds.iter().zip(results) {
            for (i, p) in fold.test.iter().zip(preds) {
                predictions[*i] = p;
            }
            models.push(model);
        }
        if let Some(trimming) = task.trimming {
            trimming.apply(&mut predictions);
        }
        Ok(NuisanceOutput {
            predictions,
            models: self.store_models.then_some(models),
        })
    }
}
