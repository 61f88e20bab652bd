//! Interactive Regression Model (IRM)
//!
//! $$Y = g(D, X) + U, \quad D = m(X) + V$$
//!
//! for a binary treatment `D`. The doubly robust score combines the outcome
//! regressions in both treatment arms with the inverse propensity weights.
use crate::blp::BestLinearPredictor;
use crate::causal::{mask_eq, require_no_instruments, require_single_binary_treatment};
use crate::constants::IRM_TRIMMING_THRESHOLD;
use crate::data::{DoubleMLData, TreatmentView};
use crate::double_ml::{CausalModel, DoubleML};
use crate::errors::DoubleMLError;
use crate::learner::{check_learner, Learner, LearnerRole, PredictMethod};
use crate::nuisance::{CrossFitter, NuisanceCollector, NuisanceEstimate, NuisanceTask, Trimming};
use crate::score::{LinearScore, Score};
use crate::utils::{is_binary, mean};
use serde::{Deserialize, Serialize};

/// Target parameter of the interactive regression model.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum IrmScore {
    /// Average treatment effect.
    #[default]
    Ate,
    /// Average treatment effect on the treated.
    Atte,
}

/// Interactive regression model for a binary treatment.
pub struct Irm {
    ml_g: Box<dyn Learner>,
    ml_m: Box<dyn Learner>,
    g_method: PredictMethod,
    score: IrmScore,
    trimming: Trimming,
}

impl Irm {
    /// * `ml_g` - Learner for `E[Y|X, D=d]`; a classifier is accepted for a binary outcome.
    /// * `ml_m` - Classifier for the propensity `P(D=1|X)`.
    /// * `score` - Target parameter.
    pub fn new(ml_g: Box<dyn Learner>, ml_m: Box<dyn Learner>, score: IrmScore) -> Result<Self, DoubleMLError> {
        let g_method = check_learner(ml_g.as_ref(), "ml_g", LearnerRole::RegressorOrClassifier)?;
        check_learner(ml_m.as_ref(), "ml_m", LearnerRole::Classifier)?;
        Ok(Irm {
            ml_g,
            ml_m,
            g_method,
            score,
            trimming: Trimming::truncate(IRM_TRIMMING_THRESHOLD)?,
        })
    }

    /// Replace the propensity trimming.
    pub fn with_trimming(mut self, trimming: Trimming) -> Self {
        self.trimming = trimming;
        self
    }

    pub fn score(&self) -> IrmScore {
        self.score
    }

    pub fn trimming(&self) -> Trimming {
        self.trimming
    }

    fn outcome_task<'a>(&'a self, name: &'a str, view: &TreatmentView<'a>, mask: &'a [bool]) -> NuisanceTask<'a> {
        NuisanceTask {
            name,
            learner: self.ml_g.as_ref(),
            target: view.y,
            method: self.g_method,
            train_mask: Some(mask),
            trimming: None,
        }
    }
}

impl CausalModel for Irm {
    fn name(&self) -> &'static str {
        "IRM"
    }

    fn nuisance_names(&self) -> Vec<&'static str> {
        match self.score {
            IrmScore::Ate => vec!["ml_g0", "ml_g1", "ml_m"],
            IrmScore::Atte => vec!["ml_g0", "ml_m"],
        }
    }

    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError> {
        require_single_binary_treatment(data, "IRM")?;
        require_no_instruments(data, "IRM")?;
        if self.g_method == PredictMethod::PredictProba && !is_binary(data.y()) {
            return Err(DoubleMLError::IncompatibleData(
                "the learner ml_g is a classifier but the outcome is not binary with values 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    fn estimate_nuisance(&self, view: &TreatmentView, fitter: &CrossFitter) -> Result<NuisanceEstimate, DoubleMLError> {
        let d0 = mask_eq(view.d, 0.0);
        let d1 = mask_eq(view.d, 1.0);
        let mut collector = NuisanceCollector::default();

        let g0 = collector.record("ml_g0", fitter.predict(&self.outcome_task("ml_g0", view, &d0))?);
        let g1 = match self.score {
            IrmScore::Ate => Some(collector.record("ml_g1", fitter.predict(&self.outcome_task("ml_g1", view, &d1))?)),
            IrmScore::Atte => None,
        };
        let m = collector.record(
            "ml_m",
            fitter.predict(&NuisanceTask {
                name: "ml_m",
                learner: self.ml_m.as_ref(),
                target: view.d,
                method: PredictMethod::PredictProba,
                train_mask: None,
                trimming: Some(self.trimming),
            })?,
        );

        let n = view.n_obs;
        let (psi_a, psi_b) = match g1 {
            Some(g1) => {
                let psi_b = (0..n)
                    .map(|i| {
                        let (y, d) = (view.y[i], view.d[i]);
                        g1[i] - g0[i] + d * (y - g1[i]) / m[i] - (1.0 - d) * (y - g0[i]) / (1.0 - m[i])
                    })
                    .collect();
                (vec![-1.0; n], psi_b)
            }
            None => {
                let p = mean(view.d);
                let psi_a = view.d.iter().map(|d| -d / p).collect();
                let psi_b = (0..n)
                    .map(|i| {
                        let (y, d) = (view.y[i], view.d[i]);
                        d * (y - g0[i]) / p - m[i] * (1.0 - d) * (y - g0[i]) / (p * (1.0 - m[i]))
                    })
                    .collect();
                (psi_a, psi_b)
            }
        };
        Ok(collector.finish(Score::Linear(LinearScore::new(psi_a, psi_b))))
    }
}

impl DoubleML<Irm> {
    /// Conditional average treatment effect as the best linear predictor of
    /// the doubly robust signal on `basis` (columns, one value per observation).
    ///
    /// Requires the ATE score and a single repetition.
    pub fn cate(&self, basis: Vec<Vec<f64>>) -> Result<BestLinearPredictor, DoubleMLError> {
        if self.model().score() != IrmScore::Ate {
            return Err(DoubleMLError::invalid("score", "Ate for a conditional effect", "Atte"));
        }
        let estimate = self.estimate()?;
        if estimate.n_rep() != 1 {
            return Err(DoubleMLError::invalid(
                "n_rep",
                "a single repetition for a conditional effect",
                estimate.n_rep(),
            ));
        }
        // psi_a is -1, so psi_b = psi + theta.
        let theta = estimate.all_coef()[0][0];
        let signal = estimate.psi()[0][0].iter().map(|p| p + theta).collect();
        BestLinearPredictor::new(signal, basis)?.fit()
    }
}
