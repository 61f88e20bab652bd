//! Partially Linear Regression (PLR)
//!
//! $$Y = D \theta + g(X) + \zeta, \quad D = m(X) + V$$
//!
//! The score is built from the residuals of `E[Y|X]` and `E[D|X]`.
use crate::causal::require_no_instruments;
use crate::data::{DoubleMLData, TreatmentView};
use crate::double_ml::CausalModel;
use crate::errors::DoubleMLError;
use crate::learner::{check_learner, Learner, LearnerRole, PredictMethod};
use crate::nuisance::{CrossFitter, NuisanceCollector, NuisanceEstimate, NuisanceTask};
use crate::score::{LinearScore, Score};
use crate::utils::is_binary;
use log::warn;
use serde::{Deserialize, Serialize};

/// Score of the partially linear regression model.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlrScore {
    /// `psi_a = -v^2`, `psi_b = v u` with `u = y - l(X)`, `v = d - m(X)`.
    #[default]
    PartiallingOut,
    /// `psi_a = -v d`, `psi_b = v (y - g(X))`.
    IvType,
}

/// Partially linear regression model.
pub struct Plr {
    ml_l: Box<dyn Learner>,
    ml_m: Box<dyn Learner>,
    ml_g: Option<Box<dyn Learner>>,
    m_method: PredictMethod,
    score: PlrScore,
}

impl Plr {
    /// * `ml_l` - Regressor for `E[Y|X]`.
    /// * `ml_m` - Regressor for `E[D|X]`, or a classifier for a binary treatment.
    /// * `ml_g` - Regressor for `E[Y - D theta|X]`, used by the IV-type score.
    ///   Defaults to a copy of `ml_l` when missing.
    /// * `score` - Which orthogonal score to use.
    pub fn new(
        ml_l: Box<dyn Learner>,
        ml_m: Box<dyn Learner>,
        ml_g: Option<Box<dyn Learner>>,
        score: PlrScore,
    ) -> Result<Self, DoubleMLError> {
        check_learner(ml_l.as_ref(), "ml_l", LearnerRole::Regressor)?;
        let m_method = check_learner(ml_m.as_ref(), "ml_m", LearnerRole::RegressorOrClassifier)?;
        let ml_g = match (score, ml_g) {
            (PlrScore::IvType, Some(g)) => {
                check_learner(g.as_ref(), "ml_g", LearnerRole::Regressor)?;
                Some(g)
            }
            (PlrScore::IvType, None) => {
                warn!("No learner ml_g provided for the IV-type score; using a copy of ml_l.");
                Some(ml_l.clone_learner())
            }
            (PlrScore::PartiallingOut, Some(_)) => {
                warn!("A learner ml_g has been provided for the partialling out score but will be ignored.");
                None
            }
            (PlrScore::PartiallingOut, None) => None,
        };
        Ok(Plr {
            ml_l,
            ml_m,
            ml_g,
            m_method,
            score,
        })
    }

    pub fn score(&self) -> PlrScore {
        self.score
    }
}

impl CausalModel for Plr {
    fn name(&self) -> &'static str {
        "PLR"
    }

    fn nuisance_names(&self) -> Vec<&'static str> {
        match self.score {
            PlrScore::PartiallingOut => vec!["ml_l", "ml_m"],
            PlrScore::IvType => vec!["ml_l", "ml_m", "ml_g"],
        }
    }

    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError> {
        require_no_instruments(data, "PLR")?;
        if self.m_method == PredictMethod::PredictProba && (0..data.n_treat()).any(|j| !is_binary(data.d(j))) {
            return Err(DoubleMLError::IncompatibleData(
                "the learner ml_m is a classifier but the treatment is not binary with values 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    fn estimate_nuisance(&self, view: &TreatmentView, fitter: &CrossFitter) -> Result<NuisanceEstimate, DoubleMLError> {
        let mut collector = NuisanceCollector::default();
        let l_hat = collector.record(
            "ml_l",
            fitter.predict(&NuisanceTask {
                name: "ml_l",
                learner: self.ml_l.as_ref(),
                target: view.y,
                method: PredictMethod::Predict,
                train_mask: None,
                trimming: None,
            })?,
        );
        let m_hat = collector.record(
            "ml_m",
            fitter.predict(&NuisanceTask {
                name: "ml_m",
                learner: self.ml_m.as_ref(),
                target: view.d,
                method: self.m_method,
                train_mask: None,
                trimming: None,
            })?,
        );

        let u: Vec<f64> = view.y.iter().zip(&l_hat).map(|(y, l)| y - l).collect();
        let v: Vec<f64> = view.d.iter().zip(&m_hat).map(|(d, m)| d - m).collect();

        let score = match (self.score, &self.ml_g) {
            (PlrScore::IvType, Some(ml_g)) => {
                // preliminary partialling out estimate for the target of ml_g
                let theta_initial = v.iter().zip(&u).map(|(a, b)| a * b).sum::<f64>()
                    / v.iter().map(|a| a * a).sum::<f64>();
                let target: Vec<f64> = view
                    .y
                    .iter()
                    .zip(view.d)
                    .map(|(y, d)| y - theta_initial * d)
                    .collect();
                let g_hat = collector.record(
                    "ml_g",
                    fitter.predict(&NuisanceTask {
                        name: "ml_g",
                        learner: ml_g.as_ref(),
                        target: &target,
                        method: PredictMethod::Predict,
                        train_mask: None,
                        trimming: None,
                    })?,
                );
                let psi_a = v.iter().zip(view.d).map(|(v, d)| -v * d).collect();
                let psi_b = v
                    .iter()
                    .zip(view.y)
                    .zip(&g_hat)
                    .map(|((v, y), g)| v * (y - g))
                    .collect();
                LinearScore::new(psi_a, psi_b)
            }
            _ => {
                let psi_a = v.iter().map(|v| -v * v).collect();
                let psi_b = v.iter().zip(&u).map(|(v, u)| v * u).collect();
                LinearScore::new(psi_a, psi_b)
            }
        };
        Ok(collector.finish(Score::Linear(score)))
    }
}
