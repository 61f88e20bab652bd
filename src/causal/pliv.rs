//! Partially Linear IV Regression (PLIV)
//!
//! $$Y = D \theta + g(X) + \zeta, \quad Z = m(X) + V$$
//!
//! with a single continuous or binary instrument `Z`.
use crate::causal::instrument;
use crate::data::{DoubleMLData, TreatmentView};
use crate::double_ml::CausalModel;
use crate::errors::DoubleMLError;
use crate::learner::{check_learner, Learner, LearnerRole, PredictMethod};
use crate::nuisance::{CrossFitter, NuisanceCollector, NuisanceEstimate, NuisanceTask};
use crate::score::{LinearScore, Score};

/// Partially linear IV model with the partialling out score.
pub struct Pliv {
    ml_l: Box<dyn Learner>,
    ml_m: Box<dyn Learner>,
    ml_r: Box<dyn Learner>,
}

impl Pliv {
    /// * `ml_l` - Regressor for `E[Y|X]`.
    /// * `ml_m` - Regressor for `E[Z|X]`.
    /// * `ml_r` - Regressor for `E[D|X]`.
    pub fn new(ml_l: Box<dyn Learner>, ml_m: Box<dyn Learner>, ml_r: Box<dyn Learner>) -> Result<Self, DoubleMLError> {
        check_learner(ml_l.as_ref(), "ml_l", LearnerRole::Regressor)?;
        check_learner(ml_m.as_ref(), "ml_m", LearnerRole::Regressor)?;
        check_learner(ml_r.as_ref(), "ml_r", LearnerRole::Regressor)?;
        Ok(Pliv { ml_l, ml_m, ml_r })
    }
}

fn regression<'a>(name: &'a str, learner: &'a dyn Learner, target: &'a [f64]) -> NuisanceTask<'a> {
    NuisanceTask {
        name,
        learner,
        target,
        method: PredictMethod::Predict,
        train_mask: None,
        trimming: None,
    }
}

impl CausalModel for Pliv {
    fn name(&self) -> &'static str {
        "PLIV"
    }

    fn nuisance_names(&self) -> Vec<&'static str> {
        vec!["ml_l", "ml_m", "ml_r"]
    }

    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError> {
        if data.n_instr() != 1 {
            return Err(DoubleMLError::IncompatibleData(format!(
                "PLIV requires exactly one instrumental variable, {} were specified",
                data.n_instr()
            )));
        }
        Ok(())
    }

    fn estimate_nuisance(&self, view: &TreatmentView, fitter: &CrossFitter) -> Result<NuisanceEstimate, DoubleMLError> {
        let z = instrument(view, "PLIV")?;
        let mut collector = NuisanceCollector::default();
        let l_hat = collector.record("ml_l", fitter.predict(&regression("ml_l", self.ml_l.as_ref(), view.y))?);
        let m_hat = collector.record("ml_m", fitter.predict(&regression("ml_m", self.ml_m.as_ref(), z))?);
        let r_hat = collector.record("ml_r", fitter.predict(&regression("ml_r", self.ml_r.as_ref(), view.d))?);

        let w: Vec<f64> = z.iter().zip(&m_hat).map(|(z, m)| z - m).collect();
        let psi_a = w
            .iter()
            .zip(view.d)
            .zip(&r_hat)
            .map(|((w, d), r)| -(d - r) * w)
            .collect();
        let psi_b = w
            .iter()
            .zip(view.y)
            .zip(&l_hat)
            .map(|((w, y), l)| (y - l) * w)
            .collect();
        Ok(collector.finish(Score::Linear(LinearScore::new(psi_a, psi_b))))
    }
}
