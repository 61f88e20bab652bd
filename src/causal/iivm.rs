//! Interactive IV Model (IIVM)
//!
//! Local average treatment effect for a binary treatment `D` and a binary
//! instrument `Z`: the intention-to-treat effect on `Y` divided by the
//! effect of `Z` on treatment uptake.
use crate::causal::{instrument, mask_eq, require_single_binary_instrument, require_single_binary_treatment};
use crate::constants::IRM_TRIMMING_THRESHOLD;
use crate::data::{DoubleMLData, TreatmentView};
use crate::double_ml::CausalModel;
use crate::errors::DoubleMLError;
use crate::learner::{check_learner, Learner, LearnerRole, PredictMethod};
use crate::nuisance::{CrossFitter, NuisanceCollector, NuisanceEstimate, NuisanceTask, Trimming};
use crate::score::{LinearScore, Score};
use crate::utils::is_binary;
use serde::{Deserialize, Serialize};

/// Which non-complier groups may exist.
///
/// Without always-takers `P(D=1|X, Z=0)` is fixed at 0; without never-takers
/// `P(D=1|X, Z=1)` is fixed at 1. The corresponding learner is not fitted.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Subgroups {
    pub always_takers: bool,
    pub never_takers: bool,
}

impl Default for Subgroups {
    fn default() -> Self {
        Subgroups {
            always_takers: true,
            never_takers: true,
        }
    }
}

/// Interactive IV model.
pub struct Iivm {
    ml_g: Box<dyn Learner>,
    ml_m: Box<dyn Learner>,
    ml_r: Box<dyn Learner>,
    g_method: PredictMethod,
    subgroups: Subgroups,
    trimming: Trimming,
}

impl Iivm {
    /// * `ml_g` - Learner for `E[Y|X, Z=z]`; a classifier is accepted for a binary outcome.
    /// * `ml_m` - Classifier for the instrument propensity `P(Z=1|X)`.
    /// * `ml_r` - Classifier for the treatment uptake `P(D=1|X, Z=z)`.
    pub fn new(ml_g: Box<dyn Learner>, ml_m: Box<dyn Learner>, ml_r: Box<dyn Learner>) -> Result<Self, DoubleMLError> {
        let g_method = check_learner(ml_g.as_ref(), "ml_g", LearnerRole::RegressorOrClassifier)?;
        check_learner(ml_m.as_ref(), "ml_m", LearnerRole::Classifier)?;
        check_learner(ml_r.as_ref(), "ml_r", LearnerRole::Classifier)?;
        Ok(Iivm {
            ml_g,
            ml_m,
            ml_r,
            g_method,
            subgroups: Subgroups::default(),
            trimming: Trimming::truncate(IRM_TRIMMING_THRESHOLD)?,
        })
    }

    pub fn with_subgroups(mut self, subgroups: Subgroups) -> Self {
        self.subgroups = subgroups;
        self
    }

    pub fn with_trimming(mut self, trimming: Trimming) -> Self {
        self.trimming = trimming;
        self
    }
}

fn subgroup_task<'a>(
    name: &'a str,
    learner: &'a dyn Learner,
    target: &'a [f64],
    method: PredictMethod,
    mask: &'a [bool],
) -> NuisanceTask<'a> {
    NuisanceTask {
        name,
        learner,
        target,
        method,
        train_mask: Some(mask),
        trimming: None,
    }
}

impl CausalModel for Iivm {
    fn name(&self) -> &'static str {
        "IIVM"
    }

    fn nuisance_names(&self) -> Vec<&'static str> {
        let mut names = vec!["ml_g0", "ml_g1", "ml_m"];
        if self.subgroups.always_takers {
            names.push("ml_r0");
        }
        if self.subgroups.never_takers {
            names.push("ml_r1");
        }
        names
    }

    fn check_data(&self, data: &DoubleMLData) -> Result<(), DoubleMLError> {
        require_single_binary_treatment(data, "IIVM")?;
        require_single_binary_instrument(data, "IIVM")?;
        if self.g_method == PredictMethod::PredictProba && !is_binary(data.y()) {
            return Err(DoubleMLError::IncompatibleData(
                "the learner ml_g is a classifier but the outcome is not binary with values 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    fn estimate_nuisance(&self, view: &TreatmentView, fitter: &CrossFitter) -> Result<NuisanceEstimate, DoubleMLError> {
        let z = instrument(view, "IIVM")?;
        let z0 = mask_eq(z, 0.0);
        let z1 = mask_eq(z, 1.0);
        let mut collector = NuisanceCollector::default();

        let (ml_g, ml_r) = (self.ml_g.as_ref(), self.ml_r.as_ref());
        let proba = PredictMethod::PredictProba;

        let g0 = fitter.predict(&subgroup_task("ml_g0", ml_g, view.y, self.g_method, &z0))?;
        let g0 = collector.record("ml_g0", g0);
        let g1 = fitter.predict(&subgroup_task("ml_g1", ml_g, view.y, self.g_method, &z1))?;
        let g1 = collector.record("ml_g1", g1);
        let r0 = if self.subgroups.always_takers {
            let r0 = fitter.predict(&subgroup_task("ml_r0", ml_r, view.d, proba, &z0))?;
            collector.record("ml_r0", r0)
        } else {
            vec![0.0; view.n_obs]
        };
        let r1 = if self.subgroups.never_takers {
            let r1 = fitter.predict(&subgroup_task("ml_r1", ml_r, view.d, proba, &z1))?;
            collector.record("ml_r1", r1)
        } else {
            vec![1.0; view.n_obs]
        };
        let m = collector.record(
            "ml_m",
            fitter.predict(&NuisanceTask {
                name: "ml_m",
                learner: self.ml_m.as_ref(),
                target: z,
                method: PredictMethod::PredictProba,
                train_mask: None,
                trimming: Some(self.trimming),
            })?,
        );

        let mut psi_a = Vec::with_capacity(view.n_obs);
        let mut psi_b = Vec::with_capacity(view.n_obs);
        for i in 0..view.n_obs {
            let (y, d, zi, mi) = (view.y[i], view.d[i], z[i], m[i]);
            psi_b.push(g1[i] - g0[i] + zi * (y - g1[i]) / mi - (1.0 - zi) * (y - g0[i]) / (1.0 - mi));
            psi_a.push(-(r1[i] - r0[i] + zi * (d - r1[i]) / mi - (1.0 - zi) * (d - r0[i]) / (1.0 - mi)));
        }
        Ok(collector.finish(Score::Linear(LinearScore::new(psi_a, psi_b))))
    }
}
