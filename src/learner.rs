//! Learner
//!
//! The capability contract for the machine learning models that estimate
//! nuisance functions. The crate never implements a learner itself; it only
//! calls `fit`, `predict` and `predict_proba` on caller supplied objects.
use crate::data::Matrix;
use crate::errors::DoubleMLError;

/// What a learner is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnerCapabilities {
    /// Provides `predict` for numeric targets.
    pub regressor: bool,
    /// Provides `predict_proba` for binary targets.
    pub classifier: bool,
}

impl LearnerCapabilities {
    pub fn regressor() -> Self {
        LearnerCapabilities {
            regressor: true,
            classifier: false,
        }
    }

    pub fn classifier() -> Self {
        LearnerCapabilities {
            regressor: false,
            classifier: true,
        }
    }
}

/// A pluggable regressor or classifier.
///
/// Implementations are cloned once per fold through [`Learner::clone_learner`],
/// so fitted state from one fold never leaks into another.
pub trait Learner: Send + Sync {
    /// Fit the learner on `x` (column-major) and target `y`.
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), DoubleMLError>;

    /// Numeric predictions, one per row of `x`.
    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DoubleMLError>;

    /// Probability of the positive class (label `1.0`), one per row of `x`.
    fn predict_proba(&self, _x: &Matrix<f64>) -> Result<Vec<f64>, DoubleMLError> {
        Err(DoubleMLError::learner(&self.name(), "predict_proba is not implemented"))
    }

    fn capabilities(&self) -> LearnerCapabilities;

    /// A fresh, unfitted copy carrying the same hyperparameters.
    fn clone_learner(&self) -> Box<dyn Learner>;

    fn name(&self) -> String {
        "learner".to_string()
    }
}

/// Which learner method produces a nuisance prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictMethod {
    Predict,
    PredictProba,
}

/// The role a learner plays for a nuisance function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerRole {
    Regressor,
    Classifier,
    /// Regressors predict; pure classifiers predict probabilities.
    RegressorOrClassifier,
}

/// Verify at construction time that `learner` can play `role`.
///
/// Returns the prediction method the driver must use for it.
pub fn check_learner(learner: &dyn Learner, name: &str, role: LearnerRole) -> Result<PredictMethod, DoubleMLError> {
    let caps = learner.capabilities();
    match role {
        LearnerRole::Regressor if caps.regressor => Ok(PredictMethod::Predict),
        LearnerRole::Regressor => Err(DoubleMLError::learner(
            name,
            format!("{} has no predict method for a regression task", learner.name()),
        )),
        LearnerRole::Classifier if caps.classifier => Ok(PredictMethod::PredictProba),
        LearnerRole::Classifier => Err(DoubleMLError::learner(
            name,
            format!("{} has no predict_proba method for a classification task", learner.name()),
        )),
        LearnerRole::RegressorOrClassifier => {
            if caps.classifier && !caps.regressor {
                Ok(PredictMethod::PredictProba)
            } else if caps.regressor {
                Ok(PredictMethod::Predict)
            } else {
                Err(DoubleMLError::learner(
                    name,
                    format!("{} provides neither predict nor predict_proba", learner.name()),
                ))
            }
        }
    }
}

/// Placeholder learner for nuisances whose predictions are supplied externally.
///
/// It claims every capability so construction succeeds, and fails if the
/// driver ever asks it to fit or predict.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyLearner;

impl Learner for DummyLearner {
    fn fit(&mut self, _x: &Matrix<f64>, _y: &[f64]) -> Result<(), DoubleMLError> {
        Err(DoubleMLError::learner(
            "DummyLearner",
            "fit was called; supply external predictions for this nuisance",
        ))
    }

    fn predict(&self, _x: &Matrix<f64>) -> Result<Vec<f64>, DoubleMLError> {
        Err(DoubleMLError::learner(
            "DummyLearner",
            "predict was called; supply external predictions for this nuisance",
        ))
    }

    fn predict_proba(&self, _x: &Matrix<f64>) -> Result<Vec<f64>, DoubleMLError> {
        Err(DoubleMLError::learner(
            "DummyLearner",
            "predict_proba was called; supply external predictions for this nuisance",
        ))
    }

    fn capabilities(&self) -> LearnerCapabilities {
        LearnerCapabilities {
            regressor: true,
            classifier: true,
        }
    }

    fn clone_learner(&self) -> Box<dyn Learner> {
        Box::new(*self)
    }

    fn name(&self) -> String {
        "DummyLearner".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_check_learner_roles() {
        let ols = OlsRegressor::default();
        let logit = LogisticClassifier::default();

        assert_eq!(
            check_learner(&ols, "ml_l", LearnerRole::Regressor).unwrap(),
            PredictMethod::Predict
        );
        assert_eq!(
            check_learner(&logit, "ml_m", LearnerRole::Classifier).unwrap(),
            PredictMethod::PredictProba
        );
        assert_eq!(
            check_learner(&logit, "ml_m", LearnerRole::RegressorOrClassifier).unwrap(),
            PredictMethod::PredictProba
        );
        assert!(matches!(
            check_learner(&ols, "ml_m", LearnerRole::Classifier),
            Err(DoubleMLError::IncompatibleLearner { .. })
        ));
        assert!(matches!(
            check_learner(&logit, "ml_g", LearnerRole::Regressor),
            Err(DoubleMLError::IncompatibleLearner { .. })
        ));
    }

    #[test]
    fn test_dummy_learner_refuses_to_fit() {
        let mut dummy = DummyLearner;
        let data = vec![1.0, 2.0];
        let x = Matrix::new(&data, 2, 1);
        assert!(dummy.fit(&x, &[0.0, 1.0]).is_err());
        assert!(dummy.predict(&x).is_err());
        assert!(check_learner(&dummy, "ml_m", LearnerRole::Classifier).is_ok());
    }

    #[test]
    fn test_ols_recovers_line() {
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 3.0, 5.0, 7.0];
        let x = Matrix::new(&xs, 4, 1);
        let mut ols = OlsRegressor::default();
        ols.fit(&x, &y).unwrap();
        let preds = ols.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(&y) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_logistic_probabilities_in_unit_interval() {
        let xs = vec![-2.0, -1.0, -0.5, 0.5, 1.0, 2.0];
        let y = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let x = Matrix::new(&xs, 6, 1);
        let mut logit = LogisticClassifier::default();
        logit.fit(&x, &y).unwrap();
        let p = logit.predict_proba(&x).unwrap();
        assert!(p.iter().all(|v| *v > 0.0 && *v < 1.0));
        assert!(p[5] > p[0]);
    }
}
