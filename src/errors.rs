//! Errors
//!
//! Custom error types used throughout the `doubleml` crate.
use thiserror::Error;

/// Errors that can occur while configuring or fitting a double machine learning model.
///
/// None of these are retried internally. Each one is surfaced to the caller
/// with a message naming the offending argument, nuisance, fold or repetition.
#[derive(Debug, Error)]
pub enum DoubleMLError {
    /// A constructor argument is out of range. First value is the parameter, second the expectation, third what was passed.
    #[error("Invalid configuration for {0}: expected {1} but {2} provided.")]
    InvalidConfiguration(String, String, String),
    /// The data does not fit the model (types, cardinalities, shapes).
    #[error("Incompatible data: {0}")]
    IncompatibleData(String),
    /// A learner lacks the capability its role requires.
    #[error("Invalid learner provided for {name}: {reason}")]
    IncompatibleLearner { name: String, reason: String },
    /// A fold cannot be used to estimate a nuisance function.
    #[error("Degenerate fold {fold} in repetition {rep} while estimating {nuisance}: {reason}")]
    DegenerateFold {
        nuisance: String,
        rep: usize,
        fold: usize,
        reason: String,
    },
    /// The non-linear score has no sign change inside the search bounds.
    #[error("Could not bracket a root of the score in [{lower}, {upper}]: f(lower) = {f_lower}, f(upper) = {f_upper}")]
    RootNotBracketed {
        lower: f64,
        upper: f64,
        f_lower: f64,
        f_upper: f64,
    },
    /// The root solver stopped with an error inside a valid bracket.
    #[error("Root finding failed: {0}")]
    RootFinding(String),
    /// A caller supplied learner returned an error from `fit` or `predict`.
    #[error("Learner for {nuisance} failed on fold {fold}: {reason}")]
    LearnerFailure {
        nuisance: String,
        fold: usize,
        reason: String,
    },
    /// Estimates were requested before `fit` was called.
    #[error("The model has not been fitted yet: {0}")]
    NotFitted(String),
    /// Unable to write configuration to file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read configuration from file.
    #[error("Unable to read from file: {0}")]
    UnableToRead(String),
}

impl DoubleMLError {
    /// Shorthand for [`DoubleMLError::InvalidConfiguration`].
    pub(crate) fn invalid(parameter: &str, expected: impl Into<String>, provided: impl ToString) -> Self {
        DoubleMLError::InvalidConfiguration(parameter.to_string(), expected.into(), provided.to_string())
    }

    /// Shorthand for [`DoubleMLError::IncompatibleLearner`].
    pub(crate) fn learner(name: &str, reason: impl Into<String>) -> Self {
        DoubleMLError::IncompatibleLearner {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<argmin::core::Error> for DoubleMLError {
    fn from(err: argmin::core::Error) -> Self {
        DoubleMLError::RootFinding(err.to_string())
    }
}
