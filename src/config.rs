//! Configuration
//!
//! Settings shared by every double machine learning model: the sample
//! splitting scheme, the solving procedure, parallelism and what is kept
//! after a fit.
use crate::constants::{N_FOLDS, N_REP};
use crate::errors::DoubleMLError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How the moment condition is solved across folds.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DmlProcedure {
    /// Solve on each fold, then average the fold estimates.
    Dml1,
    /// Solve once on the score pooled over all folds.
    #[default]
    Dml2,
}

fn default_n_folds() -> usize {
    N_FOLDS
}
fn default_n_rep() -> usize {
    N_REP
}
fn default_draw_sample_splitting() -> bool {
    true
}
fn default_use_other_treat_as_covariate() -> bool {
    true
}

/// Configuration for a [`crate::DoubleML`] estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoubleMLConfig {
    /// Number of cross-fitting folds.
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Number of repetitions of the sample splitting.
    #[serde(default = "default_n_rep")]
    pub n_rep: usize,
    #[serde(default)]
    pub dml_procedure: DmlProcedure,
    /// Seed for the sample splitting.
    #[serde(default)]
    pub seed: u64,
    /// Number of threads for fold-level parallelism, all cores if `None`.
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Keep the nuisance predictions of every repetition.
    #[serde(default)]
    pub store_predictions: bool,
    /// Keep the fitted learner of every fold.
    #[serde(default)]
    pub store_models: bool,
    /// Draw the sample splitting at construction. When `false` a scheme must
    /// be supplied with `set_sample_splitting` before fitting.
    #[serde(default = "default_draw_sample_splitting")]
    pub draw_sample_splitting: bool,
    /// Append the other treatment columns to the covariates.
    #[serde(default = "default_use_other_treat_as_covariate")]
    pub use_other_treat_as_covariate: bool,
}

impl Default for DoubleMLConfig {
    fn default() -> Self {
        DoubleMLConfig {
            n_folds: N_FOLDS,
            n_rep: N_REP,
            dml_procedure: DmlProcedure::Dml2,
            seed: 0,
            num_threads: None,
            store_predictions: false,
            store_models: false,
            draw_sample_splitting: true,
            use_other_treat_as_covariate: true,
        }
    }
}

impl DoubleMLConfig {
    pub fn validate(&self) -> Result<(), DoubleMLError> {
        if self.n_folds < 2 {
            return Err(DoubleMLError::invalid("n_folds", "an integer of at least 2", self.n_folds));
        }
        if self.n_rep < 1 {
            return Err(DoubleMLError::invalid("n_rep", "a positive integer", self.n_rep));
        }
        if self.num_threads == Some(0) {
            return Err(DoubleMLError::invalid("num_threads", "a positive integer or None", 0));
        }
        Ok(())
    }
}

/// JSON persistence.
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), DoubleMLError> {
        fs::write(path, self.json_dump()?).map_err(|e| DoubleMLError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json string.
    fn json_dump(&self) -> Result<String, DoubleMLError> {
        serde_json::to_string(self).map_err(|e| DoubleMLError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    fn from_json(json_str: &str) -> Result<Self, DoubleMLError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| DoubleMLError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json file.
    ///
    /// * `path` - Path to load from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, DoubleMLError> {
        let json_str = fs::read_to_string(path).map_err(|e| DoubleMLError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for DoubleMLConfig {}
