use crate::config::DmlProcedure;
use crate::double_ml::{CausalModel, DoubleML};
use crate::errors::DoubleMLError;

impl<M: CausalModel> DoubleML<M> {
    // Set methods for options that leave the sample splitting untouched.

    /// Set the solving procedure.
    /// * `dml_procedure` - Solve per fold and average (`Dml1`) or solve the pooled score (`Dml2`).
    pub fn set_dml_procedure(mut self, dml_procedure: DmlProcedure) -> Self {
        self.cfg.dml_procedure = dml_procedure;
        self
    }

    /// Set the number of threads.
    /// * `num_threads` - Threads used to fit folds in parallel, all cores if `None`.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Result<Self, DoubleMLError> {
        if num_threads == Some(0) {
            return Err(DoubleMLError::invalid("num_threads", "a positive integer or None", 0));
        }
        self.cfg.num_threads = num_threads;
        Ok(self)
    }

    /// Keep the nuisance predictions and score elements of every repetition.
    pub fn set_store_predictions(mut self, store_predictions: bool) -> Self {
        self.cfg.store_predictions = store_predictions;
        self
    }

    /// Keep the fitted learner of every fold.
    pub fn set_store_models(mut self, store_models: bool) -> Self {
        self.cfg.store_models = store_models;
        self
    }

    /// Set whether the other treatment columns are used as covariates.
    pub fn set_use_other_treat_as_covariate(mut self, use_other_treat_as_covariate: bool) -> Self {
        self.cfg.use_other_treat_as_covariate = use_other_treat_as_covariate;
        self
    }
}
