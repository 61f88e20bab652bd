//! Causal
//!
//! Concrete causal models for the [`crate::DoubleML`] engine: partially
//! linear regression (PLR), partially linear IV (PLIV), the interactive
//! regression model for binary treatments (IRM), the interactive IV model
//! (IIVM) and local potential quantiles (LPQ). Each model names its nuisance
//! functions and assembles the orthogonal score from their predictions.
pub mod iivm;
pub mod irm;
pub mod lpq;
pub mod pliv;
pub mod plr;

mod tests;

use crate::data::{DoubleMLData, TreatmentView};
use crate::errors::DoubleMLError;
use crate::utils::is_binary;

pub(crate) fn require_single_binary_treatment(data: &DoubleMLData, model: &str) -> Result<(), DoubleMLError> {
    if data.n_treat() != 1 || !is_binary(data.d(0)) {
        return Err(DoubleMLError::IncompatibleData(format!(
            "to fit an {} model exactly one binary variable with values 0 and 1 needs to be specified as treatment variable",
            model
        )));
    }
    Ok(())
}

pub(crate) fn require_single_binary_instrument(data: &DoubleMLData, model: &str) -> Result<(), DoubleMLError> {
    if data.n_instr() != 1 || !is_binary(data.z(0)) {
        return Err(DoubleMLError::IncompatibleData(format!(
            "to fit an {} model exactly one binary variable with values 0 and 1 needs to be specified as instrumental variable",
            model
        )));
    }
    Ok(())
}

pub(crate) fn require_no_instruments(data: &DoubleMLData, model: &str) -> Result<(), DoubleMLError> {
    if data.n_instr() > 0 {
        return Err(DoubleMLError::IncompatibleData(format!(
            "{} does not use instrumental variables but {} were specified",
            model,
            data.n_instr()
        )));
    }
    Ok(())
}

/// Mask of observations where `v == value`.
pub(crate) fn mask_eq(v: &[f64], value: f64) -> Vec<bool> {
    v.iter().map(|x| *x == value).collect()
}

/// The instrument column of a view, which models requiring one have checked for.
pub(crate) fn instrument<'a>(view: &TreatmentView<'a>, model: &str) -> Result<&'a [f64], DoubleMLError> {
    view.z
        .ok_or_else(|| DoubleMLError::IncompatibleData(format!("{} requires an instrumental variable", model)))
}
