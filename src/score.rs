//! Score
//!
//! Orthogonal moment conditions assembled from nuisance predictions. A
//! model produces one [`Score`] per repetition; the engine only needs to
//! evaluate it and its derivative with respect to the target parameter.
use crate::utils::{mean, mean_at};
use hashbrown::HashMap;

/// Per-observation arrays a score is computed from, keyed by element name.
pub type ScoreElements = HashMap<String, Vec<f64>>;

/// A score that is not affine in the parameter and needs iterative root finding.
pub trait NonLinearScore: Send + Sync {
    /// Score contribution of every observation at `theta`, restricted to
    /// `inds` when given.
    fn score(&self, theta: f64, inds: Option<&[usize]>) -> Vec<f64>;

    /// Derivative of the score with respect to `theta`, per observation.
    fn score_deriv(&self, theta: f64, inds: Option<&[usize]>) -> Vec<f64>;

    /// Search bounds for the parameter.
    fn bounds(&self) -> (f64, f64);

    /// Initial guess for the bracket search.
    fn start(&self) -> f64;

    /// The elements the score is built from.
    fn elements(&self) -> ScoreElements;
}

/// Score of the form `psi_a * theta + psi_b`.
#[derive(Debug, Clone)]
pub struct LinearScore {
    pub psi_a: Vec<f64>,
    pub psi_b: Vec<f64>,
}

impl LinearScore {
    pub fn new(psi_a: Vec<f64>, psi_b: Vec<f64>) -> Self {
        LinearScore { psi_a, psi_b }
    }

    /// Closed-form root `-mean(psi_b) / mean(psi_a)`.
    pub fn theta(&self, inds: Option<&[usize]>) -> f64 {
        match inds {
            Some(inds) => -mean_at(&self.psi_b, inds) / mean_at(&self.psi_a, inds),
            None => -mean(&self.psi_b) / mean(&self.psi_a),
        }
    }
}

/// The orthogonal score of one repetition.
pub enum Score {
    Linear(LinearScore),
    NonLinear(Box<dyn NonLinearScore>),
}

impl Score {
    /// Score contribution of every observation at `theta`.
    pub fn psi(&self, theta: f64) -> Vec<f64> {
        match self {
            Score::Linear(s) => s.psi_a.iter().zip(&s.psi_b).map(|(a, b)| a * theta + b).collect(),
            Score::NonLinear(s) => s.score(theta, None),
        }
    }

    /// Derivative of the score with respect to the parameter, per observation.
    pub fn psi_deriv(&self, theta: f64) -> Vec<f64> {
        match self {
            Score::Linear(s) => s.psi_a.clone(),
            Score::NonLinear(s) => s.score_deriv(theta, None),
        }
    }

    /// Mean score over `inds` (all observations if `None`).
    pub fn mean_psi(&self, theta: f64, inds: Option<&[usize]>) -> f64 {
        match self {
            Score::Linear(s) => match inds {
                Some(inds) => mean_at(&s.psi_a, inds) * theta + mean_at(&s.psi_b, inds),
                None => mean(&s.psi_a) * theta + mean(&s.psi_b),
            },
            Score::NonLinear(s) => mean(&s.score(theta, inds)),
        }
    }

    pub fn elements(&self) -> ScoreElements {
        match self {
            Score::Linear(s) => {
                let mut elements = ScoreElements::new();
                elements.insert("psi_a".to_string(), s.psi_a.clone());
                elements.insert("psi_b".to_string(), s.psi_b.clone());
                elements
            }
            Score::NonLinear(s) => s.elements(),
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Score::Linear(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_score_theta_and_psi() {
        let s = LinearScore::new(vec![-1.0, -2.0, -3.0], vec![2.0, 4.0, 9.0]);
        // -(15/3) / (-6/3)
        assert_abs_diff_eq!(s.theta(None), 2.5);
        assert_abs_diff_eq!(s.theta(Some(&[0, 1][..])), 2.0);

        let score = Score::Linear(s);
        let psi = score.psi(2.5);
        assert_abs_diff_eq!(psi.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_eq!(score.psi_deriv(0.0), vec![-1.0, -2.0, -3.0]);
        assert_abs_diff_eq!(score.mean_psi(2.0, Some(&[0, 1][..])), 0.0, epsilon = 1e-12);
        assert!(score.elements().contains_key("psi_b"));
        assert!(score.is_linear());
    }
}
