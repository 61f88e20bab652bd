//! Root finding
//!
//! Solve a scalar moment condition. Linear scores have a closed form;
//! everything else goes through an expanding bracket search around a start
//! value followed by `argmin`'s Brent solver inside the bracket.
use crate::constants::{BRACKET_MAX_STEPS, BRACKET_STEP, BRENT_MAX_ITER, BRENT_XTOL};
use crate::errors::DoubleMLError;
use crate::score::Score;
use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason};
use argmin::solver::brent::BrentRoot;
use log::warn;

/// Grow an interval around `start` until `f` changes sign at its endpoints.
///
/// The half-width grows in steps of `BRACKET_STEP` times half the bound
/// range and is clipped to `bounds`. Fails with `RootNotBracketed` once the
/// interval covers the bounds without a sign change.
pub fn bracket_root<F>(f: &F, start: f64, bounds: (f64, f64)) -> Result<(f64, f64), DoubleMLError>
where
    F: Fn(f64) -> f64,
{
    let (lower, upper) = bounds;
    let length = upper - lower;
    let (mut a, mut b) = bounds;
    let (mut f_a, mut f_b) = (f64::NAN, f64::NAN);
    for step in 1..=BRACKET_MAX_STEPS {
        let half = step as f64 * BRACKET_STEP * length / 2.0;
        a = (start - half).max(lower);
        b = (start + half).min(upper);
        f_a = f(a);
        f_b = f(b);
        if f_a == 0.0 || f_b == 0.0 || f_a.signum() != f_b.signum() {
            return Ok((a, b));
        }
        if a <= lower && b >= upper {
            break;
        }
    }
    Err(DoubleMLError::RootNotBracketed {
        lower: a,
        upper: b,
        f_lower: f_a,
        f_upper: f_b,
    })
}

/// The mean score as an `argmin` problem in the scalar parameter.
struct MomentCondition<'a, F> {
    f: &'a F,
}

impl<F> CostFunction for MomentCondition<'_, F>
where
    F: Fn(f64) -> f64,
{
    type Param = f64;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok((self.f)(*theta))
    }
}

/// Brent's method on a bracketing interval `[xa, xb]`, run by `argmin`.
pub fn brent_root<F>(f: &F, xa: f64, xb: f64) -> Result<f64, DoubleMLError>
where
    F: Fn(f64) -> f64,
{
    let (f_a, f_b) = (f(xa), f(xb));
    if f_a == 0.0 {
        return Ok(xa);
    }
    if f_b == 0.0 {
        return Ok(xb);
    }
    if f_a.is_nan() || f_b.is_nan() || f_a.signum() == f_b.signum() {
        return Err(DoubleMLError::RootNotBracketed {
            lower: xa,
            upper: xb,
            f_lower: f_a,
            f_upper: f_b,
        });
    }

    let solver = BrentRoot::new(xa, xb, BRENT_XTOL);
    let result = Executor::new(MomentCondition { f }, solver)
        .configure(|state| state.max_iters(BRENT_MAX_ITER))
        .run()?;
    let state = result.state();
    let root = state
        .get_param()
        .copied()
        .ok_or_else(|| DoubleMLError::RootFinding("Brent's method returned no parameter".to_string()))?;
    if let Some(TerminationReason::MaxItersReached) = state.get_termination_reason() {
        warn!(
            "Brent's method did not converge in {} iterations, returning {}.",
            BRENT_MAX_ITER, root
        );
    }
    Ok(root)
}

/// Bracket then polish: the root of `f` within `bounds`, searching outward from `start`.
pub fn find_root<F>(f: &F, start: f64, bounds: (f64, f64)) -> Result<f64, DoubleMLError>
where
    F: Fn(f64) -> f64,
{
    let (a, b) = bracket_root(f, start, bounds)?;
    brent_root(f, a, b)
}

/// Solve `mean(score(theta)) = 0` over `inds` (all observations if `None`).
pub fn solve_score(score: &Score, inds: Option<&[usize]>) -> Result<f64, DoubleMLError> {
    match score {
        Score::Linear(s) => Ok(s.theta(inds)),
        Score::NonLinear(s) => {
            let f = |theta: f64| score.mean_psi(theta, inds);
            find_root(&f, s.start(), s.bounds())
        }
    }
}
