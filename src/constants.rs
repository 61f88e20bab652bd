pub const N_FOLDS: usize = 5;
pub const N_REP: usize = 1;
pub const N_REP_BOOT: usize = 500;
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Default trimming threshold for the local potential quantile model.
pub const LPQ_TRIMMING_THRESHOLD: f64 = 1e-12;
/// Default trimming threshold for the propensity-weighted effect models.
pub const IRM_TRIMMING_THRESHOLD: f64 = 1e-2;

/// Exponent of the default kernel bandwidth `n_obs^BANDWIDTH_EXPONENT`.
pub const BANDWIDTH_EXPONENT: f64 = -0.2;

/// Bracket growth per step, as a fraction of the full search range.
pub const BRACKET_STEP: f64 = 0.1;
pub const BRACKET_MAX_STEPS: usize = 20;

pub const BRENT_XTOL: f64 = 2e-12;
pub const BRENT_MAX_ITER: u64 = 100;

/// Seed of the 50/50 split inside each fold for preliminary quantile estimates.
pub const NESTED_SPLIT_SEED: u64 = 42;
/// Size of the held-out half in the nested preliminary split.
pub const NESTED_TEST_SIZE: f64 = 0.5;

/// Below this magnitude the score Jacobian is treated as degenerate.
pub const JACOBIAN_EPS: f64 = 1e-12;
