//! Configuration options for the Levenberg-Marquardt minimizer.

use serde::{Deserialize, Serialize};

/// Method for solving the damped normal equations of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecompositionMethod {
    /// Cholesky factorization; fails on indefinite systems
    Cholesky,

    /// Singular value decomposition; handles rank-deficient systems
    Svd,

    /// Cholesky with SVD as fallback
    #[default]
    Auto,
}

/// Configuration options for the Levenberg-Marquardt minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of accepted steps. Default: 100
    pub max_iterations: usize,

    /// Maximum number of residual evaluations, not counting those spent on
    /// finite-difference Jacobians. Unlimited when `None`.
    pub max_function_evaluations: Option<usize>,

    /// Tolerance for the relative change in cost. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for the relative change in parameter values. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the gradient norm. Default: 1e-8
    pub gtol: f64,

    /// Initial value of the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda after a rejected step. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda after an accepted step. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Method used to solve for a step. Default: Auto
    pub decomposition_method: DecompositionMethod,

    /// Whether to return the Jacobian at the solution. Default: false
    pub calc_jacobian: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_function_evaluations: None,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            decomposition_method: DecompositionMethod::default(),
            calc_jacobian: false,
        }
    }
}
