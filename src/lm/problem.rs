//! The interface between a residual function and the minimizer.

use crate::error::Result;
use crate::utils::finite_difference;
use ndarray::{Array1, Array2};

/// A nonlinear least-squares problem: a residual vector as a function of a
/// parameter vector.
///
/// Evaluation takes `&mut self` so that implementations can keep caches
/// between calls.
pub trait LeastSquaresProblem {
    /// Residuals at the given parameters.
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of parameters the problem expects.
    fn parameter_count(&self) -> usize;

    /// Jacobian of the residuals. Defaults to forward finite differences.
    fn jacobian(&mut self, params: &Array1<f64>) -> Result<Array2<f64>> {
        finite_difference::jacobian(self, params, None)
    }
}
