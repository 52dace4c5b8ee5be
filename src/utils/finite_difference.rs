//! Finite difference approximations of derivatives.

use crate::error::{Result, TarFitError};
use crate::lm::LeastSquaresProblem;
use ndarray::{Array1, Array2};

/// Default relative step size.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Step for one parameter, scaled to its magnitude.
fn step_size(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Jacobian of a problem's residuals by forward differences:
/// `J[i, j] = ∂r_i / ∂p_j`.
pub fn jacobian<P>(problem: &mut P, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    P: LeastSquaresProblem + ?Sized,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let residuals = problem.eval(params)?;
    let mut jac = Array2::zeros((residuals.len(), params.len()));

    for j in 0..params.len() {
        let h = step_size(params[j], eps);
        let mut perturbed = params.clone();
        perturbed[j] += h;

        let shifted = problem.eval(&perturbed)?;
        if shifted.len() != residuals.len() {
            return Err(TarFitError::DimensionMismatch(format!(
                "Residual length changed from {} to {} during differentiation",
                residuals.len(),
                shifted.len()
            )));
        }
        jac.column_mut(j)
            .assign(&((&shifted - &residuals) / h));
    }

    Ok(jac)
}
