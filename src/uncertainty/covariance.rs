//! Covariance matrices from Jacobians.

use crate::error::{Result, TarFitError};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};
use ndarray::{Array1, Array2, ArrayView1};

/// `redchi · (JᵀJ)⁺`.
///
/// The pseudo-inverse keeps parameters the residuals do not depend on at
/// zero variance instead of failing.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    let jtj = ndarray_to_nalgebra(jacobian.t().dot(jacobian).view());
    let largest = jtj.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tolerance = jtj.nrows().max(1) as f64 * f64::EPSILON * largest;
    let inverse = jtj
        .pseudo_inverse(tolerance)
        .map_err(|e| TarFitError::LinearAlgebra(e.to_string()))?;
    Ok(nalgebra_to_ndarray(&inverse) * redchi)
}

/// Rescale a covariance matrix by per-parameter derivatives `dx/dy`, mapping
/// it from the space `y` it was estimated in to the space `x`.
pub fn transform_covariance(covariance: &Array2<f64>, derivatives: ArrayView1<'_, f64>) -> Array2<f64> {
    let mut transformed = covariance.clone();
    for ((i, j), value) in transformed.indexed_iter_mut() {
        *value *= derivatives[i] * derivatives[j];
    }
    transformed
}

/// `correl[i, j] = covar[i, j] / sqrt(covar[i, i] · covar[j, j])`, with a
/// unit diagonal and zero where a variance vanishes.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denominator = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denominator > 0.0 {
            covar[[i, j]] / denominator
        } else {
            0.0
        }
    })
}

/// Square roots of the diagonal; zero for non-positive variances.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}
