//! Parameter uncertainties from the Jacobian at the optimum.
//!
//! The covariance is estimated as `redchi · (JᵀJ)⁺` where `J` is the
//! Jacobian of the weighted residuals with respect to the varying
//! parameters.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance, transform_covariance,
};

use crate::error::Result;
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;

/// Covariance, correlation and standard errors of the varying parameters.
#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    /// Labels in matrix order
    pub labels: Vec<String>,
    pub covariance: Array2<f64>,
    pub correlation: Array2<f64>,
    pub standard_errors: HashMap<String, f64>,
    pub chisqr: f64,
    /// `chisqr / nfree`
    pub redchi: f64,
    /// Number of data points minus number of varying parameters
    pub nfree: usize,
}

/// Uncertainty analysis of a fit.
///
/// `jacobian` is taken in the optimizer's internal space; `derivatives`
/// holds `d value / d internal` per parameter to map the covariance back.
pub fn uncertainty_analysis(
    labels: &[String],
    jacobian: &Array2<f64>,
    derivatives: ArrayView1<'_, f64>,
    chisqr: f64,
) -> Result<UncertaintyResult> {
    let ndata = jacobian.nrows();
    let nfree = ndata.saturating_sub(labels.len()).max(1);
    let redchi = chisqr / nfree as f64;

    let internal = calculate_covariance(jacobian, redchi)?;
    let covariance = transform_covariance(&internal, derivatives);
    let correlation = calculate_correlation(&covariance);
    let errors = standard_errors_from_covariance(&covariance);
    let standard_errors = labels.iter().cloned().zip(errors.iter().copied()).collect();

    Ok(UncertaintyResult {
        labels: labels.to_vec(),
        covariance,
        correlation,
        standard_errors,
        chisqr,
        redchi,
        nfree,
    })
}
