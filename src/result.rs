//! Results of a fit.

use crate::matrix::{ClpTable, DatasetMatrices};
use crate::model::DerivedQuantity;
use crate::parameters::Parameters;
use crate::problem::SingularSystemWarning;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fmt;

/// The fit of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetResult {
    pub label: String,
    pub model_axis: Array1<f64>,
    pub global_axis: Array1<f64>,
    /// Observed data, `[model, global]`
    pub data: Array2<f64>,
    /// Full matrix times full clps at every global index
    pub fitted_data: Array2<f64>,
    /// `data - fitted_data`
    pub residual: Array2<f64>,
    /// Residual the minimizer saw, weights applied
    pub weighted_residual: Array2<f64>,
    /// Clps on the full label set, one row per global index
    pub clps: ClpTable,
    pub matrices: DatasetMatrices,
    /// Root mean square of the weighted residual
    pub root_mean_square_error: f64,
    /// Keyed by `"<megacomplex label>/<quantity name>"`
    pub derived: BTreeMap<String, DerivedQuantity>,
}

/// The outcome of [`optimize`](crate::optimize::optimize).
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Whether the minimizer met a convergence criterion
    pub success: bool,
    /// Why the minimizer stopped
    pub message: String,
    pub iterations: usize,
    /// Penalty evaluations, not counting those for Jacobians
    pub number_of_function_evaluations: usize,
    pub number_of_jacobian_evaluations: usize,
    pub number_of_data_points: usize,
    pub number_of_variables: usize,
    pub degrees_of_freedom: usize,
    pub chi_square: f64,
    pub reduced_chi_square: f64,
    pub root_mean_square_error: f64,
    /// Labels of the varying parameters, in covariance order
    pub free_parameter_labels: Vec<String>,
    pub initial_parameters: Parameters,
    /// Best parameters, with standard errors when uncertainties were
    /// calculated
    pub optimized_parameters: Parameters,
    pub covariance: Option<Array2<f64>>,
    pub correlation: Option<Array2<f64>>,
    pub datasets: BTreeMap<String, DatasetResult>,
    /// Rank-deficient solves at the optimum
    pub warnings: Vec<SingularSystemWarning>,
}

impl FitResult {
    pub fn dataset(&self, label: &str) -> Option<&DatasetResult> {
        self.datasets.get(label)
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Function evaluations: {}", self.number_of_function_evaluations)?;
        writeln!(f, "  Data points: {}", self.number_of_data_points)?;
        writeln!(f, "  Variables: {}", self.number_of_variables)?;
        writeln!(f, "  Chi-square: {:.6e}", self.chi_square)?;
        writeln!(f, "  Reduced chi-square: {:.6e}", self.reduced_chi_square)?;
        writeln!(f, "  RMSE: {:.6e}", self.root_mean_square_error)?;
        for label in &self.free_parameter_labels {
            if let Some(p) = self.optimized_parameters.get(label) {
                match p.stderr() {
                    Some(err) => writeln!(f, "  {}: {:.6e} +/- {:.2e}", label, p.value(), err)?,
                    None => writeln!(f, "  {}: {:.6e}", label, p.value())?,
                }
            }
        }
        for (label, dataset) in &self.datasets {
            writeln!(f, "  Dataset '{}': RMSE {:.6e}", label, dataset.root_mean_square_error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  Warning: {}", warning)?;
        }
        Ok(())
    }
}
