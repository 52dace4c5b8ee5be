//! The driver between a problem and the minimizer.
//!
//! The minimizer sees the varying parameters in their internal
//! (bounds-transformed) space. Each of its evaluations installs a fresh
//! parameter snapshot in the problem and returns the full penalty.

use crate::error::{Result, TarFitError};
use crate::lm::{LeastSquaresProblem, LevenbergMarquardt, LmResult};
use crate::parameters::Parameters;
use crate::problem::{create_problem, Problem};
use crate::result::{DatasetResult, FitResult};
use crate::scheme::Scheme;
use crate::uncertainty::uncertainty_analysis;
use crate::utils::finite_difference;
use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, HashMap};

/// Relative step for the derivative of the internal-to-value mapping.
const TRANSFORM_STEP: f64 = 1e-6;

/// The problem's penalty as a function of the internal parameter values.
struct Penalty {
    problem: Box<dyn Problem>,
    template: Parameters,
    labels: Vec<String>,
    evaluations: usize,
}

impl Penalty {
    fn parameters_at(&self, internal: &Array1<f64>) -> Result<Parameters> {
        let mut parameters = self.template.clone();
        parameters.update_from_internal(&internal.to_vec())?;
        Ok(parameters)
    }

    /// `d value / d internal` for every varying parameter.
    fn transform_derivatives(&self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        self.labels
            .iter()
            .zip(internal.iter())
            .map(|(label, &x)| {
                let parameter = self.template.get(label).ok_or_else(|| {
                    TarFitError::Parameter(format!("Unknown varying parameter '{}'", label))
                })?;
                let h = TRANSFORM_STEP * x.abs().max(1.0);
                Ok((parameter.from_internal(x + h) - parameter.from_internal(x - h)) / (2.0 * h))
            })
            .collect()
    }
}

impl LeastSquaresProblem for Penalty {
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let parameters = self.parameters_at(params)?;
        self.problem.update_parameters(parameters)?;
        self.evaluations += 1;

        let penalty = self.problem.full_penalty();
        tracing::debug!(
            evaluation = self.evaluations,
            cost = penalty.dot(&penalty),
            "evaluated penalty"
        );
        Ok(penalty)
    }

    fn parameter_count(&self) -> usize {
        self.labels.len()
    }
}

/// Fit the scheme's model to its data.
///
/// The scheme is validated before any numerical work. Hitting the
/// evaluation cap is not an error: the result then has `success == false`
/// and carries the best parameters found.
pub fn optimize(scheme: &Scheme) -> Result<FitResult> {
    let initial_parameters = scheme.parameters.clone();
    let labels = initial_parameters.varying_labels();
    let start = Array1::from(initial_parameters.varying_internal_values()?);
    let problem = create_problem(scheme.clone())?;
    tracing::info!(
        datasets = scheme.data.len(),
        varying = labels.len(),
        "starting optimization"
    );

    let mut penalty = Penalty {
        problem,
        template: initial_parameters.clone(),
        labels: labels.clone(),
        evaluations: 0,
    };

    let minimized = match scheme.config.maximum_number_function_evaluations {
        Some(0) => evaluate_only(&mut penalty, start, scheme.config.calculate_uncertainties)?,
        _ => LevenbergMarquardt::with_config(scheme.config.lm_config())
            .with_calc_jacobian(scheme.config.calculate_uncertainties)
            .minimize(&mut penalty, start)?,
    };

    let mut optimized_parameters = penalty.parameters_at(&minimized.params)?;
    penalty.problem.update_parameters(optimized_parameters.clone())?;
    let residuals = penalty.problem.full_penalty();

    let number_of_data_points = residuals.len();
    let number_of_variables = labels.len();
    let degrees_of_freedom = number_of_data_points.saturating_sub(number_of_variables);
    let chi_square = residuals.dot(&residuals);
    let reduced_chi_square = chi_square / degrees_of_freedom.max(1) as f64;
    let root_mean_square_error = if number_of_data_points > 0 {
        (chi_square / number_of_data_points as f64).sqrt()
    } else {
        0.0
    };

    let (mut covariance, mut correlation) = (None, None);
    if let Some(jacobian) = minimized
        .jacobian
        .as_ref()
        .filter(|_| degrees_of_freedom > 0)
    {
        let derivatives = penalty.transform_derivatives(&minimized.params)?;
        let uncertainty = uncertainty_analysis(&labels, jacobian, derivatives.view(), chi_square)?;
        optimized_parameters.set_stderrs(&uncertainty.standard_errors);
        covariance = Some(uncertainty.covariance);
        correlation = Some(uncertainty.correlation);
    }

    let datasets = dataset_results(penalty.problem.as_ref())?;
    tracing::info!(
        success = minimized.success,
        evaluations = minimized.func_evals,
        chi_square,
        message = %minimized.message,
        "optimization finished"
    );

    Ok(FitResult {
        success: minimized.success,
        message: minimized.message,
        iterations: minimized.iterations,
        number_of_function_evaluations: minimized.func_evals,
        number_of_jacobian_evaluations: minimized.jacobian_evals,
        number_of_data_points,
        number_of_variables,
        degrees_of_freedom,
        chi_square,
        reduced_chi_square,
        root_mean_square_error,
        free_parameter_labels: labels,
        initial_parameters,
        optimized_parameters,
        covariance,
        correlation,
        datasets,
        warnings: penalty.problem.warnings().to_vec(),
    })
}

/// A single evaluation at the start values, for a cap of zero evaluations.
fn evaluate_only(penalty: &mut Penalty, start: Array1<f64>, with_jacobian: bool) -> Result<LmResult> {
    let residuals = penalty.eval(&start)?;
    let jacobian = if with_jacobian && !start.is_empty() {
        Some(finite_difference::jacobian(penalty, &start, None)?)
    } else {
        None
    };
    Ok(LmResult {
        cost: residuals.dot(&residuals),
        params: start,
        residuals,
        iterations: 0,
        func_evals: 0,
        jacobian_evals: usize::from(jacobian.is_some()),
        success: false,
        message: "The maximum number of function evaluations (0) is exceeded".to_string(),
        jacobian,
    })
}

/// Fitted data, residuals and derived quantities per dataset.
fn dataset_results(problem: &dyn Problem) -> Result<BTreeMap<String, DatasetResult>> {
    let mut results = BTreeMap::new();

    for (label, dataset) in &problem.scheme().data {
        let matrices = problem.matrices().get(label).ok_or_else(|| missing_results(label))?;
        let clps = problem.clps().get(label).ok_or_else(|| missing_results(label))?;
        let weighted_residual = problem.residuals().get(label).ok_or_else(|| missing_results(label))?;
        let descriptor = problem.descriptors().get(label).ok_or_else(|| missing_results(label))?;

        let mut fitted_data = Array2::zeros(dataset.data.dim());
        for index in 0..dataset.global_size() {
            if let Some(matrix) = matrices.at(index) {
                fitted_data
                    .column_mut(index)
                    .assign(&matrix.evaluate(&clps.labels, clps.row(index)));
            }
        }
        let residual = &dataset.data - &fitted_data;
        let root_mean_square_error = if weighted_residual.is_empty() {
            0.0
        } else {
            (weighted_residual.iter().map(|r| r * r).sum::<f64>() / weighted_residual.len() as f64).sqrt()
        };

        let mut derived = BTreeMap::new();
        for (mc_label, megacomplex) in &descriptor.megacomplexes {
            for quantity in megacomplex.derived_quantities(descriptor, clps)? {
                derived.insert(format!("{}/{}", mc_label, quantity.name), quantity);
            }
        }

        results.insert(
            label.clone(),
            DatasetResult {
                label: label.clone(),
                model_axis: dataset.model_axis.clone(),
                global_axis: dataset.global_axis.clone(),
                data: dataset.data.clone(),
                fitted_data,
                residual,
                weighted_residual: weighted_residual.clone(),
                clps: clps.clone(),
                matrices: matrices.clone(),
                root_mean_square_error,
                derived,
            },
        );
    }
    Ok(results)
}

fn missing_results(label: &str) -> TarFitError {
    TarFitError::InvalidInput(format!("No results for dataset '{}'", label))
}

/// Standard errors by label, as stored on the optimized parameters.
pub fn standard_errors(result: &FitResult) -> HashMap<String, f64> {
    result
        .free_parameter_labels
        .iter()
        .filter_map(|label| {
            result
                .optimized_parameters
                .get(label)
                .and_then(|p| p.stderr())
                .map(|err| (label.clone(), err))
        })
        .collect()
}
