//! Implementation of the Levenberg-Marquardt iteration.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{Result, TarFitError};
use crate::utils::matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};

use super::config::{DecompositionMethod, LmConfig};
use super::problem::LeastSquaresProblem;

/// Floor for the Marquardt scaling of a column with vanishing curvature.
const MIN_DIAGONAL: f64 = 1e-12;

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Parameter values with the lowest cost seen
    pub params: Array1<f64>,

    /// Residuals at `params`
    pub residuals: Array1<f64>,

    /// Sum of squared residuals at `params`
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of residual evaluations outside Jacobian computations
    pub func_evals: usize,

    /// Number of Jacobian computations
    pub jacobian_evals: usize,

    /// Whether a convergence criterion was met
    pub success: bool,

    /// Why the iteration stopped
    pub message: String,

    /// The Jacobian at the solution (if requested)
    pub jacobian: Option<Array2<f64>>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// How an iteration ended.
enum Termination {
    Converged(String),
    Stopped(String),
}

/// The Levenberg-Marquardt minimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Cap the number of residual evaluations.
    pub fn with_max_function_evaluations(mut self, max: Option<usize>) -> Self {
        self.config.max_function_evaluations = max;
        self
    }

    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.config.calc_jacobian = calc_jacobian;
        self
    }

    /// Minimize the sum of squared residuals of `problem` starting from
    /// `initial_params`.
    ///
    /// Running out of iterations or function evaluations is not an error:
    /// the result then carries `success == false` and the best parameters
    /// found so far.
    pub fn minimize<P>(&self, problem: &mut P, initial_params: Array1<f64>) -> Result<LmResult>
    where
        P: LeastSquaresProblem + ?Sized,
    {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(TarFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;
        let mut residuals = problem.eval(&params)?;
        let mut cost = sum_of_squares(&residuals);
        let mut func_evals = 1;
        let mut jacobian_evals = 0;
        let mut iterations = 0;

        if !cost.is_finite() {
            return Err(TarFitError::InvalidInput(
                "Residuals are not finite at the initial parameters".to_string(),
            ));
        }

        let termination = 'outer: loop {
            if n_params == 0 {
                break Termination::Converged("No parameters to optimize".to_string());
            }
            if cost == 0.0 {
                break Termination::Converged("Residuals vanish".to_string());
            }
            if iterations >= self.config.max_iterations {
                break Termination::Stopped(format!(
                    "Maximum iterations ({}) reached",
                    self.config.max_iterations
                ));
            }

            let jac = problem.jacobian(&params)?;
            jacobian_evals += 1;

            // g = J^T r
            let gradient = jac.t().dot(&residuals);
            let gradient_norm = gradient.dot(&gradient).sqrt();
            if gradient_norm < self.config.gtol {
                break Termination::Converged(format!(
                    "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                    gradient_norm, self.config.gtol
                ));
            }
            let jtj = jac.t().dot(&jac);

            loop {
                if let Some(max) = self.config.max_function_evaluations {
                    if func_evals >= max {
                        break 'outer Termination::Stopped(format!(
                            "The maximum number of function evaluations ({}) is exceeded",
                            max
                        ));
                    }
                }

                let step = match self.calculate_step(&jtj, &gradient, lambda) {
                    Some(step) => step,
                    None => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            break 'outer Termination::Stopped(
                                "Failed to calculate a step, and lambda reached its maximum"
                                    .to_string(),
                            );
                        }
                        continue;
                    }
                };

                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost = sum_of_squares(&new_residuals);

                if new_cost.is_finite() && new_cost < cost {
                    let step_norm = step.dot(&step).sqrt();
                    let params_norm = params.dot(&params).sqrt();
                    let cost_change = (cost - new_cost) / cost;

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;
                    tracing::trace!(iterations, cost, lambda, "accepted step");

                    if step_norm < self.config.xtol * (self.config.xtol + params_norm) {
                        break 'outer Termination::Converged(format!(
                            "Parameter convergence: |dx| = {:.2e}",
                            step_norm
                        ));
                    }
                    if cost_change < self.config.ftol {
                        break 'outer Termination::Converged(format!(
                            "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                            cost_change, self.config.ftol
                        ));
                    }
                    break;
                }

                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    break 'outer Termination::Stopped(
                        "Failed to decrease cost, and lambda reached its maximum".to_string(),
                    );
                }
            }
        };

        let (success, message) = match termination {
            Termination::Converged(message) => (true, message),
            Termination::Stopped(message) => (false, message),
        };
        let jacobian = if self.config.calc_jacobian && n_params > 0 {
            Some(problem.jacobian(&params)?)
        } else {
            None
        };

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            jacobian_evals,
            success,
            message,
            jacobian,
        })
    }

    /// Solve `(J^T J + λ D) δ = -J^T r` with `D` the diagonal of `J^T J`.
    /// Returns `None` when the system cannot be solved.
    fn calculate_step(&self, jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
        let n = jtj.nrows();
        let mut a = jtj.clone();
        for i in 0..n {
            a[[i, i]] += lambda * jtj[[i, i]].max(MIN_DIAGONAL);
        }
        let rhs = gradient.mapv(|g| -g);

        let step = match self.config.decomposition_method {
            DecompositionMethod::Cholesky => cholesky_solve(&a, &rhs),
            DecompositionMethod::Svd => svd_solve(&a, &rhs),
            DecompositionMethod::Auto => cholesky_solve(&a, &rhs).or_else(|| svd_solve(&a, &rhs)),
        }?;

        if step.iter().all(|v| v.is_finite()) {
            Some(step)
        } else {
            None
        }
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Solve a symmetric positive definite system by Cholesky factorization
/// without pivoting. `None` if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = a.clone();

    for k in 0..n {
        for j in 0..k {
            l[[k, k]] -= l[[k, j]] * l[[k, j]];
        }
        if l[[k, k]] <= 0.0 || !l[[k, k]].is_finite() {
            return None;
        }
        let pivot = l[[k, k]].sqrt();
        l[[k, k]] = pivot;

        for i in k + 1..n {
            for j in 0..k {
                l[[i, k]] -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] /= pivot;
        }
    }

    // L y = b
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in i + 1..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }

    Some(x)
}

/// Minimum-norm solution by SVD.
fn svd_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let a: DMatrix<f64> = ndarray_to_nalgebra(a.view());
    let b: DVector<f64> = ndarray_vec_to_nalgebra(b.view());
    let eps = f64::EPSILON * a.nrows().max(1) as f64 * a.norm();
    let x = a.svd(true, true).solve(&b, eps).ok()?;
    Some(nalgebra_vec_to_ndarray(&x))
}
