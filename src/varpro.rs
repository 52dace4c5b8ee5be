//! Linear least squares for the conditionally linear parameters.
//!
//! For fixed nonlinear parameters the clps solve `matrix · clp ≈ data`. The
//! solve goes through an SVD, so collinear columns yield the minimum-norm
//! solution instead of failing. Clps flagged non-negative are found with a
//! Lawson-Hanson active-set iteration that leaves the other clps free.

use crate::error::{Result, TarFitError};
use crate::reduction::{Removal, RemovedClp};
use crate::utils::matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};
use nalgebra::DMatrix;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Result of one linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    /// One clp per matrix column
    pub clps: Array1<f64>,
    /// `data - matrix · clps`
    pub residual: Array1<f64>,
    /// Numerical rank of the matrix
    pub rank: usize,
    pub rank_deficient: bool,
}

impl LinearSolution {
    fn unsolvable(columns: usize, rows: usize) -> Self {
        Self {
            clps: Array1::from_elem(columns, f64::NAN),
            residual: Array1::from_elem(rows, f64::NAN),
            rank: 0,
            rank_deficient: false,
        }
    }
}

/// Solve `matrix · clp ≈ data`. Columns with `non_negative[j] == true` are
/// constrained to non-negative values; an empty mask means unconstrained.
///
/// A matrix without columns gives no clps and the data as residual. A matrix
/// with non-finite entries gives NaN clps and residual, which the minimizer
/// rejects as a step.
pub fn solve(matrix: ArrayView2<'_, f64>, data: ArrayView1<'_, f64>, non_negative: &[bool]) -> Result<LinearSolution> {
    let (rows, columns) = matrix.dim();
    if rows != data.len() {
        return Err(TarFitError::DimensionMismatch(format!(
            "Matrix has {} rows but data has {} points",
            rows,
            data.len()
        )));
    }
    if columns == 0 {
        return Ok(LinearSolution {
            clps: Array1::zeros(0),
            residual: data.to_owned(),
            rank: 0,
            rank_deficient: false,
        });
    }
    if matrix.iter().chain(data.iter()).any(|v| !v.is_finite()) {
        return Ok(LinearSolution::unsolvable(columns, rows));
    }

    let a = ndarray_to_nalgebra(matrix);
    let rank = numerical_rank(&a);
    let clps = if non_negative.iter().any(|&flag| flag) {
        nnls(matrix, data, non_negative)?
    } else {
        lstsq(&a, data)?
    };
    let residual = &data - &matrix.dot(&clps);

    Ok(LinearSolution {
        clps,
        residual,
        rank,
        rank_deficient: rank < columns.min(rows),
    })
}

fn svd_tolerance(a: &DMatrix<f64>, largest: f64) -> f64 {
    a.nrows().max(a.ncols()) as f64 * f64::EPSILON * largest
}

fn numerical_rank(a: &DMatrix<f64>) -> usize {
    let singular_values = a.singular_values();
    let largest = singular_values.max();
    let tol = svd_tolerance(a, largest);
    singular_values.iter().filter(|&&s| s > tol).count()
}

/// Minimum-norm least squares through the SVD.
fn lstsq(a: &DMatrix<f64>, data: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let b = ndarray_vec_to_nalgebra(data);
    let svd = a.clone().svd(true, true);
    let tol = svd_tolerance(a, svd.singular_values.max());
    let x = svd
        .solve(&b, tol)
        .map_err(|e| TarFitError::LinearAlgebra(e.to_string()))?;
    Ok(nalgebra_vec_to_ndarray(&x))
}

/// Least squares restricted to the columns in `passive`; other clps are 0.
fn lstsq_subset(matrix: ArrayView2<'_, f64>, data: ArrayView1<'_, f64>, passive: &[usize]) -> Result<Array1<f64>> {
    let mut x = Array1::zeros(matrix.ncols());
    if passive.is_empty() {
        return Ok(x);
    }
    let sub = matrix.select(Axis(1), passive);
    let solution = lstsq(&ndarray_to_nalgebra(sub.view()), data)?;
    for (&j, value) in passive.iter().zip(solution.iter()) {
        x[j] = *value;
    }
    Ok(x)
}

/// Lawson-Hanson active set method where only the flagged columns are
/// bounded below by zero.
fn nnls(matrix: ArrayView2<'_, f64>, data: ArrayView1<'_, f64>, non_negative: &[bool]) -> Result<Array1<f64>> {
    let n = matrix.ncols();
    let constrained = |j: usize| non_negative.get(j).copied().unwrap_or(false);
    let tol = 10.0 * f64::EPSILON * matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs())) * n.max(1) as f64;

    let mut passive: Vec<usize> = (0..n).filter(|&j| !constrained(j)).collect();
    let mut x = lstsq_subset(matrix, data, &passive)?;
    let max_iterations = 3 * n.max(1);

    for _ in 0..max_iterations {
        let residual = &data - &matrix.dot(&x);
        let gradient = matrix.t().dot(&residual);
        let candidate = (0..n)
            .filter(|&j| constrained(j) && !passive.contains(&j))
            .filter(|&j| gradient[j] > tol)
            .max_by(|&a, &b| gradient[a].total_cmp(&gradient[b]));
        let Some(entering) = candidate else {
            break;
        };
        passive.push(entering);
        passive.sort_unstable();

        loop {
            let z = lstsq_subset(matrix, data, &passive)?;
            let infeasible: Vec<usize> = passive
                .iter()
                .copied()
                .filter(|&j| constrained(j) && z[j] <= 0.0)
                .collect();
            if infeasible.is_empty() {
                x = z;
                break;
            }

            let alpha = infeasible
                .iter()
                .map(|&j| {
                    let denominator = x[j] - z[j];
                    if denominator > 0.0 {
                        x[j] / denominator
                    } else {
                        0.0
                    }
                })
                .fold(f64::INFINITY, f64::min);
            x = &x + &((&z - &x) * alpha);
            passive.retain(|&j| !(constrained(j) && x[j] <= tol));
            for j in (0..n).filter(|j| !passive.contains(j)) {
                x[j] = 0.0;
            }
        }
    }

    for j in (0..n).filter(|&j| constrained(j)) {
        x[j] = x[j].max(0.0);
    }
    Ok(x)
}

/// Expand the clps of a reduced matrix to the full label set.
///
/// Zeroed clps are 0; tied clps are `factor × source`, resolved in reverse
/// removal order. Labels neither solved nor removed are 0.
pub fn retrieve_clps(
    full_labels: &[String],
    reduced_labels: &[String],
    reduced_clps: ArrayView1<'_, f64>,
    removed: &[RemovedClp],
) -> Array1<f64> {
    let mut values: std::collections::HashMap<&str, f64> = reduced_labels
        .iter()
        .map(String::as_str)
        .zip(reduced_clps.iter().copied())
        .collect();

    for clp in removed.iter().rev() {
        let value = match &clp.removal {
            Removal::Zero => 0.0,
            Removal::Tied { source, factor } => factor * values.get(source.as_str()).copied().unwrap_or(0.0),
        };
        values.insert(clp.label.as_str(), value);
    }

    full_labels
        .iter()
        .map(|label| values.get(label.as_str()).copied().unwrap_or(0.0))
        .collect()
}
