//! Synthetic data from a model, parameters and known clps.

use crate::builder::build_dataset_matrices;
use crate::dataset::Dataset;
use crate::error::{Result, TarFitError};
use crate::matrix::ClpTable;
use crate::model::Model;
use crate::parameters::Parameters;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

/// Gaussian noise added to simulated data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Noise {
    pub std_dev: f64,
    pub seed: u64,
}

/// Simulate a dataset of `model`.
///
/// `clps` holds one row per global-axis value; its labels may be any subset
/// of the dataset's clp labels, missing ones contribute nothing.
pub fn simulate(
    model: &Model,
    dataset_label: &str,
    parameters: &Parameters,
    model_axis: &Array1<f64>,
    global_axis: &Array1<f64>,
    clps: &ClpTable,
    noise: Option<Noise>,
) -> Result<Dataset> {
    if clps.values.nrows() != global_axis.len() {
        return Err(TarFitError::DimensionMismatch(format!(
            "{} clp rows for {} global-axis values",
            clps.values.nrows(),
            global_axis.len()
        )));
    }

    let mut parameters = parameters.clone();
    parameters.update_expressions()?;
    let descriptor = model.fill(dataset_label, Arc::new(parameters), model_axis, global_axis)?;
    let matrices = build_dataset_matrices(&descriptor, model.is_index_dependent(), false)?;

    let mut data = Array2::zeros((model_axis.len(), global_axis.len()));
    for index in 0..global_axis.len() {
        if let Some(matrix) = matrices.at(index) {
            data.column_mut(index)
                .assign(&matrix.evaluate(&clps.labels, clps.row(index)));
        }
    }

    if let Some(noise) = noise {
        let normal = Normal::new(0.0, noise.std_dev)
            .map_err(|e| TarFitError::InvalidInput(format!("Invalid noise: {}", e)))?;
        let mut rng = StdRng::seed_from_u64(noise.seed);
        data.mapv_inplace(|v| v + normal.sample(&mut rng));
    }

    Dataset::new(model_axis.clone(), global_axis.clone(), data)
}
