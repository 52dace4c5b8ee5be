//! Assembly of dataset model matrices from megacomplex contributions.

use crate::error::{Result, TarFitError};
use crate::matrix::{DatasetMatrices, LabeledMatrix};
use crate::model::DatasetDescriptor;
use ndarray::Array2;

/// Sum the contributions of every megacomplex of a dataset at one global
/// index.
///
/// Columns accumulate by label in first-seen order over the megacomplexes in
/// declaration order. An empty model axis or a dataset without megacomplexes
/// gives a matrix with no columns.
pub fn build_matrix(descriptor: &DatasetDescriptor, global_index: Option<usize>) -> Result<LabeledMatrix> {
    let model_axis = &descriptor.model_axis;
    let rows = model_axis.len();
    if rows == 0 || descriptor.megacomplexes.is_empty() {
        return Ok(LabeledMatrix::empty(rows));
    }

    let mut labels: Vec<String> = Vec::new();
    let mut columns: Vec<ndarray::Array1<f64>> = Vec::new();

    for (mc_label, megacomplex) in &descriptor.megacomplexes {
        let (mc_labels, values) = megacomplex.calculate_matrix(descriptor, global_index, model_axis)?;
        if values.nrows() != rows || values.ncols() != mc_labels.len() {
            return Err(TarFitError::MatrixShape(format!(
                "Megacomplex '{}' ({}) in dataset '{}' returned a {}x{} matrix for {} labels and {} model-axis points",
                mc_label,
                megacomplex.type_name(),
                descriptor.label,
                values.nrows(),
                values.ncols(),
                mc_labels.len(),
                rows
            )));
        }

        for (label, column) in mc_labels.into_iter().zip(values.columns()) {
            match labels.iter().position(|l| *l == label) {
                Some(j) => columns[j] += &column,
                None => {
                    labels.push(label);
                    columns.push(column.to_owned());
                }
            }
        }
    }

    let mut values = Array2::zeros((rows, labels.len()));
    for (j, column) in columns.iter().enumerate() {
        values.column_mut(j).assign(column);
    }
    if let Some(scale) = descriptor.scale {
        values *= scale;
    }

    LabeledMatrix::new(labels, values)
}

/// Build all matrices of a dataset: one per global index when
/// `index_dependent`, otherwise a single shared matrix.
pub fn build_dataset_matrices(
    descriptor: &DatasetDescriptor,
    index_dependent: bool,
    parallel: bool,
) -> Result<DatasetMatrices> {
    if !index_dependent {
        return Ok(DatasetMatrices::IndexIndependent(build_matrix(descriptor, None)?));
    }

    let n = descriptor.global_axis.len();
    Ok(DatasetMatrices::IndexDependent(build_indexed(descriptor, n, parallel)?))
}

#[cfg(feature = "parallel")]
fn build_indexed(descriptor: &DatasetDescriptor, n: usize, parallel: bool) -> Result<Vec<LabeledMatrix>> {
    use rayon::prelude::*;

    if parallel {
        (0..n)
            .into_par_iter()
            .map(|i| build_matrix(descriptor, Some(i)))
            .collect()
    } else {
        (0..n).map(|i| build_matrix(descriptor, Some(i))).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn build_indexed(descriptor: &DatasetDescriptor, n: usize, _parallel: bool) -> Result<Vec<LabeledMatrix>> {
    (0..n).map(|i| build_matrix(descriptor, Some(i))).collect()
}
