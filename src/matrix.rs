//! Labeled model matrices and clp containers.

use crate::error::{Result, TarFitError};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

/// A model matrix with one column per clp label.
///
/// Rows follow the model axis. Labels are unique and their order is the
/// column order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    pub clp_labels: Vec<String>,
    pub values: Array2<f64>,
}

impl LabeledMatrix {
    pub fn new(clp_labels: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if clp_labels.len() != values.ncols() {
            return Err(TarFitError::MatrixShape(format!(
                "{} clp labels for a matrix with {} columns",
                clp_labels.len(),
                values.ncols()
            )));
        }
        Ok(Self { clp_labels, values })
    }

    /// A matrix with `rows` rows and no columns.
    pub fn empty(rows: usize) -> Self {
        Self {
            clp_labels: Vec::new(),
            values: Array2::zeros((rows, 0)),
        }
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.clp_labels.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.clp_labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    pub fn column(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.position(label).map(|i| self.values.column(i))
    }

    /// Add `factor` times the column `from` to the column `into`.
    pub(crate) fn fold_column(&mut self, from: usize, into: usize, factor: f64) {
        let source = self.values.column(from).to_owned();
        self.values
            .column_mut(into)
            .scaled_add(factor, &source);
    }

    /// Drop a column, keeping the order of the others.
    pub(crate) fn remove_column(&mut self, index: usize) {
        let keep: Vec<usize> = (0..self.ncols()).filter(|&i| i != index).collect();
        self.values = self.values.select(Axis(1), &keep);
        self.clp_labels.remove(index);
    }

    /// Multiply every row by the matching weight.
    pub fn weighted(&self, weight: ArrayView1<'_, f64>) -> Self {
        let mut values = self.values.clone();
        for (mut row, w) in values.rows_mut().into_iter().zip(weight.iter()) {
            row *= *w;
        }
        Self {
            clp_labels: self.clp_labels.clone(),
            values,
        }
    }

    /// `matrix · clps`, where `clps` holds one value per label of `labels`.
    /// Labels missing from the matrix contribute nothing.
    pub fn evaluate(&self, labels: &[String], clps: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut result = Array1::zeros(self.nrows());
        for (label, value) in labels.iter().zip(clps.iter()) {
            if let Some(column) = self.column(label) {
                result.scaled_add(*value, &column);
            }
        }
        result
    }
}

/// Stack matrices row-wise, aligning columns on label.
///
/// The result has the union of all labels in first-seen order; a label
/// missing from a block is zero in that block's rows.
pub fn combine_matrices(matrices: &[&LabeledMatrix]) -> LabeledMatrix {
    let mut labels: Vec<String> = Vec::new();
    for matrix in matrices {
        for label in &matrix.clp_labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
    }

    let rows: usize = matrices.iter().map(|m| m.nrows()).sum();
    let mut values = Array2::zeros((rows, labels.len()));
    let mut offset = 0;
    for matrix in matrices {
        let n = matrix.nrows();
        for (j, label) in matrix.clp_labels.iter().enumerate() {
            if let Some(k) = labels.iter().position(|l| l == label) {
                values
                    .slice_mut(s![offset..offset + n, k])
                    .assign(&matrix.values.column(j));
            }
        }
        offset += n;
    }

    LabeledMatrix {
        clp_labels: labels,
        values,
    }
}

/// The matrices of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetMatrices {
    /// One matrix shared by every global index
    IndexIndependent(LabeledMatrix),
    /// One matrix per global index
    IndexDependent(Vec<LabeledMatrix>),
}

impl DatasetMatrices {
    /// The matrix at a global index.
    pub fn at(&self, global_index: usize) -> Option<&LabeledMatrix> {
        match self {
            DatasetMatrices::IndexIndependent(matrix) => Some(matrix),
            DatasetMatrices::IndexDependent(matrices) => matrices.get(global_index),
        }
    }

    pub fn is_index_dependent(&self) -> bool {
        matches!(self, DatasetMatrices::IndexDependent(_))
    }

    /// All labels in first-seen order over every matrix.
    pub fn clp_labels(&self) -> Vec<String> {
        match self {
            DatasetMatrices::IndexIndependent(matrix) => matrix.clp_labels.clone(),
            DatasetMatrices::IndexDependent(matrices) => {
                let mut labels: Vec<String> = Vec::new();
                for label in matrices.iter().flat_map(|m| &m.clp_labels) {
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
                labels
            }
        }
    }
}

/// Clp values at one global index.
#[derive(Debug, Clone, PartialEq)]
pub struct ClpVector {
    pub labels: Vec<String>,
    pub values: Array1<f64>,
}

impl ClpVector {
    pub fn new(labels: Vec<String>, values: Array1<f64>) -> Self {
        Self { labels, values }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.values[i])
    }
}

/// Clps of a dataset: one row per global index, one column per label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClpTable {
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}

impl ClpTable {
    /// Gather clp vectors into a table over `labels`. Labels missing from a
    /// vector are zero.
    pub fn from_vectors(labels: Vec<String>, vectors: &[ClpVector]) -> Self {
        let mut values = Array2::zeros((vectors.len(), labels.len()));
        for (i, vector) in vectors.iter().enumerate() {
            for (j, label) in labels.iter().enumerate() {
                if let Some(value) = vector.get(label) {
                    values[[i, j]] = value;
                }
            }
        }
        Self { labels, values }
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// The values of one label along the global axis.
    pub fn column(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.position(label).map(|j| self.values.column(j))
    }

    /// The clps at one global index.
    pub fn row(&self, global_index: usize) -> ArrayView1<'_, f64> {
        self.values.row(global_index)
    }
}

/// Concatenate vectors in order.
pub(crate) fn concat_vectors(parts: &[Array1<f64>]) -> Array1<f64> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}
