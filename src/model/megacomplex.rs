//! The pluggable megacomplex capability.

use crate::error::Result;
use crate::matrix::ClpTable;
use crate::model::descriptor::DatasetDescriptor;
use crate::model::{DatasetModel, Model};
use ndarray::{Array1, Array2};
use std::fmt;

/// A unit contributing labeled columns to a dataset's model matrix.
///
/// The engine only talks to megacomplexes through this trait; concrete
/// variants live in [`crate::megacomplexes`] or in user code.
pub trait Megacomplex: fmt::Debug + Send + Sync {
    /// Short name of the variant, used in messages.
    fn type_name(&self) -> &str;

    /// Labels of the parameters the megacomplex reads itself. Parameters of
    /// the dataset's IRF and initial concentration are checked by the model.
    fn parameter_labels(&self) -> Vec<String>;

    /// The clp labels the megacomplex contributes in the given dataset.
    fn clp_labels(&self, model: &Model, dataset: &DatasetModel) -> Vec<String>;

    /// Whether the contribution changes along the global axis.
    fn is_index_dependent(&self, model: &Model, dataset: &DatasetModel) -> bool;

    /// Problems with using the megacomplex in the given dataset.
    fn validate(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        Vec::new()
    }

    /// Compute the contribution at a global index (`None` for
    /// index-independent models). Returns the labels and a matrix with one
    /// row per model-axis point and one column per label.
    fn calculate_matrix(
        &self,
        dataset: &DatasetDescriptor,
        global_index: Option<usize>,
        model_axis: &Array1<f64>,
    ) -> Result<(Vec<String>, Array2<f64>)>;

    /// Quantities derived from the fitted clps, such as associated spectra.
    fn derived_quantities(
        &self,
        _dataset: &DatasetDescriptor,
        _clps: &ClpTable,
    ) -> Result<Vec<DerivedQuantity>> {
        Ok(Vec::new())
    }
}

/// The axis the rows of a [`DerivedQuantity`] run along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityAxis {
    Global,
    Model,
}

/// A named 2-D result of a megacomplex, indexed by `axis` and label.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedQuantity {
    pub name: String,
    pub axis: QuantityAxis,
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}
