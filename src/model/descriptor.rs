//! A dataset model with parameter values substituted.

use crate::error::{Result, TarFitError};
use crate::model::initial_concentration::FilledInitialConcentration;
use crate::model::irf::FilledIrf;
use crate::model::megacomplex::Megacomplex;
use crate::parameters::Parameters;
use ndarray::Array1;
use std::sync::Arc;

/// Everything a megacomplex needs to compute its contribution for one
/// dataset. Built from the model, a parameter snapshot and the dataset's
/// coordinates; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub label: String,
    /// Megacomplexes in declaration order, with their labels
    pub megacomplexes: Vec<(String, Arc<dyn Megacomplex>)>,
    pub irf: Option<FilledIrf>,
    pub initial_concentration: Option<FilledInitialConcentration>,
    /// Factor applied to the whole model matrix
    pub scale: Option<f64>,
    pub model_axis: Array1<f64>,
    pub global_axis: Array1<f64>,
    parameters: Arc<Parameters>,
}

impl DatasetDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        label: &str,
        megacomplexes: Vec<(String, Arc<dyn Megacomplex>)>,
        irf: Option<FilledIrf>,
        initial_concentration: Option<FilledInitialConcentration>,
        scale: Option<f64>,
        model_axis: Array1<f64>,
        global_axis: Array1<f64>,
        parameters: Arc<Parameters>,
    ) -> Self {
        Self {
            label: label.to_string(),
            megacomplexes,
            irf,
            initial_concentration,
            scale,
            model_axis,
            global_axis,
            parameters,
        }
    }

    /// The value of a parameter in this snapshot.
    pub fn parameter(&self, label: &str) -> Result<f64> {
        self.parameters
            .value(label)
            .map_err(|e| TarFitError::Parameter(format!("dataset '{}': {}", self.label, e)))
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The global-axis value at an index, if any.
    pub fn global_value(&self, global_index: Option<usize>) -> Option<f64> {
        global_index.and_then(|i| self.global_axis.get(i).copied())
    }
}
