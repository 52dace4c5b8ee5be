//! Measured data of one dataset.

use crate::error::{Result, TarFitError};
use ndarray::{Array1, Array2};

/// Observed data on a model axis (rows) and a global axis (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub model_axis: Array1<f64>,
    pub global_axis: Array1<f64>,
    /// Indexed `[model, global]`
    pub data: Array2<f64>,
    /// Same shape as `data`; multiplies both data and model matrix rows
    pub weight: Option<Array2<f64>>,
}

impl Dataset {
    pub fn new(model_axis: Array1<f64>, global_axis: Array1<f64>, data: Array2<f64>) -> Result<Self> {
        let expected = (model_axis.len(), global_axis.len());
        if data.dim() != expected {
            return Err(TarFitError::ModelValidation(format!(
                "Data has shape {:?}, axes require {:?}",
                data.dim(),
                expected
            )));
        }
        Ok(Self {
            model_axis,
            global_axis,
            data,
            weight: None,
        })
    }

    pub fn with_weight(mut self, weight: Array2<f64>) -> Result<Self> {
        if weight.dim() != self.data.dim() {
            return Err(TarFitError::ModelValidation(format!(
                "Weight has shape {:?}, data has shape {:?}",
                weight.dim(),
                self.data.dim()
            )));
        }
        self.weight = Some(weight);
        Ok(self)
    }

    pub fn model_size(&self) -> usize {
        self.model_axis.len()
    }

    pub fn global_size(&self) -> usize {
        self.global_axis.len()
    }

    /// Data multiplied by the weight, if any.
    pub fn weighted_data(&self) -> Array2<f64> {
        match &self.weight {
            Some(weight) => &self.data * weight,
            None => self.data.clone(),
        }
    }
}
