//! Spectral shape megacomplex.
//!
//! Each compartment is described by a fixed shape on the model axis, which is
//! then a spectral axis. The clps become the concentrations of the
//! compartments along the global axis.

use crate::error::{Result, TarFitError};
use crate::matrix::ClpTable;
use crate::model::{DatasetDescriptor, DatasetModel, DerivedQuantity, Megacomplex, Model, QuantityAxis};
use crate::parameters::Parameters;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

/// A band shape, by parameter labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SpectralShape {
    /// Gaussian band; `width` is the full width at half maximum
    Gaussian {
        amplitude: String,
        location: String,
        width: String,
        #[serde(default)]
        skewness: Option<String>,
    },
    One,
    Zero,
}

impl SpectralShape {
    pub fn gaussian(amplitude: &str, location: &str, width: &str) -> Self {
        SpectralShape::Gaussian {
            amplitude: amplitude.to_string(),
            location: location.to_string(),
            width: width.to_string(),
            skewness: None,
        }
    }

    /// A skewed Gaussian. Other shapes are returned unchanged.
    pub fn with_skewness(self, label: &str) -> Self {
        match self {
            SpectralShape::Gaussian {
                amplitude,
                location,
                width,
                ..
            } => SpectralShape::Gaussian {
                amplitude,
                location,
                width,
                skewness: Some(label.to_string()),
            },
            other => other,
        }
    }

    pub fn parameter_labels(&self) -> Vec<String> {
        match self {
            SpectralShape::Gaussian {
                amplitude,
                location,
                width,
                skewness,
            } => [amplitude, location, width]
                .into_iter()
                .chain(skewness)
                .cloned()
                .collect(),
            SpectralShape::One | SpectralShape::Zero => Vec::new(),
        }
    }

    /// The shape on `axis`.
    pub fn calculate(&self, parameters: &Parameters, axis: &Array1<f64>) -> Result<Array1<f64>> {
        let (amplitude, location, width, skewness) = match self {
            SpectralShape::One => return Ok(Array1::ones(axis.len())),
            SpectralShape::Zero => return Ok(Array1::zeros(axis.len())),
            SpectralShape::Gaussian {
                amplitude,
                location,
                width,
                skewness,
            } => (
                parameters.value(amplitude)?,
                parameters.value(location)?,
                parameters.value(width)?,
                skewness.as_deref().map(|l| parameters.value(l)).transpose()?,
            ),
        };
        if width <= 0.0 {
            return Err(TarFitError::Parameter(format!(
                "spectral shape width must be positive, got {}",
                width
            )));
        }

        Ok(match skewness.filter(|&s| s != 0.0) {
            None => axis.mapv(|x| {
                let z = 2.0 * (x - location) / width;
                amplitude * (-LN_2 * z * z).exp()
            }),
            Some(skewness) => axis.mapv(|x| {
                let argument = 1.0 + 2.0 * skewness * (x - location) / width;
                if argument > 0.0 {
                    let z = argument.ln() / skewness;
                    amplitude * (-LN_2 * z * z).exp()
                } else {
                    0.0
                }
            }),
        })
    }
}

/// A megacomplex of compartments with parameterized spectra.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralMegacomplex {
    /// Compartments in declaration order; their shapes are summed
    shapes: Vec<(String, Vec<SpectralShape>)>,
}

impl SpectralMegacomplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape to a compartment.
    pub fn with_shape(mut self, compartment: &str, shape: SpectralShape) -> Self {
        match self.shapes.iter_mut().find(|(c, _)| c == compartment) {
            Some((_, shapes)) => shapes.push(shape),
            None => self.shapes.push((compartment.to_string(), vec![shape])),
        }
        self
    }

    pub fn compartments(&self) -> Vec<String> {
        self.shapes.iter().map(|(c, _)| c.clone()).collect()
    }

    fn spectrum_matrix(&self, parameters: &Parameters, axis: &Array1<f64>) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((axis.len(), self.shapes.len()));
        for (j, (_, shapes)) in self.shapes.iter().enumerate() {
            for shape in shapes {
                let values = shape.calculate(parameters, axis)?;
                let mut column = matrix.column_mut(j);
                column += &values;
            }
        }
        Ok(matrix)
    }

    /// The spectra of the compartments on `axis` as clps, for simulating a
    /// dataset whose global axis is `axis`.
    pub fn spectra(&self, parameters: &Parameters, axis: &Array1<f64>) -> Result<ClpTable> {
        Ok(ClpTable {
            labels: self.compartments(),
            values: self.spectrum_matrix(parameters, axis)?,
        })
    }
}

impl Megacomplex for SpectralMegacomplex {
    fn type_name(&self) -> &str {
        "spectral"
    }

    fn parameter_labels(&self) -> Vec<String> {
        self.shapes
            .iter()
            .flat_map(|(_, shapes)| shapes.iter().flat_map(SpectralShape::parameter_labels))
            .collect()
    }

    fn clp_labels(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        self.compartments()
    }

    fn is_index_dependent(&self, _model: &Model, _dataset: &DatasetModel) -> bool {
        false
    }

    fn validate(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        if self.shapes.is_empty() {
            vec!["Spectral megacomplex has no shapes".to_string()]
        } else {
            Vec::new()
        }
    }

    fn calculate_matrix(
        &self,
        dataset: &DatasetDescriptor,
        _global_index: Option<usize>,
        model_axis: &Array1<f64>,
    ) -> Result<(Vec<String>, Array2<f64>)> {
        Ok((self.compartments(), self.spectrum_matrix(dataset.parameters(), model_axis)?))
    }

    /// Species spectra along the model axis and the species associated
    /// concentrations (the clps) along the global axis.
    fn derived_quantities(&self, dataset: &DatasetDescriptor, clps: &ClpTable) -> Result<Vec<DerivedQuantity>> {
        let labels = self.compartments();
        let spectra = self.spectrum_matrix(dataset.parameters(), &dataset.model_axis)?;
        let mut concentrations = Array2::zeros((clps.values.nrows(), labels.len()));
        for (j, label) in labels.iter().enumerate() {
            if let Some(column) = clps.column(label) {
                concentrations.column_mut(j).assign(&column);
            }
        }
        Ok(vec![
            DerivedQuantity {
                name: "species_spectra".to_string(),
                axis: QuantityAxis::Model,
                labels: labels.clone(),
                values: spectra,
            },
            DerivedQuantity {
                name: "species_associated_concentrations".to_string(),
                axis: QuantityAxis::Global,
                labels,
                values: concentrations,
            },
        ])
    }
}
