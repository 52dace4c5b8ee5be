//! Coherent artifact megacomplex: the IRF itself and its first and second
//! derivatives as additional model columns.

use crate::error::{Result, TarFitError};
use crate::matrix::ClpTable;
use crate::model::{DatasetDescriptor, DatasetModel, DerivedQuantity, FilledIrf, Megacomplex, Model, QuantityAxis};
use ndarray::{Array1, Array2};

pub const MAX_ORDER: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct CoherentArtifactMegacomplex {
    order: usize,
    /// Parameter overriding the IRF width
    width: Option<String>,
}

impl CoherentArtifactMegacomplex {
    /// Artifact with `order` columns (1 to 3).
    pub fn new(order: usize) -> Self {
        Self { order, width: None }
    }

    pub fn with_width(mut self, width: &str) -> Self {
        self.width = Some(width.to_string());
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn labels(&self) -> Vec<String> {
        (1..=self.order)
            .map(|i| format!("coherent_artifact_{}", i))
            .collect()
    }
}

impl Megacomplex for CoherentArtifactMegacomplex {
    fn type_name(&self) -> &str {
        "coherent-artifact"
    }

    fn parameter_labels(&self) -> Vec<String> {
        self.width.iter().cloned().collect()
    }

    fn clp_labels(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        self.labels()
    }

    fn is_index_dependent(&self, model: &Model, dataset: &DatasetModel) -> bool {
        model.dataset_irf(dataset).map_or(false, |irf| irf.is_dispersed())
    }

    fn validate(&self, model: &Model, dataset: &DatasetModel) -> Vec<String> {
        let mut problems = Vec::new();
        if !(1..=MAX_ORDER).contains(&self.order) {
            problems.push(format!(
                "Coherent artifact order {} is not between 1 and {}",
                self.order, MAX_ORDER
            ));
        }
        if !model.dataset_irf(dataset).map_or(false, |irf| irf.is_gaussian()) {
            problems.push("Coherent artifact needs a Gaussian IRF in its dataset".to_string());
        }
        problems
    }

    fn calculate_matrix(
        &self,
        dataset: &DatasetDescriptor,
        global_index: Option<usize>,
        model_axis: &Array1<f64>,
    ) -> Result<(Vec<String>, Array2<f64>)> {
        let irf = dataset.irf.as_ref().and_then(FilledIrf::gaussian).ok_or_else(|| {
            TarFitError::ModelValidation(format!(
                "Coherent artifact in dataset '{}' needs a Gaussian IRF",
                dataset.label
            ))
        })?;
        let component = irf
            .components_at(dataset.global_value(global_index))
            .into_iter()
            .next()
            .ok_or_else(|| TarFitError::ModelValidation("IRF without Gaussians".to_string()))?;
        let center = component.center;
        let width = match &self.width {
            Some(label) => dataset.parameter(label)?,
            None => component.width,
        };
        let w2 = width * width;

        let matrix = Array2::from_shape_fn((model_axis.len(), self.order.min(MAX_ORDER)), |(i, k)| {
            let t = model_axis[i];
            let gaussian = (-(t - center).powi(2) / (2.0 * w2)).exp();
            match k {
                0 => gaussian,
                1 => gaussian * (center - t) / w2,
                _ => gaussian * (center * center - w2 - 2.0 * center * t + t * t) / (w2 * w2),
            }
        });
        let mut labels = self.labels();
        labels.truncate(matrix.ncols());
        Ok((labels, matrix))
    }

    /// The artifact spectra (its clps) and its concentration on the model
    /// axis. The concentration uses the undispersed IRF.
    fn derived_quantities(&self, dataset: &DatasetDescriptor, clps: &ClpTable) -> Result<Vec<DerivedQuantity>> {
        let (concentration_labels, concentration) = self.calculate_matrix(dataset, None, &dataset.model_axis)?;
        let labels = self.labels();
        let mut values = Array2::zeros((clps.values.nrows(), labels.len()));
        for (j, label) in labels.iter().enumerate() {
            if let Some(column) = clps.column(label) {
                values.column_mut(j).assign(&column);
            }
        }
        Ok(vec![
            DerivedQuantity {
                name: "coherent_artifact_associated_spectra".to_string(),
                axis: QuantityAxis::Global,
                labels,
                values,
            },
            DerivedQuantity {
                name: "coherent_artifact_concentration".to_string(),
                axis: QuantityAxis::Model,
                labels: concentration_labels,
                values: concentration,
            },
        ])
    }
}
