//! Instrument response functions.
//!
//! A Gaussian IRF is described by parameter labels for one or more
//! center/width pairs (more than one gives a multi-Gaussian IRF). Centers and
//! widths may be dispersed along the global axis with polynomials in
//! `(x - dispersion_center) / 100`.
//!
//! A measured IRF is a kernel sampled on the model axis of the dataset it is
//! used with. It has no parameters and is convolved numerically.

use crate::error::{Result, TarFitError};
use crate::parameters::{ParameterError, Parameters};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Normalization of the polynomial argument of the dispersion terms.
const DISPERSION_SCALE: f64 = 100.0;

/// Definition of a (multi-)Gaussian IRF by parameter labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianIrf {
    pub center: Vec<String>,
    pub width: Vec<String>,
    /// Relative scales of the Gaussians; all 1 when empty
    #[serde(default)]
    pub scale: Vec<String>,
    /// Scale the Gaussians so that their weights sum to one
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub dispersion_center: Option<String>,
    #[serde(default)]
    pub center_dispersion: Vec<String>,
    #[serde(default)]
    pub width_dispersion: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl GaussianIrf {
    /// A single Gaussian IRF.
    pub fn new(center: &str, width: &str) -> Self {
        Self {
            center: vec![center.to_string()],
            width: vec![width.to_string()],
            scale: Vec::new(),
            normalize: true,
            dispersion_center: None,
            center_dispersion: Vec::new(),
            width_dispersion: Vec::new(),
        }
    }

    /// Add another Gaussian component.
    pub fn with_component(mut self, center: &str, width: &str) -> Self {
        self.center.push(center.to_string());
        self.width.push(width.to_string());
        self
    }

    pub fn with_scales(mut self, scale: &[&str]) -> Self {
        self.scale = scale.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Disperse center and width along the global axis.
    pub fn with_dispersion(
        mut self,
        dispersion_center: &str,
        center_dispersion: &[&str],
        width_dispersion: &[&str],
    ) -> Self {
        self.dispersion_center = Some(dispersion_center.to_string());
        self.center_dispersion = center_dispersion.iter().map(|s| s.to_string()).collect();
        self.width_dispersion = width_dispersion.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn is_dispersed(&self) -> bool {
        self.dispersion_center.is_some()
            && !(self.center_dispersion.is_empty() && self.width_dispersion.is_empty())
    }

    /// All parameter labels the IRF refers to.
    pub fn parameter_labels(&self) -> Vec<String> {
        self.center
            .iter()
            .chain(&self.width)
            .chain(&self.scale)
            .chain(&self.dispersion_center)
            .chain(&self.center_dispersion)
            .chain(&self.width_dispersion)
            .cloned()
            .collect()
    }

    /// Structural problems of the definition.
    pub fn problems(&self, label: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.center.is_empty() || self.center.len() != self.width.len() {
            problems.push(format!(
                "IRF '{}' needs the same non-zero number of centers and widths",
                label
            ));
        }
        if !self.scale.is_empty() && self.scale.len() != self.center.len() {
            problems.push(format!(
                "IRF '{}' has {} scales for {} Gaussians",
                label,
                self.scale.len(),
                self.center.len()
            ));
        }
        problems
    }

    /// Resolve the parameter values.
    pub fn fill(&self, parameters: &Parameters) -> std::result::Result<FilledGaussianIrf, ParameterError> {
        let values = |labels: &[String]| -> std::result::Result<Vec<f64>, ParameterError> {
            labels.iter().map(|l| parameters.value(l)).collect()
        };

        let mut scale = if self.scale.is_empty() {
            vec![1.0; self.center.len()]
        } else {
            values(&self.scale)?
        };
        if self.normalize {
            let total: f64 = scale.iter().sum();
            if total != 0.0 {
                scale.iter_mut().for_each(|s| *s /= total);
            }
        }

        Ok(FilledGaussianIrf {
            center: values(&self.center)?,
            width: values(&self.width)?,
            scale,
            dispersion_center: self
                .dispersion_center
                .as_deref()
                .map(|l| parameters.value(l))
                .transpose()?,
            center_dispersion: values(&self.center_dispersion)?,
            width_dispersion: values(&self.width_dispersion)?,
        })
    }
}

/// A Gaussian IRF with parameter values substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledGaussianIrf {
    pub center: Vec<f64>,
    pub width: Vec<f64>,
    pub scale: Vec<f64>,
    pub dispersion_center: Option<f64>,
    pub center_dispersion: Vec<f64>,
    pub width_dispersion: Vec<f64>,
}

/// One Gaussian of the IRF at a given global-axis value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianComponent {
    pub center: f64,
    pub width: f64,
    pub scale: f64,
}

impl FilledGaussianIrf {
    /// The Gaussian components at a global-axis value. Without dispersion
    /// the value is ignored.
    pub fn components_at(&self, global_value: Option<f64>) -> Vec<GaussianComponent> {
        let offset = |coefficients: &[f64]| -> f64 {
            match (self.dispersion_center, global_value) {
                (Some(center), Some(x)) => {
                    let dist = (x - center) / DISPERSION_SCALE;
                    coefficients
                        .iter()
                        .enumerate()
                        .map(|(i, c)| c * dist.powi(i as i32 + 1))
                        .sum()
                }
                _ => 0.0,
            }
        };
        let center_shift = offset(&self.center_dispersion);
        let width_shift = offset(&self.width_dispersion);

        self.center
            .iter()
            .zip(&self.width)
            .zip(&self.scale)
            .map(|((&center, &width), &scale)| GaussianComponent {
                center: center + center_shift,
                width: width + width_shift,
                scale,
            })
            .collect()
    }
}

/// An IRF kernel sampled on the model axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredIrf {
    pub values: Vec<f64>,
}

impl MeasuredIrf {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self { values: values.into() }
    }

    pub fn problems(&self, label: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.values.is_empty() {
            problems.push(format!("Measured IRF '{}' has no values", label));
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            problems.push(format!("Measured IRF '{}' has non-finite values", label));
        }
        problems
    }

    /// The kernel normalized to unit trapezoid area on `model_axis`.
    pub fn fill(&self, model_axis: &Array1<f64>) -> Result<Array1<f64>> {
        if self.values.len() != model_axis.len() {
            return Err(TarFitError::DimensionMismatch(format!(
                "measured IRF has {} values for a model axis of length {}",
                self.values.len(),
                model_axis.len()
            )));
        }
        let kernel = Array1::from(self.values.clone());
        let area = crate::utils::trapezoid_area(model_axis.view(), kernel.view());
        if area == 0.0 || !area.is_finite() {
            return Err(TarFitError::InvalidInput(
                "measured IRF has no finite non-zero area".to_string(),
            ));
        }
        Ok(kernel / area)
    }
}

/// The IRF of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Irf {
    Gaussian(GaussianIrf),
    Measured(MeasuredIrf),
}

impl From<GaussianIrf> for Irf {
    fn from(irf: GaussianIrf) -> Self {
        Irf::Gaussian(irf)
    }
}

impl From<MeasuredIrf> for Irf {
    fn from(irf: MeasuredIrf) -> Self {
        Irf::Measured(irf)
    }
}

impl Irf {
    pub fn is_dispersed(&self) -> bool {
        matches!(self, Irf::Gaussian(irf) if irf.is_dispersed())
    }

    pub fn is_gaussian(&self) -> bool {
        matches!(self, Irf::Gaussian(_))
    }

    pub fn parameter_labels(&self) -> Vec<String> {
        match self {
            Irf::Gaussian(irf) => irf.parameter_labels(),
            Irf::Measured(_) => Vec::new(),
        }
    }

    pub fn problems(&self, label: &str) -> Vec<String> {
        match self {
            Irf::Gaussian(irf) => irf.problems(label),
            Irf::Measured(irf) => irf.problems(label),
        }
    }

    /// Resolve parameters and, for a measured kernel, check it against the
    /// model axis.
    pub fn fill(&self, parameters: &Parameters, model_axis: &Array1<f64>) -> Result<FilledIrf> {
        Ok(match self {
            Irf::Gaussian(irf) => FilledIrf::Gaussian(irf.fill(parameters)?),
            Irf::Measured(irf) => FilledIrf::Measured(irf.fill(model_axis)?),
        })
    }
}

/// An IRF ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilledIrf {
    Gaussian(FilledGaussianIrf),
    /// Kernel with unit area on the model axis
    Measured(Array1<f64>),
}

impl FilledIrf {
    pub fn gaussian(&self) -> Option<&FilledGaussianIrf> {
        match self {
            FilledIrf::Gaussian(irf) => Some(irf),
            FilledIrf::Measured(_) => None,
        }
    }
}
