//! Kinetic decay megacomplex.
//!
//! The concentration of each compartment is a sum of `t^p exp(-k t)` terms
//! obtained from the K-matrix, optionally convolved with the dataset's IRF:
//! analytically for a Gaussian IRF, numerically for a measured one.

use crate::error::{Result, TarFitError};
use crate::matrix::ClpTable;
use crate::megacomplexes::k_matrix::{DecaySystem, DecayTerm, KMatrix};
use crate::model::{DatasetDescriptor, DatasetModel, DerivedQuantity, FilledIrf, GaussianComponent, Megacomplex, Model, QuantityAxis};
use ndarray::{Array1, Array2};
use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

/// Above this argument `erfc` underflows and the scaled asymptotic form is
/// used instead.
const ERFC_ASYMPTOTIC_THRESHOLD: f64 = 5.0;

/// `exp(-k t)` for `t >= 0`, zero before.
pub fn decay_without_irf(rate: f64, t: f64) -> f64 {
    if t < 0.0 {
        0.0
    } else {
        (-rate * t).exp()
    }
}

/// `exp(-k t)` convolved with a normalized Gaussian of the given center and
/// width.
pub fn decay_with_gaussian(rate: f64, t: f64, center: f64, width: f64) -> f64 {
    let alpha = rate * width / SQRT_2;
    let beta = (t - center) / (width * SQRT_2);
    let x = alpha - beta;
    if x <= ERFC_ASYMPTOTIC_THRESHOLD {
        0.5 * (alpha * (alpha - 2.0 * beta)).exp() * erfc(x)
    } else {
        // exp(x^2) erfc(x) ~ 1 / (x sqrt(pi)) (1 - 1 / (2 x^2))
        let scaled_erfc = (1.0 - 1.0 / (2.0 * x * x)) / (x * PI.sqrt());
        0.5 * scaled_erfc * (-beta * beta).exp()
    }
}

/// `t^power exp(-k t)` for `t >= 0`, zero before.
pub fn power_decay_without_irf(rate: f64, power: u32, t: f64) -> f64 {
    t.powi(power as i32) * decay_without_irf(rate, t)
}

/// `t^power exp(-k t)` convolved with a normalized Gaussian.
///
/// With `u = t - center`, `h_p = (u - k w^2) h_{p-1} + w^2 (p - 1) h_{p-2}`,
/// plus `w^2 phi(u)` for `p = 1`, starting from [`decay_with_gaussian`].
pub fn power_decay_with_gaussian(rate: f64, power: u32, t: f64, center: f64, width: f64) -> f64 {
    let u = t - center;
    let w2 = width * width;
    let mut previous = 0.0;
    let mut current = decay_with_gaussian(rate, t, center, width);
    for p in 1..=power {
        let mut next = (u - rate * w2) * current + w2 * f64::from(p - 1) * previous;
        if p == 1 {
            next += w2 * (-u * u / (2.0 * w2)).exp() / (width * (2.0 * PI).sqrt());
        }
        previous = current;
        current = next;
    }
    current
}

/// `t^power exp(-k t)` convolved with a kernel sampled on `axis`, by the
/// trapezoid rule over the kernel's samples.
pub fn power_decay_with_kernel(rate: f64, power: u32, axis: &Array1<f64>, kernel: &Array1<f64>) -> Array1<f64> {
    let n = axis.len();
    let weights = Array1::from_shape_fn(n, |j| {
        let lower = if j == 0 { axis[0] } else { axis[j - 1] };
        let upper = if j + 1 == n { axis[n - 1] } else { axis[j + 1] };
        0.5 * (upper - lower) * kernel[j]
    });
    axis.mapv(|t| {
        axis.iter()
            .zip(&weights)
            .map(|(&s, &w)| {
                let lag = t - s;
                if lag == 0.0 {
                    // half of the jump at zero lag
                    0.5 * w * power_decay_without_irf(rate, power, 0.0)
                } else {
                    w * power_decay_without_irf(rate, power, lag)
                }
            })
            .sum()
    })
}

/// A megacomplex driven by a K-matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayMegacomplex {
    k_matrix: KMatrix,
}

impl DecayMegacomplex {
    pub fn new(k_matrix: KMatrix) -> Self {
        Self { k_matrix }
    }

    pub fn k_matrix(&self) -> &KMatrix {
        &self.k_matrix
    }

    fn system(&self, dataset: &DatasetDescriptor) -> Result<DecaySystem> {
        let initial = dataset.initial_concentration.as_ref().ok_or_else(|| {
            TarFitError::ModelValidation(format!(
                "Decay megacomplex in dataset '{}' needs an initial concentration",
                dataset.label
            ))
        })?;
        self.k_matrix.solve(dataset.parameters(), |c| initial.value(c))
    }

    /// The basis functions of the system on the model axis, one column per
    /// term.
    fn basis(terms: &[DecayTerm], model_axis: &Array1<f64>, irf: Option<&FilledIrf>, global_value: Option<f64>) -> Array2<f64> {
        let components: Option<Vec<GaussianComponent>> =
            irf.and_then(FilledIrf::gaussian).map(|g| g.components_at(global_value));
        let mut basis = Array2::zeros((model_axis.len(), terms.len()));
        for (j, term) in terms.iter().enumerate() {
            let column = match (irf, &components) {
                (Some(FilledIrf::Measured(kernel)), _) => {
                    power_decay_with_kernel(term.rate, term.power, model_axis, kernel)
                }
                (_, Some(components)) => model_axis.mapv(|t| {
                    components
                        .iter()
                        .map(|g| g.scale * power_decay_with_gaussian(term.rate, term.power, t, g.center, g.width))
                        .sum::<f64>()
                }),
                _ => model_axis.mapv(|t| power_decay_without_irf(term.rate, term.power, t)),
            };
            basis.column_mut(j).assign(&column);
        }
        basis
    }
}

impl Megacomplex for DecayMegacomplex {
    fn type_name(&self) -> &str {
        "decay"
    }

    fn parameter_labels(&self) -> Vec<String> {
        self.k_matrix.rate_labels()
    }

    fn clp_labels(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        self.k_matrix.compartments()
    }

    fn is_index_dependent(&self, model: &Model, dataset: &DatasetModel) -> bool {
        model.dataset_irf(dataset).map_or(false, |irf| irf.is_dispersed())
    }

    fn validate(&self, model: &Model, dataset: &DatasetModel) -> Vec<String> {
        let mut problems = Vec::new();
        if self.k_matrix.transfers.is_empty() {
            problems.push("Decay megacomplex has an empty K-matrix".to_string());
        }
        if self.k_matrix.topological_order().is_none() {
            problems.push("Decay megacomplex K-matrix transfers form a cycle".to_string());
        }
        match dataset
            .initial_concentration
            .as_deref()
            .and_then(|l| model.initial_concentration(l))
        {
            None => problems.push("Decay megacomplex needs an initial concentration".to_string()),
            Some(ic) => {
                for c in self.k_matrix.compartments() {
                    if !ic.compartments.contains(&c) {
                        problems.push(format!(
                            "Compartment '{}' has no initial concentration",
                            c
                        ));
                    }
                }
            }
        }
        problems
    }

    fn calculate_matrix(
        &self,
        dataset: &DatasetDescriptor,
        global_index: Option<usize>,
        model_axis: &Array1<f64>,
    ) -> Result<(Vec<String>, Array2<f64>)> {
        let system = self.system(dataset)?;
        let basis = Self::basis(
            &system.terms,
            model_axis,
            dataset.irf.as_ref(),
            dataset.global_value(global_index),
        );

        let labels = self.k_matrix.compartments();
        let mut matrix = Array2::zeros((model_axis.len(), labels.len()));
        for (column, label) in labels.iter().enumerate() {
            if let Some(i) = system.order.iter().position(|c| c == label) {
                let weights = Array1::from(system.amplitudes[i].clone());
                matrix.column_mut(column).assign(&basis.dot(&weights));
            }
        }
        Ok((labels, matrix))
    }

    /// Species associated spectra (the clps of the compartments) and decay
    /// associated spectra (their projection on the basis terms, labelled by
    /// term).
    fn derived_quantities(&self, dataset: &DatasetDescriptor, clps: &ClpTable) -> Result<Vec<DerivedQuantity>> {
        let system = self.system(dataset)?;
        let n_global = clps.values.nrows();
        let n = system.order.len();

        let mut sas = Array2::zeros((n_global, n));
        for (j, compartment) in system.order.iter().enumerate() {
            if let Some(column) = clps.column(compartment) {
                sas.column_mut(j).assign(&column);
            }
        }

        // das[:, j] = sum_i sas[:, i] * amplitudes[i][j]
        let amplitudes = Array2::from_shape_fn((n, system.terms.len()), |(i, j)| system.amplitudes[i][j]);
        let das = sas.dot(&amplitudes);

        Ok(vec![
            DerivedQuantity {
                name: "species_associated_spectra".to_string(),
                axis: QuantityAxis::Global,
                labels: system.order.clone(),
                values: sas,
            },
            DerivedQuantity {
                name: "decay_associated_spectra".to_string(),
                axis: QuantityAxis::Global,
                labels: system.terms.into_iter().map(|t| t.label).collect(),
                values: das,
            },
        ])
    }
}
