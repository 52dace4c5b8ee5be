//! Residual problems over all datasets of a scheme.
//!
//! A problem owns the matrices, reduced matrices, clps and residuals for one
//! parameter snapshot. Two strategies differ only in how the linear problems
//! are formed: [`UngroupedProblem`] solves every dataset index on its own,
//! [`GroupedProblem`] solves datasets sharing a global-axis value together.

mod grouped;
mod ungrouped;

pub use grouped::{DatasetGroup, GroupedProblem};
pub use ungrouped::UngroupedProblem;

use crate::builder::build_dataset_matrices;
use crate::error::{Result, TarFitError};
use crate::matrix::{ClpTable, ClpVector, DatasetMatrices, LabeledMatrix};
use crate::model::DatasetDescriptor;
use crate::parameters::Parameters;
use crate::reduction::{reduce, ActiveRules, ReducedMatrix};
use crate::scheme::Scheme;
use crate::varpro::{self, LinearSolution};
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A rank-deficient linear solve. The minimum-norm solution was used.
#[derive(Debug, Clone, PartialEq)]
pub struct SingularSystemWarning {
    /// Dataset label, or the group label in grouped mode
    pub label: String,
    /// Global-axis value of the solve
    pub global_value: f64,
    /// Index on the dataset's global axis. `None` for a group, whose members
    /// sit at different indices of their own axes.
    pub global_index: Option<usize>,
    pub rank: usize,
    pub columns: usize,
}

impl fmt::Display for SingularSystemWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' at global value {}: rank {} for {} columns",
            self.label, self.global_value, self.rank, self.columns
        )
    }
}

/// State shared by both problem strategies.
#[derive(Debug)]
pub struct ProblemCore {
    scheme: Scheme,
    parameters: Arc<Parameters>,
    index_dependent: bool,
    /// Parameters each dataset's matrices depend on
    dataset_parameters: BTreeMap<String, BTreeSet<String>>,
    relation_parameters: BTreeSet<String>,
    /// Rules active at each global index, per dataset
    rules: BTreeMap<String, Vec<ActiveRules>>,
    weighted_data: BTreeMap<String, Array2<f64>>,
    descriptors: BTreeMap<String, DatasetDescriptor>,
    matrices: BTreeMap<String, DatasetMatrices>,
    reduced_matrices: BTreeMap<String, Vec<ReducedMatrix>>,
    clps: BTreeMap<String, ClpTable>,
    reduced_clps: BTreeMap<String, Vec<ClpVector>>,
    residuals: BTreeMap<String, Array2<f64>>,
    warnings: Vec<SingularSystemWarning>,
    /// Reduction is left to the problem strategy; see [`ProblemCore::stale`]
    deferred_reduction: bool,
    /// Datasets whose reduced matrices are out of date
    stale: BTreeSet<String>,
}

impl ProblemCore {
    /// Validate the scheme and build every matrix for its parameters.
    ///
    /// With `deferred_reduction` the matrices are not reduced per dataset;
    /// datasets needing a new reduction are collected in
    /// [`ProblemCore::stale`] instead.
    pub fn new(scheme: Scheme, deferred_reduction: bool) -> Result<Self> {
        scheme.validate()?;
        let model = Arc::clone(&scheme.model);

        let mut parameters = scheme.parameters.clone();
        parameters.update_expressions()?;

        let dataset_parameters = model
            .datasets()
            .iter()
            .map(|(label, dataset)| (label.clone(), model.dataset_parameter_labels(dataset)))
            .collect();
        let relation_parameters = model.relations().iter().map(|r| r.parameter.clone()).collect();
        let rules = scheme
            .data
            .iter()
            .map(|(label, dataset)| {
                let active = dataset
                    .global_axis
                    .iter()
                    .map(|&x| ActiveRules::at(&model, x))
                    .collect();
                (label.clone(), active)
            })
            .collect();
        let weighted_data = scheme
            .data
            .iter()
            .map(|(label, dataset)| (label.clone(), dataset.weighted_data()))
            .collect();

        let mut core = Self {
            index_dependent: model.is_index_dependent(),
            parameters: Arc::new(parameters),
            scheme,
            dataset_parameters,
            relation_parameters,
            rules,
            weighted_data,
            descriptors: BTreeMap::new(),
            matrices: BTreeMap::new(),
            reduced_matrices: BTreeMap::new(),
            clps: BTreeMap::new(),
            reduced_clps: BTreeMap::new(),
            residuals: BTreeMap::new(),
            warnings: Vec::new(),
            deferred_reduction,
            stale: BTreeSet::new(),
        };
        let labels: Vec<String> = core.scheme.data.keys().cloned().collect();
        core.build_datasets(&labels)?;
        core.invalidate(labels)?;
        Ok(core)
    }

    /// Reduce the given datasets now, or mark them stale when reduction is
    /// deferred.
    fn invalidate(&mut self, labels: Vec<String>) -> Result<()> {
        if self.deferred_reduction {
            self.stale.extend(labels);
            Ok(())
        } else {
            self.reduce_datasets(&labels)
        }
    }

    /// Datasets whose reduced matrices must be recomputed.
    pub fn stale(&self) -> &BTreeSet<String> {
        &self.stale
    }

    /// Install a new parameter snapshot, rebuilding only datasets whose
    /// parameters changed. A changed relation parameter re-reduces every
    /// dataset.
    fn update(&mut self, mut parameters: Parameters) -> Result<()> {
        parameters.update_expressions()?;
        let changed: BTreeSet<String> = parameters
            .iter()
            .filter(|(label, p)| {
                self.parameters
                    .get(label)
                    .map_or(true, |old| old.value() != p.value())
            })
            .map(|(label, _)| label.clone())
            .collect();
        self.parameters = Arc::new(parameters);
        if changed.is_empty() {
            return Ok(());
        }

        let rebuild: Vec<String> = self
            .scheme
            .data
            .keys()
            .filter(|label| {
                self.dataset_parameters
                    .get(*label)
                    .map_or(true, |used| !used.is_disjoint(&changed))
            })
            .cloned()
            .collect();
        self.build_datasets(&rebuild)?;

        if self.relation_parameters.is_disjoint(&changed) {
            self.invalidate(rebuild)
        } else {
            let all: Vec<String> = self.scheme.data.keys().cloned().collect();
            self.invalidate(all)
        }
    }

    fn build_datasets(&mut self, labels: &[String]) -> Result<()> {
        for label in labels {
            let Some(dataset) = self.scheme.data.get(label) else {
                continue;
            };
            let descriptor = self.scheme.model.fill(
                label,
                Arc::clone(&self.parameters),
                &dataset.model_axis,
                &dataset.global_axis,
            )?;
            let matrices = build_dataset_matrices(&descriptor, self.index_dependent, self.scheme.config.parallel)?;
            self.descriptors.insert(label.clone(), descriptor);
            self.matrices.insert(label.clone(), matrices);
        }
        Ok(())
    }

    fn reduce_datasets(&mut self, labels: &[String]) -> Result<()> {
        for label in labels {
            let (Some(matrices), Some(rules), Some(dataset)) = (
                self.matrices.get(label),
                self.rules.get(label),
                self.scheme.data.get(label),
            ) else {
                continue;
            };

            let mut reduced: Vec<ReducedMatrix> = Vec::with_capacity(rules.len());
            for (i, active) in rules.iter().enumerate() {
                let shared = !matrices.is_index_dependent() && i > 0 && rules[i - 1] == *active;
                let next = if shared {
                    reduced[i - 1].clone()
                } else {
                    let matrix = matrices.at(i).ok_or_else(|| missing_index(label, i))?;
                    reduce(
                        matrix,
                        &self.scheme.model,
                        active,
                        &self.parameters,
                        &[dataset.model_axis.view()],
                    )?
                };
                reduced.push(next);
            }
            self.reduced_matrices.insert(label.clone(), reduced);
        }
        Ok(())
    }

    fn global_size(&self, label: &str) -> usize {
        self.scheme.data.get(label).map_or(0, |d| d.global_size())
    }

    fn model_size(&self, label: &str) -> usize {
        self.scheme.data.get(label).map_or(0, |d| d.model_size())
    }

    /// The unreduced matrix of a dataset at an index.
    fn matrix_at(&self, label: &str, index: usize) -> Result<&LabeledMatrix> {
        self.matrices
            .get(label)
            .and_then(|m| m.at(index))
            .ok_or_else(|| missing_index(label, index))
    }

    fn weight_column(&self, label: &str, index: usize) -> Option<ArrayView1<'_, f64>> {
        self.scheme
            .data
            .get(label)
            .and_then(|d| d.weight.as_ref())
            .filter(|w| index < w.ncols())
            .map(|w| w.column(index))
    }

    /// The global-axis value of a dataset index.
    fn global_value(&self, label: &str, index: usize) -> f64 {
        self.scheme
            .data
            .get(label)
            .and_then(|d| d.global_axis.get(index).copied())
            .unwrap_or(f64::NAN)
    }

    /// The reduced matrix at an index with the dataset weight applied.
    fn weighted_reduced_matrix(&self, label: &str, index: usize) -> Result<LabeledMatrix> {
        let reduced = self
            .reduced_matrices
            .get(label)
            .and_then(|r| r.get(index))
            .ok_or_else(|| missing_index(label, index))?;
        Ok(match self.weight_column(label, index) {
            Some(weight) => reduced.matrix.weighted(weight),
            None => reduced.matrix.clone(),
        })
    }

    fn weighted_data_column(&self, label: &str, index: usize) -> Result<ArrayView1<'_, f64>> {
        self.weighted_data
            .get(label)
            .filter(|data| index < data.ncols())
            .map(|data| data.column(index))
            .ok_or_else(|| missing_index(label, index))
    }

    fn non_negative_mask(&self, labels: &[String]) -> Vec<bool> {
        if self.scheme.config.non_negative_least_squares {
            return vec![true; labels.len()];
        }
        let declared = self.scheme.model.non_negative_clps();
        labels.iter().map(|l| declared.contains(l)).collect()
    }

    fn solve(&self, matrix: &LabeledMatrix, data: ArrayView1<'_, f64>) -> Result<LinearSolution> {
        let mask = self.non_negative_mask(&matrix.clp_labels);
        varpro::solve(matrix.values.view(), data, &mask)
    }

    /// Record a rank-deficient solve.
    fn check_rank(
        &mut self,
        label: &str,
        global_value: f64,
        global_index: Option<usize>,
        solution: &LinearSolution,
        columns: usize,
    ) {
        if !solution.rank_deficient {
            return;
        }
        tracing::warn!(
            label,
            global_value,
            rank = solution.rank,
            columns,
            "rank-deficient linear problem, using the minimum-norm solution"
        );
        self.warnings.push(SingularSystemWarning {
            label: label.to_string(),
            global_value,
            global_index,
            rank: solution.rank,
            columns,
        });
    }

    /// Expand reduced clps at an index to the full labels of the matrix.
    fn retrieve(&self, label: &str, index: usize, reduced: &ClpVector) -> Result<ClpVector> {
        let full = self.matrix_at(label, index)?;
        let removed = self
            .reduced_matrices
            .get(label)
            .and_then(|r| r.get(index))
            .map_or(&[][..], |r| &r.removed[..]);
        let values = varpro::retrieve_clps(&full.clp_labels, &reduced.labels, reduced.values.view(), removed);
        Ok(ClpVector::new(full.clp_labels.clone(), values))
    }

    fn store(&mut self, label: &str, full: Vec<ClpVector>, reduced: Vec<ClpVector>, residual: Array2<f64>) {
        let labels = self
            .matrices
            .get(label)
            .map(DatasetMatrices::clp_labels)
            .unwrap_or_default();
        self.clps
            .insert(label.to_string(), ClpTable::from_vectors(labels, &full));
        self.reduced_clps.insert(label.to_string(), reduced);
        self.residuals.insert(label.to_string(), residual);
    }
}

fn missing_index(label: &str, index: usize) -> TarFitError {
    TarFitError::DimensionMismatch(format!(
        "Dataset '{}' has no matrix for global index {}",
        label, index
    ))
}

/// The residual problem of a scheme.
///
/// Results are keyed by dataset label. Clp tables and residuals hold one
/// column (residuals) or row (clps) per global index.
pub trait Problem: fmt::Debug {
    fn core(&self) -> &ProblemCore;

    fn core_mut(&mut self) -> &mut ProblemCore;

    /// Solve the linear problems for the current matrices.
    fn calculate(&mut self) -> Result<()>;

    /// All weighted residuals as one vector, the penalty the minimizer sees.
    fn full_penalty(&self) -> Array1<f64>;

    /// Evaluate the problem for a new parameter snapshot.
    fn update_parameters(&mut self, parameters: Parameters) -> Result<()> {
        self.core_mut().update(parameters)?;
        self.calculate()
    }

    fn scheme(&self) -> &Scheme {
        &self.core().scheme
    }

    fn parameters(&self) -> &Parameters {
        &self.core().parameters
    }

    fn descriptors(&self) -> &BTreeMap<String, DatasetDescriptor> {
        &self.core().descriptors
    }

    /// Unreduced matrices on the full label set.
    fn matrices(&self) -> &BTreeMap<String, DatasetMatrices> {
        &self.core().matrices
    }

    /// Matrices after constraints and relations, one per global index.
    fn reduced_matrices(&self) -> &BTreeMap<String, Vec<ReducedMatrix>> {
        &self.core().reduced_matrices
    }

    /// Clps on the full label set, removed clps included.
    fn clps(&self) -> &BTreeMap<String, ClpTable> {
        &self.core().clps
    }

    /// Clps of the reduced matrices, one vector per global index.
    fn reduced_clps(&self) -> &BTreeMap<String, Vec<ClpVector>> {
        &self.core().reduced_clps
    }

    /// Weighted residuals, `[model, global]`.
    fn residuals(&self) -> &BTreeMap<String, Array2<f64>> {
        &self.core().residuals
    }

    /// Rank-deficient solves of the last calculation.
    fn warnings(&self) -> &[SingularSystemWarning] {
        &self.core().warnings
    }
}

/// Validate a scheme and create the problem strategy its config asks for.
pub fn create_problem(scheme: Scheme) -> Result<Box<dyn Problem>> {
    if scheme.config.is_grouped(scheme.data.len()) {
        Ok(Box::new(GroupedProblem::new(scheme)?))
    } else {
        Ok(Box::new(UngroupedProblem::new(scheme)?))
    }
}
