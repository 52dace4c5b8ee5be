//! Reduction of model matrices by clp constraints and relations.
//!
//! Every removed column is recorded together with how its clp is recovered
//! after the linear solve: either fixed at zero or tied to a surviving clp
//! with a factor. Ties are always recorded against a column that is still
//! present at the time of removal, so back-substitution in reverse removal
//! order sees every source value before it is needed.

use crate::error::Result;
use crate::matrix::LabeledMatrix;
use crate::model::{ClpConstraint, Model, Relation};
use crate::parameters::Parameters;
use crate::utils::trapezoid_area;
use ndarray::{s, ArrayView1};

/// How a removed clp is recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// The clp is exactly zero
    Zero,
    /// The clp is `factor` times the clp of `source`
    Tied { source: String, factor: f64 },
}

/// A clp removed from a matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedClp {
    pub label: String,
    pub removal: Removal,
}

/// A matrix after constraints and relations, with the removed clps in
/// removal order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedMatrix {
    pub matrix: LabeledMatrix,
    pub removed: Vec<RemovedClp>,
}

impl ReducedMatrix {
    /// A matrix nothing has been removed from.
    pub fn unreduced(matrix: LabeledMatrix) -> Self {
        Self {
            matrix,
            removed: Vec::new(),
        }
    }

    fn removal_of(&self, label: &str) -> Option<&Removal> {
        self.removed
            .iter()
            .find(|r| r.label == label)
            .map(|r| &r.removal)
    }

    /// Follow ties from `label` to a present column. Returns the column
    /// index and the compounded factor, or `None` if the chain ends in a
    /// zeroed or unknown clp.
    pub(crate) fn resolve(&self, label: &str) -> Option<(usize, f64)> {
        let mut label = label;
        let mut factor = 1.0;
        // a chain visits each removed label at most once
        for _ in 0..=self.removed.len() {
            if let Some(index) = self.matrix.position(label) {
                return Some((index, factor));
            }
            match self.removal_of(label)? {
                Removal::Zero => return None,
                Removal::Tied { source, factor: f } => {
                    factor *= f;
                    label = source;
                }
            }
        }
        None
    }

    fn zero(&mut self, index: usize) {
        let label = self.matrix.clp_labels[index].clone();
        self.matrix.remove_column(index);
        self.removed.push(RemovedClp {
            label,
            removal: Removal::Zero,
        });
    }

    /// Fold the column `target` into `source` with `factor` and drop it.
    fn tie(&mut self, target: usize, source: usize, factor: f64) {
        let label = self.matrix.clp_labels[target].clone();
        let source_label = self.matrix.clp_labels[source].clone();
        self.matrix.fold_column(target, source, factor);
        self.matrix.remove_column(target);
        self.removed.push(RemovedClp {
            label,
            removal: Removal::Tied {
                source: source_label,
                factor,
            },
        });
    }
}

/// The constraints and relations active at one global-axis value, as
/// indices into the model's lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveRules {
    pub constraints: Vec<usize>,
    pub relations: Vec<usize>,
}

impl ActiveRules {
    /// Evaluate the intervals of every rule at `global_value`.
    pub fn at(model: &Model, global_value: f64) -> Self {
        Self {
            constraints: model
                .constraints()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_active(global_value))
                .map(|(i, _)| i)
                .collect(),
            relations: model
                .relations()
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_active(global_value))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.relations.is_empty()
    }
}

/// Trapezoidal area of a column whose rows are split into consecutive
/// blocks, each sampled on its own model axis.
fn column_area(column: ArrayView1<'_, f64>, model_axes: &[ArrayView1<'_, f64>]) -> f64 {
    let mut offset = 0;
    let mut area = 0.0;
    for axis in model_axes {
        let end = (offset + axis.len()).min(column.len());
        area += trapezoid_area(axis.slice(s![..end - offset]), column.slice(s![offset..end]));
        offset = end;
    }
    area
}

/// Apply constraints in order. Targets that are absent or already removed
/// are skipped.
///
/// `model_axes` holds the model axis of each row block of the matrix: one
/// axis for a dataset matrix, one per member for a combined group matrix.
/// Equal-area constraints integrate every block over its own axis.
pub fn apply_constraints(
    matrix: &LabeledMatrix,
    constraints: &[&ClpConstraint],
    model_axes: &[ArrayView1<'_, f64>],
) -> ReducedMatrix {
    let mut reduced = ReducedMatrix::unreduced(matrix.clone());

    for constraint in constraints {
        let Some(target) = reduced.matrix.position(constraint.target()) else {
            continue;
        };
        match constraint {
            ClpConstraint::Zero { .. } | ClpConstraint::Only { .. } => reduced.zero(target),
            ClpConstraint::EqualArea { source, .. } => match reduced.resolve(source) {
                Some((source_index, chain_factor)) if source_index != target => {
                    let target_area = column_area(reduced.matrix.values.column(target), model_axes);
                    let source_area = column_area(reduced.matrix.values.column(source_index), model_axes);
                    if target_area == 0.0 || !target_area.is_finite() {
                        tracing::warn!(
                            clp = %constraint.target(),
                            tied_to = %source,
                            "equal-area constraint skipped: target column has no area"
                        );
                        continue;
                    }
                    reduced.tie(target, source_index, chain_factor * source_area / target_area);
                }
                Some(_) => {}
                None if reduced.removal_of(source) == Some(&Removal::Zero) => reduced.zero(target),
                None => {}
            },
        }
    }

    reduced
}

/// Apply relations: each active relation whose target is present folds the
/// target column into its source weighted by the relation parameter.
///
/// A source removed by an earlier relation is followed to the surviving
/// column; a source removed by a zero constraint turns the relation into a
/// no-op.
pub fn apply_relations(
    mut reduced: ReducedMatrix,
    relations: &[&Relation],
    parameters: &Parameters,
) -> Result<ReducedMatrix> {
    for relation in relations {
        let Some(target) = reduced.matrix.position(&relation.target) else {
            continue;
        };
        let factor = parameters.value(&relation.parameter)?;
        if let Some((source, chain_factor)) = reduced.resolve(&relation.source) {
            if source != target {
                reduced.tie(target, source, factor * chain_factor);
            }
        }
    }
    Ok(reduced)
}

/// Apply the model's active constraints, then its active relations.
pub fn reduce(
    matrix: &LabeledMatrix,
    model: &Model,
    rules: &ActiveRules,
    parameters: &Parameters,
    model_axes: &[ArrayView1<'_, f64>],
) -> Result<ReducedMatrix> {
    if rules.is_empty() {
        return Ok(ReducedMatrix::unreduced(matrix.clone()));
    }
    let constraints: Vec<&ClpConstraint> = rules
        .constraints
        .iter()
        .filter_map(|&i| model.constraints().get(i))
        .collect();
    let relations: Vec<&Relation> = rules
        .relations
        .iter()
        .filter_map(|&i| model.relations().get(i))
        .collect();

    let reduced = apply_constraints(matrix, &constraints, model_axes);
    apply_relations(reduced, &relations, parameters)
}
