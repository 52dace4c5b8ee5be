use super::{Problem, ProblemCore};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::matrix::{combine_matrices, concat_vectors, ClpVector, LabeledMatrix};
use crate::reduction::{reduce, ActiveRules, ReducedMatrix};
use crate::scheme::Scheme;
use ndarray::{s, Array1, Array2, Axis};
use std::collections::BTreeMap;
use std::ops::Range;

/// Dataset indices solved as one linear problem.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetGroup {
    /// Member dataset labels concatenated
    pub label: String,
    /// Global-axis value that opened the group
    pub global_value: f64,
    /// `(dataset label, global index)` in dataset order
    pub members: Vec<(String, usize)>,
}

impl DatasetGroup {
    fn has_dataset(&self, label: &str) -> bool {
        self.members.iter().any(|(l, _)| l == label)
    }
}

/// Bucket dataset indices by global-axis value.
///
/// Datasets are visited in label order and their indices in axis order. An
/// index joins the first group whose value is within `tolerance` and has no
/// member from the same dataset; otherwise it opens a new group.
pub fn create_groups(data: &BTreeMap<String, Dataset>, tolerance: f64) -> Vec<DatasetGroup> {
    let mut groups: Vec<DatasetGroup> = Vec::new();
    for (label, dataset) in data {
        for (index, &value) in dataset.global_axis.iter().enumerate() {
            let existing = groups
                .iter_mut()
                .find(|g| (g.global_value - value).abs() <= tolerance && !g.has_dataset(label));
            match existing {
                Some(group) => {
                    group.label.push_str(label);
                    group.members.push((label.clone(), index));
                }
                None => groups.push(DatasetGroup {
                    label: label.clone(),
                    global_value: value,
                    members: vec![(label.clone(), index)],
                }),
            }
        }
    }
    groups
}

/// Datasets sharing a global-axis value are solved together.
///
/// The unreduced member matrices of a group are stacked row-wise, aligning
/// columns on clp label, so a label present in several datasets is one
/// amplitude for the whole group. Constraints and relations active at the
/// group's global value are then applied to the combined matrix, which lets
/// them tie clps of different datasets.
#[derive(Debug)]
pub struct GroupedProblem {
    core: ProblemCore,
    groups: Vec<DatasetGroup>,
    rules: Vec<ActiveRules>,
    /// Unweighted reduced matrix of each group
    reduced: Vec<ReducedMatrix>,
    penalty: Array1<f64>,
}

impl GroupedProblem {
    pub fn new(scheme: Scheme) -> Result<Self> {
        let mut core = ProblemCore::new(scheme, true)?;
        let groups = create_groups(&core.scheme.data, core.scheme.config.group_tolerance);
        tracing::debug!(
            groups = groups.len(),
            datasets = core.scheme.data.len(),
            "created dataset groups"
        );
        let rules = groups
            .iter()
            .map(|g| ActiveRules::at(&core.scheme.model, g.global_value))
            .collect();

        let placeholder = ReducedMatrix::unreduced(LabeledMatrix::empty(0));
        core.reduced_matrices = core
            .scheme
            .data
            .iter()
            .map(|(label, dataset)| (label.clone(), vec![placeholder.clone(); dataset.global_size()]))
            .collect();

        let mut problem = Self {
            core,
            reduced: vec![placeholder; groups.len()],
            groups,
            rules,
            penalty: Array1::zeros(0),
        };
        problem.calculate()?;
        Ok(problem)
    }

    pub fn groups(&self) -> &[DatasetGroup] {
        &self.groups
    }

    /// The reduced matrix of each group, before weighting.
    pub fn group_matrices(&self) -> &[ReducedMatrix] {
        &self.reduced
    }

    /// Reduce every group with a stale member and refresh the members'
    /// views of the reduction.
    fn reduce_groups(&mut self) -> Result<()> {
        let core = &mut self.core;
        if core.stale.is_empty() {
            return Ok(());
        }
        for (g, group) in self.groups.iter().enumerate() {
            if !group.members.iter().any(|(label, _)| core.stale.contains(label)) {
                continue;
            }
            let blocks = group
                .members
                .iter()
                .map(|(label, index)| core.matrix_at(label, *index))
                .collect::<Result<Vec<&LabeledMatrix>>>()?;
            let combined = combine_matrices(&blocks);
            let axes: Vec<_> = group
                .members
                .iter()
                .filter_map(|(label, _)| core.scheme.data.get(label))
                .map(|d| d.model_axis.view())
                .collect();
            let reduced = reduce(&combined, &core.scheme.model, &self.rules[g], &core.parameters, &axes)?;

            let mut offset = 0;
            let mut views = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let rows = offset..offset + block.nrows();
                views.push(member_view(&reduced, block, rows));
                offset += block.nrows();
            }
            for ((label, index), view) in group.members.iter().zip(views) {
                if let Some(slot) = core.reduced_matrices.get_mut(label).and_then(|r| r.get_mut(*index)) {
                    *slot = view;
                }
            }
            self.reduced[g] = reduced;
        }
        core.stale.clear();
        Ok(())
    }

    /// Row weights of a group, or `None` when no member is weighted.
    fn group_weights(&self, group: &DatasetGroup) -> Option<Array1<f64>> {
        let core = &self.core;
        if group.members.iter().all(|(l, i)| core.weight_column(l, *i).is_none()) {
            return None;
        }
        let parts: Vec<Array1<f64>> = group
            .members
            .iter()
            .map(|(label, index)| match core.weight_column(label, *index) {
                Some(weight) => weight.to_owned(),
                None => Array1::ones(core.model_size(label)),
            })
            .collect();
        Some(concat_vectors(&parts))
    }
}

/// The part of a group reduction that concerns one member: its rows, and the
/// surviving columns its own clps resolve to. The removal log is the group's,
/// so ties to clps of other members are recovered too.
fn member_view(reduced: &ReducedMatrix, block: &LabeledMatrix, rows: Range<usize>) -> ReducedMatrix {
    let mut columns: Vec<usize> = block
        .clp_labels
        .iter()
        .filter_map(|label| reduced.resolve(label).map(|(column, _)| column))
        .collect();
    columns.sort_unstable();
    columns.dedup();

    let values = reduced
        .matrix
        .values
        .slice(s![rows, ..])
        .select(Axis(1), &columns);
    let clp_labels = columns
        .iter()
        .map(|&j| reduced.matrix.clp_labels[j].clone())
        .collect();
    ReducedMatrix {
        matrix: LabeledMatrix { clp_labels, values },
        removed: reduced.removed.clone(),
    }
}

/// Per-dataset results collected while the groups are solved.
struct DatasetOutput {
    full: Vec<ClpVector>,
    reduced: Vec<ClpVector>,
    residual: Array2<f64>,
}

impl Problem for GroupedProblem {
    fn core(&self) -> &ProblemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProblemCore {
        &mut self.core
    }

    fn calculate(&mut self) -> Result<()> {
        self.reduce_groups()?;
        let weights: Vec<Option<Array1<f64>>> = self.groups.iter().map(|g| self.group_weights(g)).collect();

        let core = &mut self.core;
        core.warnings.clear();

        let empty = ClpVector::new(Vec::new(), Array1::zeros(0));
        let mut outputs: BTreeMap<String, DatasetOutput> = core
            .scheme
            .data
            .iter()
            .map(|(label, dataset)| {
                let output = DatasetOutput {
                    full: vec![empty.clone(); dataset.global_size()],
                    reduced: vec![empty.clone(); dataset.global_size()],
                    residual: Array2::zeros((dataset.model_size(), dataset.global_size())),
                };
                (label.clone(), output)
            })
            .collect();

        let mut penalties = Vec::with_capacity(self.groups.len());
        for ((group, reduced), weight) in self.groups.iter().zip(&self.reduced).zip(&weights) {
            let matrix = match weight {
                Some(weight) => reduced.matrix.weighted(weight.view()),
                None => reduced.matrix.clone(),
            };
            let data = concat_vectors(
                &group
                    .members
                    .iter()
                    .map(|(label, index)| core.weighted_data_column(label, *index).map(|c| c.to_owned()))
                    .collect::<Result<Vec<_>>>()?,
            );

            let solution = core.solve(&matrix, data.view())?;
            core.check_rank(&group.label, group.global_value, None, &solution, matrix.ncols());

            let mut offset = 0;
            for (label, index) in &group.members {
                let rows = core.model_size(label);
                let member_labels = core
                    .reduced_matrices
                    .get(label)
                    .and_then(|r| r.get(*index))
                    .map(|r| r.matrix.clp_labels.clone())
                    .unwrap_or_default();
                let values: Array1<f64> = member_labels
                    .iter()
                    .map(|l| matrix.position(l).map_or(0.0, |j| solution.clps[j]))
                    .collect();
                let member_clps = ClpVector::new(member_labels, values);
                let full = core.retrieve(label, *index, &member_clps)?;

                if let Some(output) = outputs.get_mut(label) {
                    output
                        .residual
                        .column_mut(*index)
                        .assign(&solution.residual.slice(s![offset..offset + rows]));
                    output.full[*index] = full;
                    output.reduced[*index] = member_clps;
                }
                offset += rows;
            }
            penalties.push(solution.residual);
        }

        for (label, output) in outputs {
            core.store(&label, output.full, output.reduced, output.residual);
        }
        self.penalty = concat_vectors(&penalties);
        Ok(())
    }

    fn full_penalty(&self) -> Array1<f64> {
        self.penalty.clone()
    }
}
