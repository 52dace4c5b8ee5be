use super::{Problem, ProblemCore};
use crate::error::Result;
use crate::matrix::ClpVector;
use crate::scheme::Scheme;
use ndarray::{Array1, Array2};

/// Every dataset and global index is solved on its own.
#[derive(Debug)]
pub struct UngroupedProblem {
    core: ProblemCore,
}

impl UngroupedProblem {
    pub fn new(scheme: Scheme) -> Result<Self> {
        let mut problem = Self {
            core: ProblemCore::new(scheme, false)?,
        };
        problem.calculate()?;
        Ok(problem)
    }
}

impl Problem for UngroupedProblem {
    fn core(&self) -> &ProblemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProblemCore {
        &mut self.core
    }

    fn calculate(&mut self) -> Result<()> {
        let core = &mut self.core;
        core.warnings.clear();
        let labels: Vec<String> = core.scheme.data.keys().cloned().collect();

        for label in &labels {
            let global_size = core.global_size(label);
            let mut full = Vec::with_capacity(global_size);
            let mut reduced = Vec::with_capacity(global_size);
            let mut residual = Array2::zeros((core.model_size(label), global_size));

            for index in 0..global_size {
                let matrix = core.weighted_reduced_matrix(label, index)?;
                let solution = core.solve(&matrix, core.weighted_data_column(label, index)?)?;
                let global_value = core.global_value(label, index);
                core.check_rank(label, global_value, Some(index), &solution, matrix.ncols());

                residual.column_mut(index).assign(&solution.residual);
                let clps = ClpVector::new(matrix.clp_labels, solution.clps);
                full.push(core.retrieve(label, index, &clps)?);
                reduced.push(clps);
            }
            core.store(label, full, reduced, residual);
        }
        Ok(())
    }

    fn full_penalty(&self) -> Array1<f64> {
        self.core
            .residuals
            .values()
            .flat_map(|residual| residual.columns().into_iter().flat_map(|c| c.into_iter().copied()))
            .collect()
    }
}
