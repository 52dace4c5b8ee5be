use crate::test_helpers::*;
use ndarray::{array, Array1, Array2};
use std::sync::Arc;
use tarfit_rs::builder::build_matrix;
use tarfit_rs::model::{DatasetDescriptor, DatasetModel};
use tarfit_rs::{create_problem, optimize, Dataset, Megacomplex, Model, Problem, Scheme, SchemeConfig, TarFitError};

/// A constant offset column, optionally with one column too many.
#[derive(Debug)]
struct Baseline {
    broken: bool,
}

impl Megacomplex for Baseline {
    fn type_name(&self) -> &str {
        "baseline"
    }

    fn parameter_labels(&self) -> Vec<String> {
        Vec::new()
    }

    fn clp_labels(&self, _model: &Model, _dataset: &DatasetModel) -> Vec<String> {
        vec!["baseline".to_string()]
    }

    fn is_index_dependent(&self, _model: &Model, _dataset: &DatasetModel) -> bool {
        false
    }

    fn calculate_matrix(
        &self,
        _dataset: &DatasetDescriptor,
        _global_index: Option<usize>,
        model_axis: &Array1<f64>,
    ) -> tarfit_rs::Result<(Vec<String>, Array2<f64>)> {
        let columns = if self.broken { 2 } else { 1 };
        Ok((vec!["baseline".to_string()], Array2::ones((model_axis.len(), columns))))
    }
}

fn decay_with_baseline(broken: bool) -> Model {
    let model = decay_model(parallel_k_matrix(), None, &[]);
    let dataset = DatasetModel::new(&["mc1", "base"]).with_initial_concentration("j1");
    model
        .add_megacomplex("base", Arc::new(Baseline { broken }))
        .add_dataset("dataset1", dataset)
}

fn decay_parameters() -> tarfit_rs::Parameters {
    parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)])
}

#[test]
fn test_user_megacomplex_adds_columns() {
    let model = decay_with_baseline(false);
    let params = decay_parameters();
    let global = array![600.0, 700.0];
    let clps = spectra(&["s1", "s2", "baseline"], &global);
    let data = simulated(&model, "dataset1", &params, &Array1::linspace(0.0, 10.0, 25), &global, &clps);

    let problem = create_problem(Scheme::new(model, params).with_dataset("dataset1", data)).unwrap();
    let matrix = problem.matrices()["dataset1"].at(0).unwrap();
    assert_eq!(matrix.clp_labels, vec!["s1", "s2", "baseline"]);
    assert!(matrix.column("baseline").unwrap().iter().all(|&v| v == 1.0));
    assert!(max_abs(problem.full_penalty().iter()) < 1e-10);
}

#[test]
fn test_matrix_building_is_repeatable() {
    let model = decay_with_baseline(false);
    let descriptor = model
        .fill(
            "dataset1",
            Arc::new(decay_parameters()),
            &Array1::linspace(0.0, 10.0, 25),
            &array![600.0],
        )
        .unwrap();
    let first = build_matrix(&descriptor, None).unwrap();
    let second = build_matrix(&descriptor, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_wrong_matrix_shape_is_reported() {
    let model = decay_with_baseline(true);
    let time = Array1::linspace(0.0, 10.0, 25);
    let data = Dataset::new(time, array![600.0], Array2::zeros((25, 1))).unwrap();
    let result = create_problem(Scheme::new(model, decay_parameters()).with_dataset("dataset1", data));
    assert!(matches!(result, Err(TarFitError::MatrixShape(_))));
}

#[test]
fn test_scheme_problems_are_collected() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1", "dataset2"]);
    // "k2" is missing and dataset2 has no data.
    let params = parameters(&[("k1", 0.5)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let data = Dataset::new(array![0.0, 1.0], array![600.0], Array2::zeros((2, 1))).unwrap();
    let scheme = Scheme::new(model, params)
        .with_dataset("dataset1", data)
        .with_config(SchemeConfig::default().with_group_tolerance(-1.0));

    let problems = scheme.problems();
    assert!(problems.iter().any(|p| p.contains("'k2'")));
    assert!(problems.iter().any(|p| p.contains("No data for dataset 'dataset2'")));
    assert!(problems.iter().any(|p| p.contains("Group tolerance")));
    assert!(matches!(create_problem(scheme), Err(TarFitError::ModelValidation(_))));
}

#[test]
fn test_empty_global_axis() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let data = Dataset::new(Array1::linspace(0.0, 10.0, 25), Array1::zeros(0), Array2::zeros((25, 0))).unwrap();
    let scheme = Scheme::new(model, decay_parameters()).with_dataset("dataset1", data);
    let problem = create_problem(scheme.clone()).unwrap();

    assert!(problem.full_penalty().is_empty());
    assert_eq!(problem.clps()["dataset1"].values.nrows(), 0);
    assert!(problem.reduced_clps()["dataset1"].is_empty());
    assert!(problem.warnings().is_empty());

    let result = optimize(&scheme).unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(result.number_of_data_points, 0);
    assert_eq!(result.chi_square, 0.0);
    assert!(result.covariance.is_none());
}

#[test]
fn test_rank_deficiency_is_a_warning() {
    // Equal rates make both decay columns identical.
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let params = parameters(&[("k1", 0.5), ("k2", 0.5)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let global = array![600.0, 700.0];
    let data = simulated(&model, "dataset1", &params, &Array1::linspace(0.0, 10.0, 25), &global, &spectra(&["s1"], &global));

    let problem = create_problem(Scheme::new(model, params).with_dataset("dataset1", data)).unwrap();
    let warnings = problem.warnings();
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].label, "dataset1");
    assert_eq!((warnings[0].rank, warnings[0].columns), (1, 2));
    assert_eq!(warnings[1].global_index, Some(1));
    assert_eq!(warnings[1].global_value, 700.0);

    // Minimum norm splits the amplitude evenly.
    let clps = &problem.clps()["dataset1"];
    approx::assert_relative_eq!(clps.values[[0, 0]], clps.values[[0, 1]], max_relative = 1e-8);
}
