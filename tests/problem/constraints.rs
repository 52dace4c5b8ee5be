use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use tarfit_rs::utils::trapezoid_area;
use tarfit_rs::{create_problem, ClpConstraint, Grouping, Interval, Problem, Scheme, SchemeConfig};

const GLOBAL: [f64; 3] = [550.0, 600.0, 650.0];

fn scheme(constraint: ClpConstraint, index_dependent: bool, grouping: Grouping) -> Scheme {
    let irf = index_dependent.then(dispersed_irf);
    let model = decay_model(parallel_k_matrix(), irf, &["dataset1"]).add_constraint(constraint);

    let mut fixed = vec![("j.s1", 1.0), ("j.s2", 1.0)];
    if index_dependent {
        fixed.extend(irf_parameters());
    }
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &fixed);

    let time = Array1::linspace(0.0, 10.0, 40);
    let global = Array1::from(GLOBAL.to_vec());
    let data = simulated(&model, "dataset1", &params, &time, &global, &spectra(&["s1"], &global));

    Scheme::new(model, params)
        .with_dataset("dataset1", data)
        .with_config(SchemeConfig::default().with_grouping(grouping))
}

fn assert_zeroed(problem: &dyn Problem, index_dependent: bool) {
    let matrices = &problem.matrices()["dataset1"];
    assert_eq!(matrices.is_index_dependent(), index_dependent);

    let reduced = &problem.reduced_matrices()["dataset1"];
    let reduced_clps = &problem.reduced_clps()["dataset1"];
    assert_eq!(reduced.len(), GLOBAL.len());

    for index in 0..GLOBAL.len() {
        assert!(matrices.at(index).unwrap().contains("s2"));
        assert!(!reduced[index].matrix.contains("s2"));
        assert!(reduced[index].matrix.contains("s1"));
        assert!(!reduced_clps[index].labels.iter().any(|l| l == "s2"));
    }

    let clps = &problem.clps()["dataset1"];
    assert_eq!(clps.labels, vec!["s1".to_string(), "s2".to_string()]);
    assert!(clps.column("s2").unwrap().iter().all(|&v| v == 0.0));

    let expected = spectra(&["s1"], &Array1::from(GLOBAL.to_vec()));
    for (fitted, exact) in clps.column("s1").unwrap().iter().zip(expected.values.column(0)) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-8);
    }
    assert!(max_abs(problem.residuals()["dataset1"].iter()) < 1e-10);
}

#[test]
fn test_zero_constraint_ungrouped_index_independent() {
    let problem = create_problem(scheme(ClpConstraint::zero("s2"), false, Grouping::Ungrouped)).unwrap();
    assert_zeroed(problem.as_ref(), false);
}

#[test]
fn test_zero_constraint_ungrouped_index_dependent() {
    let problem = create_problem(scheme(ClpConstraint::zero("s2"), true, Grouping::Ungrouped)).unwrap();
    assert_zeroed(problem.as_ref(), true);
}

#[test]
fn test_zero_constraint_grouped_index_independent() {
    let problem = create_problem(scheme(ClpConstraint::zero("s2"), false, Grouping::Grouped)).unwrap();
    assert_zeroed(problem.as_ref(), false);
}

#[test]
fn test_zero_constraint_grouped_index_dependent() {
    let problem = create_problem(scheme(ClpConstraint::zero("s2"), true, Grouping::Grouped)).unwrap();
    assert_zeroed(problem.as_ref(), true);
}

#[test]
fn test_only_constraint_removes_outside_interval() {
    let constraint = ClpConstraint::only("s2", vec![Interval::new(600.0, 700.0)]);
    let problem = create_problem(scheme(constraint, false, Grouping::Ungrouped)).unwrap();
    let reduced = &problem.reduced_matrices()["dataset1"];

    assert!(!reduced[0].matrix.contains("s2"));
    assert!(reduced[1].matrix.contains("s2"));
    assert!(reduced[2].matrix.contains("s2"));
    assert_eq!(problem.clps()["dataset1"].column("s2").unwrap()[0], 0.0);
}

#[test]
fn test_equal_area_ties_target_to_source() {
    let constraint = ClpConstraint::equal_area("s2", "s1");
    let problem = create_problem(scheme(constraint, false, Grouping::Ungrouped)).unwrap();

    let time = Array1::linspace(0.0, 10.0, 40);
    let matrix = problem.matrices()["dataset1"].at(0).unwrap().clone();
    let area_s1 = trapezoid_area(time.view(), matrix.column("s1").unwrap());
    let area_s2 = trapezoid_area(time.view(), matrix.column("s2").unwrap());

    let clps = &problem.clps()["dataset1"];
    for index in 0..GLOBAL.len() {
        assert!(!problem.reduced_matrices()["dataset1"][index].matrix.contains("s2"));
        let row = clps.row(index);
        assert_relative_eq!(row[1] * area_s2, row[0] * area_s1, max_relative = 1e-10);
    }
}

#[test]
fn test_unknown_constraint_target_is_rejected() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]).add_constraint(ClpConstraint::zero("s9"));
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let data = simulated(
        &model,
        "dataset1",
        &params,
        &array![0.0, 1.0, 2.0],
        &array![1.0],
        &spectra(&["s1"], &array![1.0]),
    );
    let result = create_problem(Scheme::new(model, params).with_dataset("dataset1", data));
    assert!(result.is_err());
}
