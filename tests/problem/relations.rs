use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use tarfit_rs::{create_problem, Interval, Parameters, Relation, Scheme};

fn sequential_parameters(relation: &[(&str, f64)]) -> Parameters {
    let mut fixed = vec![("j.s1", 1.0), ("j.s2", 0.0), ("j.s3", 0.0)];
    fixed.extend_from_slice(relation);
    parameters(&[("k1", 0.5), ("k2", 0.3), ("k3", 0.1)], &fixed)
}

#[test]
fn test_interval_scoped_zero_relation() {
    let model = decay_model(sequential_k_matrix(), None, &["dataset1"])
        .add_relation(Relation::new("s3", "s2", "rel.r1").within(vec![Interval::new(600.0, 700.0)]));
    let params = sequential_parameters(&[("rel.r1", 0.0)]);

    let time = Array1::linspace(0.0, 20.0, 60);
    let global = array![500.0, 600.0, 650.0, 700.0, 800.0];
    let inside = [false, true, true, true, false];

    let mut clps = spectra(&["s1", "s2", "s3"], &global);
    for (index, &scoped) in inside.iter().enumerate() {
        if scoped {
            clps.values[[index, 1]] = 0.0;
        }
    }
    let data = simulated(&model, "dataset1", &params, &time, &global, &clps);
    let problem = create_problem(Scheme::new(model, params).with_dataset("dataset1", data)).unwrap();

    let reduced = &problem.reduced_matrices()["dataset1"];
    let fitted = &problem.clps()["dataset1"];
    for (index, &scoped) in inside.iter().enumerate() {
        assert_eq!(reduced[index].matrix.contains("s2"), !scoped, "index {}", index);
        assert!(reduced[index].matrix.contains("s3"));
        if scoped {
            assert_eq!(fitted.values[[index, 1]], 0.0);
        } else {
            assert_relative_eq!(fitted.values[[index, 1]], clps.values[[index, 1]], epsilon = 1e-8);
        }
        assert_relative_eq!(fitted.values[[index, 2]], clps.values[[index, 2]], epsilon = 1e-8);
    }
    assert!(max_abs(problem.residuals()["dataset1"].iter()) < 1e-10);
}

#[test]
fn test_relation_factor_and_parameter_update() {
    let model = decay_model(sequential_k_matrix(), None, &["dataset1"])
        .add_relation(Relation::new("s3", "s2", "rel.r1"));
    let params = sequential_parameters(&[("rel.r1", 2.0)]);

    let time = Array1::linspace(0.0, 20.0, 60);
    let global = array![500.0, 600.0];
    let mut clps = spectra(&["s1", "s2", "s3"], &global);
    for index in 0..global.len() {
        clps.values[[index, 1]] = 2.0 * clps.values[[index, 2]];
    }
    let data = simulated(&model, "dataset1", &params, &time, &global, &clps);
    let mut problem = create_problem(Scheme::new(model, params.clone()).with_dataset("dataset1", data)).unwrap();

    let fitted = problem.clps()["dataset1"].clone();
    for index in 0..global.len() {
        assert_relative_eq!(fitted.values[[index, 1]], 2.0 * fitted.values[[index, 2]], max_relative = 1e-12);
        assert_relative_eq!(fitted.values[[index, 2]], clps.values[[index, 2]], max_relative = 1e-8);
    }

    // Only the relation parameter changes; the reduction must follow it.
    let mut updated = params;
    updated.get_mut("rel.r1").unwrap().set_value(3.0).unwrap();
    problem.update_parameters(updated).unwrap();
    let refitted = &problem.clps()["dataset1"];
    for index in 0..global.len() {
        assert_relative_eq!(refitted.values[[index, 1]], 3.0 * refitted.values[[index, 2]], max_relative = 1e-12);
    }
    assert!(max_abs(problem.residuals()["dataset1"].iter()) > 1e-6);
}

#[test]
fn test_relation_chain_compounds_factors() {
    let model = decay_model(sequential_k_matrix(), None, &["dataset1"])
        .add_relation(Relation::new("s2", "s1", "rel.r2"))
        .add_relation(Relation::new("s3", "s2", "rel.r1"));
    let params = sequential_parameters(&[("rel.r1", 2.0), ("rel.r2", 0.5)]);

    let time = Array1::linspace(0.0, 20.0, 60);
    let global = array![500.0];
    let clps = spectra(&["s3"], &global);
    let data = simulated(&model, "dataset1", &params, &time, &global, &clps);
    let problem = create_problem(Scheme::new(model, params).with_dataset("dataset1", data)).unwrap();

    let reduced = &problem.reduced_matrices()["dataset1"][0];
    assert_eq!(reduced.matrix.clp_labels, vec!["s3".to_string()]);

    let fitted = &problem.clps()["dataset1"];
    let s3 = fitted.column("s3").unwrap()[0];
    assert_relative_eq!(fitted.column("s2").unwrap()[0], 2.0 * s3, max_relative = 1e-12);
    assert_relative_eq!(fitted.column("s1").unwrap()[0], 1.0 * s3, max_relative = 1e-12);
}

#[test]
fn test_cyclic_relations_are_rejected() {
    let model = decay_model(sequential_k_matrix(), None, &["dataset1"])
        .add_relation(Relation::new("s3", "s2", "rel.r1"))
        .add_relation(Relation::new("s2", "s3", "rel.r1"));
    let params = sequential_parameters(&[("rel.r1", 1.0)]);
    let time = Array1::linspace(0.0, 5.0, 10);
    let global = array![500.0];
    let data = simulated(&model, "dataset1", &params, &time, &global, &spectra(&["s1"], &global));

    let result = create_problem(Scheme::new(model, params).with_dataset("dataset1", data));
    assert!(matches!(result, Err(tarfit_rs::TarFitError::ModelValidation(_))));
}
