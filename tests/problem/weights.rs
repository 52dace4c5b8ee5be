use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1, Array2};
use tarfit_rs::model::Model;
use tarfit_rs::{create_problem, Dataset, Problem, Scheme, SchemeConfig};

fn exact_dataset(model: &Model, negate_s2: bool) -> (Dataset, tarfit_rs::Parameters) {
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let global = array![600.0, 650.0];
    let mut clps = spectra(&["s1", "s2"], &global);
    if negate_s2 {
        clps.values.column_mut(1).mapv_inplace(|v| -v);
    }
    let data = simulated(model, "dataset1", &params, &Array1::linspace(0.0, 20.0, 40), &global, &clps);
    (data, params)
}

#[test]
fn test_uniform_weight_scales_residual_only() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let (data, mut params) = exact_dataset(&model, false);
    params.get_mut("k1").unwrap().set_value(0.6).unwrap();

    let weighted_data = data.clone().with_weight(Array2::from_elem(data.data.dim(), 2.0)).unwrap();
    let plain = create_problem(Scheme::new(model.clone(), params.clone()).with_dataset("dataset1", data)).unwrap();
    let weighted = create_problem(Scheme::new(model, params).with_dataset("dataset1", weighted_data)).unwrap();

    for (p, w) in plain.full_penalty().iter().zip(weighted.full_penalty().iter()) {
        assert_relative_eq!(2.0 * p, *w, epsilon = 1e-10);
    }
    for (p, w) in plain.clps()["dataset1"].values.iter().zip(weighted.clps()["dataset1"].values.iter()) {
        assert_relative_eq!(*p, *w, epsilon = 1e-10);
    }
}

#[test]
fn test_zero_weight_ignores_rows() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let (mut data, params) = exact_dataset(&model, false);
    let mut weight = Array2::from_elem(data.data.dim(), 1.0);
    // Corrupt the first rows and weight them out.
    for row in 0..3 {
        data.data.row_mut(row).fill(100.0);
        weight.row_mut(row).fill(0.0);
    }
    let data = data.with_weight(weight).unwrap();
    let problem = create_problem(Scheme::new(model, params).with_dataset("dataset1", data)).unwrap();

    assert!(max_abs(problem.full_penalty().iter()) < 1e-8);
    let expected = spectra(&["s1", "s2"], &array![600.0, 650.0]);
    for (fitted, exact) in problem.clps()["dataset1"].values.iter().zip(expected.values.iter()) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-8);
    }
}

#[test]
fn test_non_negative_clps_per_label() {
    let unconstrained = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let (data, params) = exact_dataset(&unconstrained, true);

    let free = create_problem(Scheme::new(unconstrained.clone(), params.clone()).with_dataset("dataset1", data.clone())).unwrap();
    assert!(free.clps()["dataset1"].column("s2").unwrap().iter().all(|&v| v < 0.0));

    let constrained = unconstrained.with_non_negative_clps(&["s2"]);
    let problem = create_problem(Scheme::new(constrained, params).with_dataset("dataset1", data)).unwrap();
    let clps = &problem.clps()["dataset1"];
    assert!(clps.column("s2").unwrap().iter().all(|&v| v >= 0.0));
    assert!(max_abs(problem.full_penalty().iter()) > 1e-6);
}

#[test]
fn test_non_negative_least_squares_for_every_clp() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let (data, params) = exact_dataset(&model, true);
    let scheme = Scheme::new(model, params)
        .with_dataset("dataset1", data)
        .with_config(SchemeConfig::default().with_non_negative_least_squares(true));
    let problem = create_problem(scheme).unwrap();
    assert!(problem.clps()["dataset1"].values.iter().all(|&v| v >= 0.0));
}
