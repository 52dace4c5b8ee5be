use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use tarfit_rs::model::DatasetModel;
use tarfit_rs::{optimize, Parameter, Parameters, Scheme};

fn shared_parameters(k1: f64) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.add_param("k1", k1).unwrap();
    parameters.add_param_with_expr("k2", "$k1 / 10").unwrap();
    for (label, value) in [("j.s1", 1.0), ("j.s2", 1.0), ("scale.2", 2.0)] {
        parameters.add(Parameter::fixed(label, value)).unwrap();
    }
    parameters
}

#[test]
fn test_datasets_share_rates() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]).add_dataset(
        "dataset2",
        DatasetModel::new(&["mc1"])
            .with_initial_concentration("j1")
            .with_scale("scale.2"),
    );
    let truth = shared_parameters(0.5);

    let axis1 = array![500.0, 520.0, 540.0];
    let axis2 = array![700.0, 720.0];
    let clps1 = spectra(&["s1", "s2"], &axis1);
    let clps2 = spectra(&["s2", "s1"], &axis2);
    let data1 = simulated(&model, "dataset1", &truth, &Array1::linspace(0.0, 40.0, 80), &axis1, &clps1);
    let data2 = simulated(&model, "dataset2", &truth, &Array1::linspace(0.0, 10.0, 50), &axis2, &clps2);

    let scheme = Scheme::new(model, shared_parameters(0.45))
        .with_dataset("dataset1", data1)
        .with_dataset("dataset2", data2);
    let result = optimize(&scheme).unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(result.free_parameter_labels, vec!["k1".to_string()]);
    assert_eq!(result.number_of_data_points, 80 * 3 + 50 * 2);
    assert_relative_eq!(result.optimized_parameters.value("k1").unwrap(), 0.5, max_relative = 1e-5);
    assert_relative_eq!(result.optimized_parameters.value("k2").unwrap(), 0.05, max_relative = 1e-5);

    // The scale is absorbed by the matrix, not by the clps.
    let fitted2 = &result.dataset("dataset2").unwrap().clps;
    for index in 0..axis2.len() {
        assert_relative_eq!(fitted2.column("s2").unwrap()[index], clps2.values[[index, 0]], max_relative = 1e-4);
        assert_relative_eq!(fitted2.column("s1").unwrap()[index], clps2.values[[index, 1]], max_relative = 1e-4);
    }
    for dataset in result.datasets.values() {
        assert!(dataset.root_mean_square_error < 1e-6);
    }
}
