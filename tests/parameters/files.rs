use crate::test_helpers::*;
use ndarray::{array, Array1};
use tarfit_rs::megacomplexes::KMatrix;
use tarfit_rs::{optimize, Parameter, Parameters, Scheme, SchemeConfig};

#[test]
fn test_json_file_round_trip() {
    let mut params = Parameters::new();
    params.add_param_with_bounds("rates.k1", 0.5, 0.0, 10.0).unwrap();
    params.add(Parameter::new("rates.k2", 0.05).non_negative()).unwrap();
    params.add(Parameter::fixed("irf.center", 0.3)).unwrap();
    params.add_param_with_expr("rates.k3", "$rates.k1 + $rates.k2").unwrap();

    let path = std::env::temp_dir().join(format!("tarfit-parameters-{}.json", std::process::id()));
    params.save_json(&path).unwrap();
    let loaded = Parameters::load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded, params);
    assert_eq!(loaded.varying_labels(), vec!["rates.k1", "rates.k2"]);
    assert_eq!(loaded.get("rates.k3").unwrap().expr(), Some("$rates.k1 + $rates.k2"));
    assert!(loaded.get("rates.k2").unwrap().is_non_negative());
    assert_eq!(loaded.get("rates.k1").unwrap().max(), 10.0);
}

#[test]
fn test_fitted_parameters_keep_standard_errors() {
    let model = decay_model(KMatrix::new().with_decay("s1", "k1"), None, &["dataset1"]);
    let truth = parameters(&[("k1", 1.0)], &[("j.s1", 1.0)]);
    let time = Array1::range(0.0, 10.0, 0.25);
    let global = array![0.0, 1.0];
    let mut data = simulated(&model, "dataset1", &truth, &time, &global, &spectra(&["s1"], &global));
    // A deterministic wiggle keeps the residual from vanishing.
    for (i, value) in data.data.iter_mut().enumerate() {
        *value += if i % 2 == 0 { 1e-3 } else { -1e-3 };
    }

    let scheme = Scheme::new(model, parameters(&[("k1", 0.9)], &[("j.s1", 1.0)]))
        .with_dataset("dataset1", data)
        .with_config(SchemeConfig::default().with_maximum_number_function_evaluations(Some(50)));
    let result = optimize(&scheme).unwrap();

    let json = result.optimized_parameters.to_json().unwrap();
    let loaded = Parameters::from_json(&json).unwrap();
    let stderr = loaded.get("k1").unwrap().stderr();
    assert!(stderr.is_some_and(|e| e > 0.0));
    assert_eq!(loaded.value("k1").unwrap(), result.optimized_parameters.value("k1").unwrap());
}

#[test]
fn test_malformed_json_is_rejected() {
    assert!(Parameters::from_json("{\"params\": 3}").is_err());
}
