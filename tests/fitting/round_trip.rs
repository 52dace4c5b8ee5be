use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use tarfit_rs::{optimize, Grouping, Parameters, Scheme, SchemeConfig};

fn truth() -> Parameters {
    let mut fixed = vec![("j.s1", 1.0), ("j.s2", 0.0), ("j.s3", 0.0)];
    fixed.extend(irf_parameters());
    parameters(&[("k1", 0.5), ("k2", 0.3), ("k3", 0.05)], &fixed)
}

fn sequential_scheme(start: Parameters, config: SchemeConfig) -> (Scheme, tarfit_rs::ClpTable) {
    let model = decay_model(sequential_k_matrix(), Some(dispersed_irf()), &["dataset1"]);
    let time = Array1::linspace(-1.0, 30.0, 120);
    let global = array![550.0, 575.0, 600.0, 625.0, 650.0];
    let clps = spectra(&["s1", "s2", "s3"], &global);
    let data = simulated(&model, "dataset1", &truth(), &time, &global, &clps);
    let scheme = Scheme::new(model, start)
        .with_dataset("dataset1", data)
        .with_config(config);
    (scheme, clps)
}

#[test]
fn test_evaluation_at_truth_reproduces_data() {
    for grouping in [Grouping::Ungrouped, Grouping::Grouped] {
        let config = SchemeConfig::default()
            .with_grouping(grouping)
            .with_maximum_number_function_evaluations(Some(0));
        let (scheme, clps) = sequential_scheme(truth(), config);
        let result = optimize(&scheme).unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message,
            "The maximum number of function evaluations (0) is exceeded"
        );
        assert!(result.chi_square < 1e-18, "chi_square = {:e}", result.chi_square);
        assert_eq!(result.optimized_parameters.value("k2").unwrap(), 0.3);

        let dataset = result.dataset("dataset1").unwrap();
        assert_eq!(dataset.fitted_data.dim(), (120, 5));
        assert!(max_abs(dataset.residual.iter()) < 1e-10);
        assert!(dataset.matrices.is_index_dependent());
        for (fitted, exact) in dataset.clps.values.iter().zip(clps.values.iter()) {
            assert_relative_eq!(*fitted, *exact, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_derived_spectra() {
    let config = SchemeConfig::default().with_maximum_number_function_evaluations(Some(0));
    let (scheme, clps) = sequential_scheme(truth(), config);
    let result = optimize(&scheme).unwrap();
    let dataset = result.dataset("dataset1").unwrap();

    let sas = &dataset.derived["mc1/species_associated_spectra"];
    assert_eq!(sas.labels, vec!["s1", "s2", "s3"]);
    assert_eq!(sas.values.dim(), (5, 3));
    for (fitted, exact) in sas.values.iter().zip(clps.values.iter()) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-8);
    }

    // The decay associated spectra sum to the species spectrum of the
    // initially populated compartment.
    let das = &dataset.derived["mc1/decay_associated_spectra"];
    assert_eq!(das.values.dim(), (5, 3));
    for index in 0..5 {
        assert_relative_eq!(das.values.row(index).sum(), sas.values[[index, 0]], epsilon = 1e-8);
    }
}

#[test]
fn test_recovers_sequential_rates() {
    let mut start = truth();
    for (label, value) in [("k1", 0.45), ("k2", 0.33), ("k3", 0.055)] {
        start.get_mut(label).unwrap().set_value(value).unwrap();
    }
    let (scheme, clps) = sequential_scheme(start, SchemeConfig::default());
    let result = optimize(&scheme).unwrap();

    assert!(result.success, "{}", result.message);
    for (label, value) in [("k1", 0.5), ("k2", 0.3), ("k3", 0.05)] {
        assert_relative_eq!(result.optimized_parameters.value(label).unwrap(), value, max_relative = 1e-4);
    }
    let dataset = result.dataset("dataset1").unwrap();
    for (fitted, exact) in dataset.clps.values.iter().zip(clps.values.iter()) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-4);
    }
    assert!(result.warnings.is_empty());
}

#[test]
fn test_equal_rates_in_chain_give_finite_residuals() {
    let mut start = truth();
    for (label, value) in [("k1", 0.2), ("k2", 0.2)] {
        start.get_mut(label).unwrap().set_value(value).unwrap();
    }
    let evaluate = SchemeConfig::default().with_maximum_number_function_evaluations(Some(0));
    let (scheme, _) = sequential_scheme(start.clone(), evaluate);
    let result = optimize(&scheme).unwrap();
    assert!(result.chi_square.is_finite() && result.chi_square > 0.0);
    let dataset = result.dataset("dataset1").unwrap();
    assert!(dataset.fitted_data.iter().all(|v| v.is_finite()));
    assert_eq!(dataset.derived["mc1/decay_associated_spectra"].labels, vec!["s1", "s1_t1", "s3"]);

    let (scheme, _) = sequential_scheme(start, SchemeConfig::default());
    let result = optimize(&scheme).unwrap();
    assert!(result.chi_square.is_finite());
}

