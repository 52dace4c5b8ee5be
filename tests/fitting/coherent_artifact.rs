use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use std::sync::Arc;
use tarfit_rs::megacomplexes::CoherentArtifactMegacomplex;
use tarfit_rs::model::{DatasetModel, GaussianIrf, QuantityAxis};
use tarfit_rs::{optimize, Model, Parameters, Scheme, SchemeConfig};

const LABELS: [&str; 4] = ["s1", "s2", "coherent_artifact_1", "coherent_artifact_2"];

fn model() -> Model {
    decay_model(
        parallel_k_matrix(),
        Some(GaussianIrf::new("irf.center", "irf.width")),
        &[],
    )
    .add_megacomplex("ca", Arc::new(CoherentArtifactMegacomplex::new(2)))
    .add_dataset(
        "dataset1",
        DatasetModel::new(&["mc1", "ca"])
            .with_irf("irf1")
            .with_initial_concentration("j1"),
    )
}

fn truth() -> Parameters {
    parameters(
        &[("k1", 0.5), ("k2", 0.05)],
        &[("j.s1", 1.0), ("j.s2", 1.0), ("irf.center", 0.3), ("irf.width", 0.1)],
    )
}

fn scheme(start: Parameters, config: SchemeConfig) -> (Scheme, tarfit_rs::ClpTable) {
    let model = model();
    let time = Array1::linspace(-1.0, 20.0, 421);
    let global = array![600.0, 620.0, 640.0];
    let clps = spectra(&LABELS, &global);
    let data = simulated(&model, "dataset1", &truth(), &time, &global, &clps);
    let scheme = Scheme::new(model, start)
        .with_dataset("dataset1", data)
        .with_config(config);
    (scheme, clps)
}

#[test]
fn test_artifact_columns_join_decay_matrix() {
    let config = SchemeConfig::default().with_maximum_number_function_evaluations(Some(0));
    let (scheme, clps) = scheme(truth(), config);
    let result = optimize(&scheme).unwrap();
    let dataset = result.dataset("dataset1").unwrap();

    let labels = dataset.matrices.clp_labels();
    assert_eq!(labels, LABELS.to_vec());
    assert!(!dataset.matrices.is_index_dependent());
    assert!(max_abs(dataset.residual.iter()) < 1e-10);

    let artifact = &dataset.derived["ca/coherent_artifact_associated_spectra"];
    assert_eq!(artifact.labels, vec!["coherent_artifact_1", "coherent_artifact_2"]);
    for index in 0..3 {
        assert_relative_eq!(artifact.values[[index, 0]], clps.values[[index, 2]], epsilon = 1e-8);
        assert_relative_eq!(artifact.values[[index, 1]], clps.values[[index, 3]], epsilon = 1e-8);
    }
    assert_eq!(artifact.axis, QuantityAxis::Global);
    assert_eq!(artifact.values.dim(), (3, 2));

    let concentration = &dataset.derived["ca/coherent_artifact_concentration"];
    assert_eq!(concentration.axis, QuantityAxis::Model);
    assert_eq!(concentration.values.dim(), (421, 2));
    assert_eq!(concentration.labels, artifact.labels);
    // the Gaussian column peaks at the IRF center, t = 0.3 is sample 26
    assert_relative_eq!(concentration.values[[26, 0]], 1.0, epsilon = 1e-10);
}

#[test]
fn test_fit_with_artifact() {
    let mut start = truth();
    start.get_mut("k1").unwrap().set_value(0.45).unwrap();
    start.get_mut("k2").unwrap().set_value(0.055).unwrap();
    let (scheme, _) = scheme(start, SchemeConfig::default());
    let result = optimize(&scheme).unwrap();

    assert!(result.success, "{}", result.message);
    assert_relative_eq!(result.optimized_parameters.value("k1").unwrap(), 0.5, max_relative = 1e-4);
    assert_relative_eq!(result.optimized_parameters.value("k2").unwrap(), 0.05, max_relative = 1e-4);
}

#[test]
fn test_artifact_needs_irf() {
    let model = Model::new()
        .add_megacomplex("ca", Arc::new(CoherentArtifactMegacomplex::new(1)))
        .add_dataset("dataset1", DatasetModel::new(&["ca"]));
    assert!(!model.problems(&Parameters::new()).is_empty());
}
