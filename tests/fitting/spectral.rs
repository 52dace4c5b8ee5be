use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use std::sync::Arc;
use tarfit_rs::megacomplexes::{SpectralMegacomplex, SpectralShape};
use tarfit_rs::model::{DatasetModel, QuantityAxis};
use tarfit_rs::{optimize, ClpTable, Model, Parameters, Scheme};

fn bands() -> SpectralMegacomplex {
    SpectralMegacomplex::new()
        .with_shape("s1", SpectralShape::gaussian("shape.amp", "shape.loc1", "shape.width"))
        .with_shape("s2", SpectralShape::gaussian("shape.amp", "shape.loc2", "shape.width"))
}

fn shape_parameters(loc1: f64, loc2: f64) -> Parameters {
    parameters(
        &[("shape.loc1", loc1), ("shape.loc2", loc2)],
        &[("shape.amp", 1.0), ("shape.width", 40.0)],
    )
}

#[test]
fn test_recovers_band_locations() {
    let model = Model::new()
        .add_megacomplex("mc1", Arc::new(bands()))
        .add_dataset("dataset1", DatasetModel::new(&["mc1"]));
    let wavelengths = Array1::linspace(550.0, 750.0, 81);
    let time = Array1::linspace(0.0, 10.0, 21);
    let concentrations = ClpTable {
        labels: vec!["s1".to_string(), "s2".to_string()],
        values: Array2::from_shape_fn((21, 2), |(i, j)| (-(j as f64 + 1.0) * 0.2 * time[i]).exp()),
    };
    let data = simulated(&model, "dataset1", &shape_parameters(620.0, 680.0), &wavelengths, &time, &concentrations);

    let scheme = Scheme::new(model, shape_parameters(615.0, 685.0)).with_dataset("dataset1", data);
    let result = optimize(&scheme).unwrap();

    assert!(result.success, "{}", result.message);
    assert_relative_eq!(result.optimized_parameters.value("shape.loc1").unwrap(), 620.0, max_relative = 1e-6);
    assert_relative_eq!(result.optimized_parameters.value("shape.loc2").unwrap(), 680.0, max_relative = 1e-6);

    let dataset = result.dataset("dataset1").unwrap();
    let spectra = &dataset.derived["mc1/species_spectra"];
    assert_eq!(spectra.axis, QuantityAxis::Model);
    assert_eq!(spectra.values.dim(), (81, 2));
    let concentration = &dataset.derived["mc1/species_associated_concentrations"];
    assert_eq!(concentration.axis, QuantityAxis::Global);
    assert_eq!(concentration.values.dim(), (21, 2));
    for (fitted, exact) in concentration.values.iter().zip(concentrations.values.iter()) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-6);
    }
}

#[test]
fn test_shaped_spectra_drive_decay_simulation() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1"]);
    let truth = parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let wavelengths = Array1::linspace(550.0, 750.0, 41);
    let clps = bands().spectra(&shape_parameters(620.0, 680.0), &wavelengths).unwrap();
    assert_eq!(clps.values.dim(), (41, 2));

    let time = Array1::linspace(0.0, 40.0, 100);
    let data = simulated(&model, "dataset1", &truth, &time, &wavelengths, &clps);
    let mut start = truth.clone();
    start.get_mut("k1").unwrap().set_value(0.45).unwrap();
    let result = optimize(&Scheme::new(model, start).with_dataset("dataset1", data)).unwrap();

    assert!(result.success, "{}", result.message);
    let sas = &result.dataset("dataset1").unwrap().derived["mc1/species_associated_spectra"];
    for (fitted, exact) in sas.values.iter().zip(clps.values.iter()) {
        assert_relative_eq!(*fitted, *exact, epsilon = 1e-6);
    }
}
