use crate::test_helpers::*;
use approx::assert_relative_eq;
use ndarray::{array, s, Array1};
use std::sync::Arc;
use tarfit_rs::megacomplexes::{DecayMegacomplex, KMatrix};
use tarfit_rs::model::{DatasetModel, InitialConcentration};
use tarfit_rs::problem::DatasetGroup;
use tarfit_rs::utils::trapezoid_area;
use tarfit_rs::{
    create_problem, ClpConstraint, GroupedProblem, Grouping, Model, Problem, Relation, Scheme, SchemeConfig,
    UngroupedProblem,
};

fn single_dataset_scheme() -> Scheme {
    let model = decay_model(parallel_k_matrix(), Some(dispersed_irf()), &["dataset1"]);
    let mut fixed = vec![("j.s1", 1.0), ("j.s2", 1.0)];
    fixed.extend(irf_parameters());
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &fixed);

    let time = Array1::linspace(-1.0, 10.0, 50);
    let global = array![550.0, 600.0, 650.0, 700.0];
    let data = simulated(&model, "dataset1", &params, &time, &global, &spectra(&["s1", "s2"], &global));

    // Start away from the simulated rates so the residual is not trivial.
    let mut start = params;
    start.get_mut("k1").unwrap().set_value(0.4).unwrap();
    Scheme::new(model, start).with_dataset("dataset1", data)
}

#[test]
fn test_grouped_matches_ungrouped_for_one_dataset() {
    let scheme = single_dataset_scheme();
    let grouped = GroupedProblem::new(scheme.clone()).unwrap();
    let ungrouped = UngroupedProblem::new(scheme).unwrap();

    assert_eq!(grouped.groups().len(), 4);
    let grouped_penalty = grouped.full_penalty();
    let ungrouped_penalty = ungrouped.full_penalty();
    assert_eq!(grouped_penalty.len(), ungrouped_penalty.len());
    assert!(max_abs(ungrouped_penalty.iter()) > 1e-6);
    for (g, u) in grouped_penalty.iter().zip(ungrouped_penalty.iter()) {
        assert_relative_eq!(*g, *u, epsilon = 1e-10);
    }

    let grouped_clps = &grouped.clps()["dataset1"];
    let ungrouped_clps = &ungrouped.clps()["dataset1"];
    assert_eq!(grouped_clps.labels, ungrouped_clps.labels);
    for (g, u) in grouped_clps.values.iter().zip(ungrouped_clps.values.iter()) {
        assert_relative_eq!(*g, *u, epsilon = 1e-10);
    }
}

#[test]
fn test_auto_grouping_follows_dataset_count() {
    let scheme = single_dataset_scheme();
    assert!(!scheme.config.is_grouped(scheme.data.len()));
    assert!(SchemeConfig::default().with_grouping(Grouping::Grouped).is_grouped(1));
    assert!(SchemeConfig::default().is_grouped(2));
}

fn two_dataset_scheme(second_scale: f64, grouping: Grouping) -> Scheme {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1", "dataset2"]);
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)]);

    let global = array![600.0, 650.0, 700.0];
    let clps = spectra(&["s1", "s2"], &global);
    let mut scaled = clps.clone();
    scaled.values.mapv_inplace(|v| v * second_scale);

    let data1 = simulated(&model, "dataset1", &params, &Array1::linspace(0.0, 10.0, 30), &global, &clps);
    let data2 = simulated(&model, "dataset2", &params, &Array1::linspace(0.0, 40.0, 20), &global, &scaled);

    Scheme::new(model, params)
        .with_dataset("dataset1", data1)
        .with_dataset("dataset2", data2)
        .with_config(SchemeConfig::default().with_grouping(grouping))
}

#[test]
fn test_shared_labels_are_one_amplitude_per_group() {
    let problem = GroupedProblem::new(two_dataset_scheme(1.0, Grouping::Grouped)).unwrap();
    assert_eq!(problem.groups().len(), 3);
    assert!(problem.groups().iter().all(|g| g.label == "dataset1dataset2"));

    let clps1 = &problem.clps()["dataset1"];
    let clps2 = &problem.clps()["dataset2"];
    for (a, b) in clps1.values.iter().zip(clps2.values.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    assert!(max_abs(problem.full_penalty().iter()) < 1e-10);
}

#[test]
fn test_grouping_couples_datasets() {
    let ungrouped = create_problem(two_dataset_scheme(2.0, Grouping::Ungrouped)).unwrap();
    let grouped = create_problem(two_dataset_scheme(2.0, Grouping::Auto)).unwrap();

    // Solved alone, each dataset recovers its own amplitudes.
    let own1 = ungrouped.clps()["dataset1"].column("s1").unwrap().to_owned();
    let own2 = ungrouped.clps()["dataset2"].column("s1").unwrap().to_owned();
    for (a, b) in own1.iter().zip(own2.iter()) {
        assert_relative_eq!(2.0 * a, *b, max_relative = 1e-8);
    }
    assert!(max_abs(ungrouped.full_penalty().iter()) < 1e-10);

    // Grouped, they must share them and can no longer fit exactly.
    let shared1 = &grouped.clps()["dataset1"];
    let shared2 = &grouped.clps()["dataset2"];
    assert_eq!(shared1.values, shared2.values);
    assert!(max_abs(grouped.full_penalty().iter()) > 1e-6);
}

#[test]
fn test_grouped_penalty_stacks_members_per_group() {
    let problem = GroupedProblem::new(two_dataset_scheme(2.0, Grouping::Grouped)).unwrap();
    let penalty = problem.full_penalty();
    let residual1 = &problem.residuals()["dataset1"];
    let residual2 = &problem.residuals()["dataset2"];
    let (m1, m2) = (residual1.nrows(), residual2.nrows());
    assert_eq!(penalty.len(), 3 * (m1 + m2));

    for index in 0..3 {
        let start = index * (m1 + m2);
        assert_eq!(penalty.slice(s![start..start + m1]), residual1.column(index));
        assert_eq!(penalty.slice(s![start + m1..start + m1 + m2]), residual2.column(index));
    }
}

#[test]
fn test_groups_with_tolerance_on_partial_overlap() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1", "dataset2"]);
    let params = parameters(&[("k1", 0.5), ("k2", 0.05)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let time = Array1::linspace(0.0, 10.0, 30);
    let axis1 = array![500.0, 600.0];
    let axis2 = array![600.5, 700.0];
    let data1 = simulated(&model, "dataset1", &params, &time, &axis1, &spectra(&["s1", "s2"], &axis1));
    let data2 = simulated(&model, "dataset2", &params, &time, &axis2, &spectra(&["s1", "s2"], &axis2));

    let scheme = Scheme::new(model, params)
        .with_dataset("dataset1", data1)
        .with_dataset("dataset2", data2)
        .with_config(SchemeConfig::default().with_group_tolerance(1.0));
    let problem = GroupedProblem::new(scheme).unwrap();

    let groups: Vec<&DatasetGroup> = problem.groups().iter().collect();
    let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["dataset1", "dataset1dataset2", "dataset2"]);
    assert_eq!(
        groups[1].members,
        vec![("dataset1".to_string(), 1), ("dataset2".to_string(), 0)]
    );
    assert_eq!(problem.full_penalty().len(), 4 * 30);
    assert!(max_abs(problem.full_penalty().iter()) < 1e-10);
}

#[test]
fn test_rank_deficient_group_reports_its_global_value() {
    let model = decay_model(parallel_k_matrix(), None, &["dataset1", "dataset2"]);
    // Equal rates make both decay columns identical in every member.
    let params = parameters(&[("k1", 0.5), ("k2", 0.5)], &[("j.s1", 1.0), ("j.s2", 1.0)]);
    let time = Array1::linspace(0.0, 10.0, 30);
    let global = array![600.0, 650.0];
    let clps = spectra(&["s1"], &global);
    let scheme = Scheme::new(model.clone(), params.clone())
        .with_dataset("dataset1", simulated(&model, "dataset1", &params, &time, &global, &clps))
        .with_dataset("dataset2", simulated(&model, "dataset2", &params, &time, &global, &clps));
    let problem = GroupedProblem::new(scheme).unwrap();

    let warnings = problem.warnings();
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[1].label, "dataset1dataset2");
    assert_eq!(warnings[1].global_value, 650.0);
    assert_eq!(warnings[1].global_index, None);
    assert_eq!((warnings[1].rank, warnings[1].columns), (1, 2));
}

/// Dataset "a" carries clp "a1", dataset "b" carries clp "b1"; both decay
/// with rate "k1". Data of "b" is simulated with `b1 = ratio * a1`.
fn cross_dataset_scheme(ratio: f64, model: Model, grouping: Grouping) -> Scheme {
    let params = parameters(&[("k1", 0.5)], &[("j.1", 1.0), ("rel.r", 2.0)]);
    let global = array![600.0, 650.0];
    let clps_a = spectra(&["a1"], &global);
    let mut clps_b = clps_a.clone();
    clps_b.labels = vec!["b1".to_string()];
    clps_b.values.mapv_inplace(|v| ratio * v);

    let data_a = simulated(&model, "a", &params, &Array1::linspace(0.0, 10.0, 40), &global, &clps_a);
    let data_b = simulated(&model, "b", &params, &Array1::linspace(0.0, 5.0, 30), &global, &clps_b);
    Scheme::new(model, params)
        .with_dataset("a", data_a)
        .with_dataset("b", data_b)
        .with_config(SchemeConfig::default().with_grouping(grouping))
}

fn cross_dataset_model() -> Model {
    let decay = |clp: &str| Arc::new(DecayMegacomplex::new(KMatrix::new().with_decay(clp, "k1")));
    Model::new()
        .add_megacomplex("mc_a", decay("a1"))
        .add_megacomplex("mc_b", decay("b1"))
        .add_initial_concentration("ja", InitialConcentration::new(&["a1"], &["j.1"]))
        .add_initial_concentration("jb", InitialConcentration::new(&["b1"], &["j.1"]))
        .add_dataset("a", DatasetModel::new(&["mc_a"]).with_initial_concentration("ja"))
        .add_dataset("b", DatasetModel::new(&["mc_b"]).with_initial_concentration("jb"))
}

#[test]
fn test_relation_ties_clps_of_different_datasets() {
    let model = cross_dataset_model().add_relation(Relation::new("a1", "b1", "rel.r"));
    let problem = create_problem(cross_dataset_scheme(3.0, model, Grouping::Grouped)).unwrap();

    for index in 0..2 {
        let reduced_b = &problem.reduced_matrices()["b"][index];
        assert_eq!(reduced_b.matrix.clp_labels, vec!["a1"]);
        let a1 = problem.clps()["a"].column("a1").unwrap()[index];
        let b1 = problem.clps()["b"].column("b1").unwrap()[index];
        assert_relative_eq!(b1 / a1, 2.0, max_relative = 1e-12);
    }
    // The data asks for a ratio of 3, which the relation forbids.
    assert!(max_abs(problem.full_penalty().iter()) > 1e-3);
}

#[test]
fn test_consistent_relation_across_datasets_fits_exactly() {
    let model = cross_dataset_model().add_relation(Relation::new("a1", "b1", "rel.r"));
    let global = array![600.0, 650.0];
    let expected = spectra(&["a1"], &global);
    let problem = create_problem(cross_dataset_scheme(2.0, model, Grouping::Grouped)).unwrap();

    assert!(max_abs(problem.full_penalty().iter()) < 1e-10);
    for index in 0..2 {
        assert_relative_eq!(
            problem.clps()["a"].column("a1").unwrap()[index],
            expected.values[[index, 0]],
            max_relative = 1e-8
        );
    }
}

#[test]
fn test_cross_dataset_relation_needs_grouping() {
    let model = cross_dataset_model().add_relation(Relation::new("a1", "b1", "rel.r"));
    let problem = create_problem(cross_dataset_scheme(3.0, model, Grouping::Ungrouped)).unwrap();

    // Solved alone, "b" has no source column and keeps its own amplitude.
    assert_eq!(problem.reduced_matrices()["b"][0].matrix.clp_labels, vec!["b1"]);
    let a1 = problem.clps()["a"].column("a1").unwrap()[0];
    let b1 = problem.clps()["b"].column("b1").unwrap()[0];
    assert_relative_eq!(b1 / a1, 3.0, max_relative = 1e-8);
}

#[test]
fn test_equal_area_across_datasets() {
    let model = cross_dataset_model().add_constraint(ClpConstraint::equal_area("b1", "a1"));
    let problem = create_problem(cross_dataset_scheme(3.0, model, Grouping::Grouped)).unwrap();

    let area = |label: &str, clp: &str| {
        let axis = &problem.scheme().data[label].model_axis;
        let matrix = problem.matrices()[label].at(0).unwrap();
        trapezoid_area(axis.view(), matrix.column(clp).unwrap())
    };
    let (area_a, area_b) = (area("a", "a1"), area("b", "b1"));
    assert!((area_a - area_b).abs() > 0.1);

    for index in 0..2 {
        assert!(!problem.reduced_matrices()["b"][index].matrix.contains("b1"));
        let a1 = problem.clps()["a"].column("a1").unwrap()[index];
        let b1 = problem.clps()["b"].column("b1").unwrap()[index];
        assert_relative_eq!(b1 * area_b, a1 * area_a, max_relative = 1e-10);
    }
}
