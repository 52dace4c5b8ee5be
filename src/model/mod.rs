//! # Model
//!
//! The typed description of a global analysis: compartments, megacomplexes,
//! IRFs, initial concentrations, dataset definitions, clp constraints and
//! clp relations. A model is built once, validated against a parameter set and
//! then filled with parameter values to produce one [`DatasetDescriptor`] per
//! dataset and evaluation.
//!
//! ```rust
//! use std::sync::Arc;
//! use tarfit_rs::megacomplexes::{DecayMegacomplex, KMatrix};
//! use tarfit_rs::model::{DatasetModel, InitialConcentration, Model};
//! use tarfit_rs::parameters::{Parameter, Parameters};
//!
//! let model = Model::new()
//!     .with_compartments(&["s1"])
//!     .add_initial_concentration("j1", InitialConcentration::new(&["s1"], &["j.1"]))
//!     .add_megacomplex(
//!         "mc1",
//!         Arc::new(DecayMegacomplex::new(KMatrix::new().with_decay("s1", "rates.k1"))),
//!     )
//!     .add_dataset("dataset1", DatasetModel::new(&["mc1"]).with_initial_concentration("j1"));
//!
//! let mut params = Parameters::new();
//! params.add_param("rates.k1", 0.5).unwrap();
//! params.add(Parameter::fixed("j.1", 1.0)).unwrap();
//! assert!(model.problems(&params).is_empty());
//! ```

pub mod constraint;
pub mod descriptor;
pub mod initial_concentration;
pub mod interval;
pub mod irf;
pub mod megacomplex;
pub mod relation;

pub use constraint::ClpConstraint;
pub use descriptor::DatasetDescriptor;
pub use initial_concentration::{FilledInitialConcentration, InitialConcentration};
pub use interval::Interval;
pub use irf::{FilledGaussianIrf, FilledIrf, GaussianComponent, GaussianIrf, Irf, MeasuredIrf};
pub use megacomplex::{DerivedQuantity, Megacomplex, QuantityAxis};
pub use relation::Relation;

use crate::error::{Result, TarFitError};
use crate::parameters::Parameters;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Definition of one dataset: which megacomplexes, IRF and initial
/// concentration describe it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetModel {
    pub megacomplex: Vec<String>,
    #[serde(default)]
    pub irf: Option<String>,
    #[serde(default)]
    pub initial_concentration: Option<String>,
    /// Label of a parameter scaling the whole dataset matrix
    #[serde(default)]
    pub scale: Option<String>,
}

impl DatasetModel {
    pub fn new(megacomplex: &[&str]) -> Self {
        Self {
            megacomplex: megacomplex.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_irf(mut self, irf: &str) -> Self {
        self.irf = Some(irf.to_string());
        self
    }

    pub fn with_initial_concentration(mut self, label: &str) -> Self {
        self.initial_concentration = Some(label.to_string());
        self
    }

    pub fn with_scale(mut self, parameter: &str) -> Self {
        self.scale = Some(parameter.to_string());
        self
    }
}

/// The analysis model. Immutable once built; shared between problems through
/// an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Model {
    compartments: Vec<String>,
    megacomplexes: BTreeMap<String, Arc<dyn Megacomplex>>,
    initial_concentrations: BTreeMap<String, InitialConcentration>,
    irfs: BTreeMap<String, Irf>,
    datasets: BTreeMap<String, DatasetModel>,
    constraints: Vec<ClpConstraint>,
    relations: Vec<Relation>,
    non_negative_clps: Vec<String>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compartments(mut self, compartments: &[&str]) -> Self {
        self.compartments = compartments.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn add_megacomplex(mut self, label: &str, megacomplex: Arc<dyn Megacomplex>) -> Self {
        self.megacomplexes.insert(label.to_string(), megacomplex);
        self
    }

    pub fn add_initial_concentration(mut self, label: &str, ic: InitialConcentration) -> Self {
        self.initial_concentrations.insert(label.to_string(), ic);
        self
    }

    pub fn add_irf(mut self, label: &str, irf: impl Into<Irf>) -> Self {
        self.irfs.insert(label.to_string(), irf.into());
        self
    }

    pub fn add_dataset(mut self, label: &str, dataset: DatasetModel) -> Self {
        self.datasets.insert(label.to_string(), dataset);
        self
    }

    /// Constraints are applied in the order they are added.
    pub fn add_constraint(mut self, constraint: ClpConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn add_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Clp labels whose amplitudes must not become negative.
    pub fn with_non_negative_clps(mut self, labels: &[&str]) -> Self {
        self.non_negative_clps = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn megacomplex(&self, label: &str) -> Option<&Arc<dyn Megacomplex>> {
        self.megacomplexes.get(label)
    }

    pub fn initial_concentration(&self, label: &str) -> Option<&InitialConcentration> {
        self.initial_concentrations.get(label)
    }

    pub fn irf(&self, label: &str) -> Option<&Irf> {
        self.irfs.get(label)
    }

    pub fn dataset(&self, label: &str) -> Option<&DatasetModel> {
        self.datasets.get(label)
    }

    pub fn datasets(&self) -> &BTreeMap<String, DatasetModel> {
        &self.datasets
    }

    pub fn constraints(&self) -> &[ClpConstraint] {
        &self.constraints
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn non_negative_clps(&self) -> &[String] {
        &self.non_negative_clps
    }

    /// The IRF of a dataset, if it has one.
    pub fn dataset_irf(&self, dataset: &DatasetModel) -> Option<&Irf> {
        dataset.irf.as_deref().and_then(|l| self.irfs.get(l))
    }

    fn dataset_megacomplexes<'a>(
        &'a self,
        dataset: &'a DatasetModel,
    ) -> impl Iterator<Item = (&'a String, &'a Arc<dyn Megacomplex>)> + 'a {
        dataset
            .megacomplex
            .iter()
            .filter_map(move |l| self.megacomplexes.get_key_value(l))
    }

    /// Whether any megacomplex in any dataset varies along the global axis.
    pub fn is_index_dependent(&self) -> bool {
        self.datasets.values().any(|dataset| {
            self.dataset_megacomplexes(dataset)
                .any(|(_, mc)| mc.is_index_dependent(self, dataset))
        })
    }

    /// The clp labels a dataset can produce, in first-seen order.
    pub fn dataset_clp_labels(&self, dataset: &DatasetModel) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for (_, mc) in self.dataset_megacomplexes(dataset) {
            for label in mc.clp_labels(self, dataset) {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    /// Labels of every parameter the matrices of a dataset depend on.
    pub fn dataset_parameter_labels(&self, dataset: &DatasetModel) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        for (_, mc) in self.dataset_megacomplexes(dataset) {
            labels.extend(mc.parameter_labels());
        }
        if let Some(irf) = self.dataset_irf(dataset) {
            labels.extend(irf.parameter_labels());
        }
        if let Some(ic) = dataset
            .initial_concentration
            .as_deref()
            .and_then(|l| self.initial_concentrations.get(l))
        {
            labels.extend(ic.parameters.iter().cloned());
        }
        labels.extend(dataset.scale.iter().cloned());
        labels
    }

    /// Every problem that prevents the model from being evaluated with the
    /// given parameters. Empty when the model is valid.
    pub fn problems(&self, parameters: &Parameters) -> Vec<String> {
        let mut problems = Vec::new();
        let require = |label: &str, context: &str, problems: &mut Vec<String>| {
            if !parameters.contains(label) {
                problems.push(format!("Unknown parameter '{}' in {}", label, context));
            }
        };

        for (label, mc) in &self.megacomplexes {
            for p in mc.parameter_labels() {
                require(&p, &format!("megacomplex '{}'", label), &mut problems);
            }
        }
        for (label, irf) in &self.irfs {
            problems.extend(irf.problems(label));
            for p in irf.parameter_labels() {
                require(&p, &format!("IRF '{}'", label), &mut problems);
            }
        }
        for (label, ic) in &self.initial_concentrations {
            problems.extend(ic.problems(label));
            for p in &ic.parameters {
                require(p, &format!("initial concentration '{}'", label), &mut problems);
            }
            if !self.compartments.is_empty() {
                for c in ic.compartments.iter().filter(|c| !self.compartments.contains(c)) {
                    problems.push(format!(
                        "Unknown compartment '{}' in initial concentration '{}'",
                        c, label
                    ));
                }
            }
        }

        let mut all_clp_labels = BTreeSet::new();
        for (label, dataset) in &self.datasets {
            if dataset.megacomplex.is_empty() {
                tracing::debug!(dataset = %label, "dataset declares no megacomplexes");
            }
            for mc_label in &dataset.megacomplex {
                match self.megacomplexes.get(mc_label) {
                    Some(mc) => problems.extend(mc.validate(self, dataset)),
                    None => problems.push(format!(
                        "Unknown megacomplex '{}' in dataset '{}'",
                        mc_label, label
                    )),
                }
            }
            if let Some(irf) = &dataset.irf {
                if !self.irfs.contains_key(irf) {
                    problems.push(format!("Unknown IRF '{}' in dataset '{}'", irf, label));
                }
            }
            if let Some(ic) = &dataset.initial_concentration {
                if !self.initial_concentrations.contains_key(ic) {
                    problems.push(format!(
                        "Unknown initial concentration '{}' in dataset '{}'",
                        ic, label
                    ));
                }
            }
            if let Some(scale) = &dataset.scale {
                require(scale, &format!("scale of dataset '{}'", label), &mut problems);
            }
            all_clp_labels.extend(self.dataset_clp_labels(dataset));
        }

        for constraint in &self.constraints {
            for clp in std::iter::once(constraint.target()).chain(constraint.source()) {
                if !all_clp_labels.contains(clp) {
                    problems.push(format!("Unknown clp label '{}' in constraint", clp));
                }
            }
        }
        for relation in &self.relations {
            for clp in [&relation.source, &relation.target] {
                if !all_clp_labels.contains(clp) {
                    problems.push(format!("Unknown clp label '{}' in relation", clp));
                }
            }
            require(&relation.parameter, "relation", &mut problems);
        }
        if let Some(label) = relation::find_cycle(&self.relations) {
            problems.push(format!("Cyclic relation involving clp '{}'", label));
        }

        problems
    }

    /// Fail with all problems joined, or succeed for a valid model.
    pub fn validate(&self, parameters: &Parameters) -> Result<()> {
        let problems = self.problems(parameters);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TarFitError::ModelValidation(problems.join("; ")))
        }
    }

    /// Substitute parameter values into a dataset definition.
    pub fn fill(
        &self,
        dataset_label: &str,
        parameters: Arc<Parameters>,
        model_axis: &Array1<f64>,
        global_axis: &Array1<f64>,
    ) -> Result<DatasetDescriptor> {
        let dataset = self.datasets.get(dataset_label).ok_or_else(|| {
            TarFitError::ModelValidation(format!("Unknown dataset '{}'", dataset_label))
        })?;

        let megacomplexes = dataset
            .megacomplex
            .iter()
            .map(|l| {
                self.megacomplexes
                    .get(l)
                    .map(|mc| (l.clone(), Arc::clone(mc)))
                    .ok_or_else(|| TarFitError::ModelValidation(format!("Unknown megacomplex '{}'", l)))
            })
            .collect::<Result<Vec<_>>>()?;

        let irf = self
            .dataset_irf(dataset)
            .map(|irf| irf.fill(&parameters, model_axis))
            .transpose()?;
        let initial_concentration = dataset
            .initial_concentration
            .as_deref()
            .and_then(|l| self.initial_concentrations.get(l))
            .map(|ic| ic.fill(&parameters))
            .transpose()?;
        let scale = dataset
            .scale
            .as_deref()
            .map(|l| parameters.value(l))
            .transpose()?;

        Ok(DatasetDescriptor::new(
            dataset_label,
            megacomplexes,
            irf,
            initial_concentration,
            scale,
            model_axis.clone(),
            global_axis.clone(),
            parameters,
        ))
    }
}
