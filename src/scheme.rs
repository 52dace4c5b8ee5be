//! A fit setup: model, starting parameters, data and options.

use crate::dataset::Dataset;
use crate::error::{Result, TarFitError};
use crate::lm::LmConfig;
use crate::model::Model;
use crate::parameters::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How datasets are combined into linear problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Grouping {
    /// Grouped when there is more than one dataset
    #[default]
    Auto,

    /// Solve datasets sharing a global-axis value together
    Grouped,

    /// Solve every dataset on its own
    Ungrouped,
}

/// Options of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    /// Cap on penalty evaluations, not counting Jacobian evaluations.
    /// `Some(0)` evaluates the starting point only.
    pub maximum_number_function_evaluations: Option<usize>,

    /// Constrain every clp to be non-negative. Default: false
    pub non_negative_least_squares: bool,

    /// Largest distance between global-axis values that are grouped
    /// together. Default: 0
    pub group_tolerance: f64,

    /// Default: Auto
    pub grouping: Grouping,

    /// Default: 1e-8
    pub ftol: f64,

    /// Default: 1e-8
    pub xtol: f64,

    /// Default: 1e-8
    pub gtol: f64,

    /// Estimate covariance and standard errors at the optimum. Default: true
    pub calculate_uncertainties: bool,

    /// Build index-dependent matrices on the rayon pool. Default: false
    pub parallel: bool,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            maximum_number_function_evaluations: None,
            non_negative_least_squares: false,
            group_tolerance: 0.0,
            grouping: Grouping::default(),
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            calculate_uncertainties: true,
            parallel: false,
        }
    }
}

impl SchemeConfig {
    pub fn with_maximum_number_function_evaluations(mut self, max: Option<usize>) -> Self {
        self.maximum_number_function_evaluations = max;
        self
    }

    pub fn with_non_negative_least_squares(mut self, non_negative: bool) -> Self {
        self.non_negative_least_squares = non_negative;
        self
    }

    pub fn with_group_tolerance(mut self, tolerance: f64) -> Self {
        self.group_tolerance = tolerance;
        self
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn with_calculate_uncertainties(mut self, calculate: bool) -> Self {
        self.calculate_uncertainties = calculate;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Minimizer settings derived from these options.
    pub fn lm_config(&self) -> LmConfig {
        LmConfig {
            max_function_evaluations: self.maximum_number_function_evaluations,
            ftol: self.ftol,
            xtol: self.xtol,
            gtol: self.gtol,
            ..LmConfig::default()
        }
    }

    pub fn is_grouped(&self, dataset_count: usize) -> bool {
        match self.grouping {
            Grouping::Auto => dataset_count > 1,
            Grouping::Grouped => true,
            Grouping::Ungrouped => false,
        }
    }
}

/// Everything needed to run a fit.
#[derive(Debug, Clone)]
pub struct Scheme {
    pub model: Arc<Model>,
    pub parameters: Parameters,
    /// Data keyed by dataset label
    pub data: BTreeMap<String, Dataset>,
    pub config: SchemeConfig,
}

impl Scheme {
    pub fn new(model: impl Into<Arc<Model>>, parameters: Parameters) -> Self {
        Self {
            model: model.into(),
            parameters,
            data: BTreeMap::new(),
            config: SchemeConfig::default(),
        }
    }

    pub fn with_dataset(mut self, label: &str, dataset: Dataset) -> Self {
        self.data.insert(label.to_string(), dataset);
        self
    }

    pub fn with_config(mut self, config: SchemeConfig) -> Self {
        self.config = config;
        self
    }

    /// Model problems plus mismatches between model datasets and data.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = self.model.problems(&self.parameters);
        for label in self.model.datasets().keys() {
            if !self.data.contains_key(label) {
                problems.push(format!("No data for dataset '{}'", label));
            }
        }
        for (label, dataset) in &self.data {
            if self.model.dataset(label).is_none() {
                problems.push(format!("Data for dataset '{}' which is not in the model", label));
            }
            if dataset.data.dim() != (dataset.model_size(), dataset.global_size()) {
                problems.push(format!("Data of dataset '{}' does not match its axes", label));
            }
            if let Some(weight) = &dataset.weight {
                if weight.dim() != dataset.data.dim() {
                    problems.push(format!("Weight of dataset '{}' does not match its data", label));
                }
            }
        }
        if self.config.group_tolerance.is_nan() || self.config.group_tolerance < 0.0 {
            problems.push(format!(
                "Group tolerance must be non-negative, got {}",
                self.config.group_tolerance
            ));
        }
        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TarFitError::ModelValidation(problems.join("; ")))
        }
    }
}
