//! Initial populations of the kinetic compartments.

use crate::parameters::{ParameterError, Parameters};
use serde::{Deserialize, Serialize};

/// Initial concentration of each compartment, by parameter label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConcentration {
    pub compartments: Vec<String>,
    pub parameters: Vec<String>,
    /// Compartments left out of the normalization
    #[serde(default)]
    pub exclude_from_normalize: Vec<String>,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

fn default_true() -> bool {
    true
}

impl InitialConcentration {
    pub fn new(compartments: &[&str], parameters: &[&str]) -> Self {
        Self {
            compartments: compartments.iter().map(|s| s.to_string()).collect(),
            parameters: parameters.iter().map(|s| s.to_string()).collect(),
            exclude_from_normalize: Vec::new(),
            normalize: true,
        }
    }

    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }

    pub fn problems(&self, label: &str) -> Vec<String> {
        if self.compartments.len() != self.parameters.len() {
            vec![format!(
                "Initial concentration '{}' has {} compartments but {} parameters",
                label,
                self.compartments.len(),
                self.parameters.len()
            )]
        } else {
            Vec::new()
        }
    }

    /// Resolve the values; with normalization the included compartments sum
    /// to one.
    pub fn fill(&self, parameters: &Parameters) -> Result<FilledInitialConcentration, ParameterError> {
        let mut values = self
            .parameters
            .iter()
            .map(|l| parameters.value(l))
            .collect::<Result<Vec<_>, _>>()?;

        if self.normalize {
            let included = |c: &String| !self.exclude_from_normalize.contains(c);
            let total: f64 = self
                .compartments
                .iter()
                .zip(&values)
                .filter(|(c, _)| included(c))
                .map(|(_, v)| v)
                .sum();
            if total != 0.0 {
                for (c, v) in self.compartments.iter().zip(values.iter_mut()) {
                    if included(c) {
                        *v /= total;
                    }
                }
            }
        }

        Ok(FilledInitialConcentration {
            compartments: self.compartments.clone(),
            values,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilledInitialConcentration {
    pub compartments: Vec<String>,
    pub values: Vec<f64>,
}

impl FilledInitialConcentration {
    pub fn value(&self, compartment: &str) -> Option<f64> {
        self.compartments
            .iter()
            .position(|c| c == compartment)
            .map(|i| self.values[i])
    }
}
