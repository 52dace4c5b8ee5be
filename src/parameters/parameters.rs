//! The parameter collection.
//!
//! Parameters are stored sorted by label, which fixes the order in which
//! varying parameters are handed to the optimizer. Expressions are evaluated
//! in dependency order after every update.

use crate::parameters::expression::{EvaluationContext, Expression, ExpressionError};
use crate::parameters::parameter::{Parameter, ParameterError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::Path;

/// A collection of labeled parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    params: BTreeMap<String, Parameter>,
}

impl Parameters {
    /// Create a new empty parameters collection
    ///
    /// # Examples
    ///
    /// ```
    /// use tarfit_rs::parameters::Parameters;
    ///
    /// let mut params = Parameters::new();
    /// params.add_param("rates.k1", 0.5).unwrap();
    /// params.add_param_with_expr("rates.k2", "$rates.k1 / 2").unwrap();
    /// assert_eq!(params.value("rates.k2").unwrap(), 0.25);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, failing on a duplicate label or on an expression that
    /// cannot be evaluated yet.
    pub fn add(&mut self, param: Parameter) -> Result<(), ParameterError> {
        let label = param.label().to_string();
        if self.params.contains_key(&label) {
            return Err(ParameterError::DuplicateParameter { name: label });
        }
        let has_expr = param.expr().is_some();
        self.params.insert(label.clone(), param);

        if has_expr {
            if let Err(err) = self.update_expressions() {
                self.params.remove(&label);
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn add_param(&mut self, label: &str, value: f64) -> Result<(), ParameterError> {
        self.add(Parameter::new(label, value))
    }

    pub fn add_param_with_bounds(
        &mut self,
        label: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ParameterError> {
        self.add(Parameter::with_bounds(label, value, min, max)?)
    }

    pub fn add_param_with_expr(&mut self, label: &str, expr: &str) -> Result<(), ParameterError> {
        self.add(Parameter::with_expr(label, expr))
    }

    pub fn get(&self, label: &str) -> Option<&Parameter> {
        self.params.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Parameter> {
        self.params.get_mut(label)
    }

    /// The value of a parameter.
    pub fn value(&self, label: &str) -> Result<f64, ParameterError> {
        self.params
            .get(label)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: label.to_string(),
            })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.params.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.params.iter()
    }

    /// Labels of the parameters the optimizer varies, in optimizer order.
    pub fn varying_labels(&self) -> Vec<String> {
        self.params
            .values()
            .filter(|p| p.vary())
            .map(|p| p.label().to_string())
            .collect()
    }

    /// Internal values of the varying parameters, in optimizer order.
    pub fn varying_internal_values(&self) -> Result<Vec<f64>, ParameterError> {
        self.params
            .values()
            .filter(|p| p.vary())
            .map(Parameter::to_internal)
            .collect()
    }

    /// Update varying parameters from internal optimizer values, then
    /// re-evaluate expressions.
    pub fn update_from_internal(&mut self, values: &[f64]) -> Result<(), ParameterError> {
        self.check_value_count(values.len())?;
        let externals = self
            .params
            .values()
            .filter(|p| p.vary())
            .zip(values)
            .map(|(p, &v)| p.from_internal(v))
            .collect::<Vec<_>>();
        self.set_varying_values(&externals)
    }

    /// Update varying parameters from plain values, then re-evaluate
    /// expressions.
    pub fn set_varying_values(&mut self, values: &[f64]) -> Result<(), ParameterError> {
        self.check_value_count(values.len())?;
        for (param, &value) in self.params.values_mut().filter(|p| p.vary()).zip(values) {
            param.set_value(value)?;
        }
        self.update_expressions()
    }

    fn check_value_count(&self, actual: usize) -> Result<(), ParameterError> {
        let expected = self.params.values().filter(|p| p.vary()).count();
        if expected != actual {
            return Err(ParameterError::WrongValueCount { expected, actual });
        }
        Ok(())
    }

    /// Reset all parameters to their initial values
    pub fn reset(&mut self) -> Result<(), ParameterError> {
        self.params.values_mut().for_each(Parameter::reset);
        self.update_expressions()
    }

    /// Store standard errors by label; unknown labels are ignored.
    pub fn set_stderrs(&mut self, stderrs: &HashMap<String, f64>) {
        for (label, param) in self.params.iter_mut() {
            if let Some(&err) = stderrs.get(label) {
                param.set_stderr(Some(err));
            }
        }
    }

    /// Evaluate every expression parameter in dependency order.
    pub fn update_expressions(&mut self) -> Result<(), ParameterError> {
        for label in self.expression_order()? {
            let expr_str = match self.params.get(&label).and_then(Parameter::expr) {
                Some(expr) => expr.to_string(),
                None => continue,
            };
            let value = Expression::parse(&expr_str)
                .and_then(|expr| expr.evaluate(&*self))
                .map_err(|e| ParameterError::ExpressionEvaluation {
                    name: label.clone(),
                    message: e.to_string(),
                })?;
            if let Some(param) = self.params.get_mut(&label) {
                param.set_value(value)?;
            }
        }
        Ok(())
    }

    /// Labels a parameter's expression refers to directly.
    pub fn get_dependencies(&self, label: &str) -> Result<Vec<String>, ParameterError> {
        let param = self
            .params
            .get(label)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: label.to_string(),
            })?;
        match param.expr() {
            Some(expr) => Expression::parse(expr)
                .map(|e| e.variables())
                .map_err(|e| ParameterError::ExpressionEvaluation {
                    name: label.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(Vec::new()),
        }
    }

    /// Expression parameters ordered so that every dependency comes first.
    fn expression_order(&self) -> Result<Vec<String>, ParameterError> {
        fn visit(
            label: &str,
            params: &Parameters,
            visited: &mut HashSet<String>,
            in_progress: &mut HashSet<String>,
            order: &mut Vec<String>,
        ) -> Result<(), ParameterError> {
            if visited.contains(label) {
                return Ok(());
            }
            if !in_progress.insert(label.to_string()) {
                return Err(ParameterError::CircularDependency {
                    name: label.to_string(),
                });
            }
            for dep in params.get_dependencies(label)? {
                if !params.contains(&dep) {
                    return Err(ParameterError::ParameterNotFound { name: dep });
                }
                visit(&dep, params, visited, in_progress, order)?;
            }
            in_progress.remove(label);
            visited.insert(label.to_string());
            if params.get(label).and_then(Parameter::expr).is_some() {
                order.push(label.to_string());
            }
            Ok(())
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        for (label, param) in &self.params {
            if param.expr().is_some() {
                visit(label, self, &mut visited, &mut in_progress, &mut order)?;
            }
        }
        Ok(order)
    }
}

impl EvaluationContext for Parameters {
    fn get_variable(&self, name: &str) -> Result<f64, ExpressionError> {
        self.params
            .get(name)
            .map(Parameter::value)
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

/// Error that can occur during serialization/deserialization
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Parameters {
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), SerializationError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, SerializationError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Load parameters from a JSON string
    ///
    /// # Examples
    ///
    /// ```
    /// use tarfit_rs::parameters::Parameters;
    ///
    /// let json = r#"{
    ///   "params": {
    ///     "rates.k1": {
    ///       "label": "rates.k1",
    ///       "value": 0.5,
    ///       "init_value": 0.5,
    ///       "vary": true,
    ///       "bounds": { "min": 0.0, "max": null }
    ///     }
    ///   }
    /// }"#;
    ///
    /// let params = Parameters::from_json(json).unwrap();
    /// assert_eq!(params.value("rates.k1").unwrap(), 0.5);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(json)?)
    }
}
