//! A single labeled model parameter.
//!
//! Parameters are identified by a dotted label such as `rates.k1` or
//! `irf.center`. They can be varied by the optimizer, fixed, bounded,
//! restricted to positive values, or computed from other parameters through an
//! expression.

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}' cannot have both an expression and be varied")]
    ExpressionAndVary { name: String },

    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    #[error("Cannot evaluate expression for parameter '{name}': {message}")]
    ExpressionEvaluation { name: String, message: String },

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Parameter '{name}' already exists")]
    DuplicateParameter { name: String },

    #[error("Circular dependency in expression for parameter '{name}'")]
    CircularDependency { name: String },

    #[error("Expected {expected} values for varying parameters, got {actual}")]
    WrongValueCount { expected: usize, actual: usize },
}

/// A parameter of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    label: String,

    value: f64,

    /// Value at creation, restored by [`Parameter::reset`]
    init_value: f64,

    vary: bool,

    #[serde(default)]
    bounds: Bounds,

    /// Optimize in log space so the value stays strictly positive
    #[serde(default)]
    non_negative: bool,

    #[serde(default)]
    expr: Option<String>,

    /// Standard error, set after fitting
    #[serde(default)]
    stderr: Option<f64>,
}

impl Parameter {
    /// Create a varying, unbounded parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use tarfit_rs::parameters::Parameter;
    ///
    /// let param = Parameter::new("rates.k1", 0.5);
    /// assert_eq!(param.label(), "rates.k1");
    /// assert_eq!(param.value(), 0.5);
    /// assert!(param.vary());
    /// ```
    pub fn new(label: &str, value: f64) -> Self {
        Self {
            label: label.to_string(),
            value,
            init_value: value,
            vary: true,
            bounds: Bounds::default(),
            non_negative: false,
            expr: None,
            stderr: None,
        }
    }

    /// Create a fixed parameter that the optimizer never changes.
    pub fn fixed(label: &str, value: f64) -> Self {
        Self {
            vary: false,
            ..Self::new(label, value)
        }
    }

    /// Create a varying parameter with bounds. The value is clamped into the
    /// bounds.
    pub fn with_bounds(label: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        let value = bounds.clamp(value);
        Ok(Self {
            value,
            init_value: value,
            bounds,
            ..Self::new(label, value)
        })
    }

    /// Create a parameter computed from an expression over other parameters.
    ///
    /// The value is a placeholder until the owning collection evaluates the
    /// expression.
    pub fn with_expr(label: &str, expr: &str) -> Self {
        Self {
            vary: false,
            expr: Some(expr.to_string()),
            ..Self::new(label, f64::NAN)
        }
    }

    /// Mark the parameter as strictly positive, optimized as `ln(value)`.
    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, failing if it lies outside the bounds.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.is_within_bounds(value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }
        self.value = value;
        Ok(())
    }

    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
    }

    pub fn vary(&self) -> bool {
        self.vary
    }

    pub fn set_vary(&mut self, vary: bool) -> Result<(), ParameterError> {
        if vary && self.expr.is_some() {
            return Err(ParameterError::ExpressionAndVary {
                name: self.label.clone(),
            });
        }
        self.vary = vary;
        Ok(())
    }

    pub fn is_non_negative(&self) -> bool {
        self.non_negative
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }

    pub fn expr(&self) -> Option<&str> {
        self.expr.as_deref()
    }

    /// Set or clear the expression. Setting one stops the parameter from
    /// varying.
    pub fn set_expr(&mut self, expr: Option<&str>) {
        self.expr = expr.map(str::to_string);
        if self.expr.is_some() {
            self.vary = false;
        }
    }

    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    pub fn transform(&self) -> BoundsTransform {
        if self.non_negative {
            BoundsTransform::non_negative(self.bounds)
        } else {
            BoundsTransform::new(self.bounds)
        }
    }

    /// The value in the optimizer's internal space.
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        self.transform()
            .to_internal(self.value)
            .map_err(ParameterError::from)
    }

    /// Map an internal optimizer value back to a parameter value.
    pub fn from_internal(&self, internal_value: f64) -> f64 {
        self.bounds.clamp(self.transform().to_external(internal_value))
    }
}
