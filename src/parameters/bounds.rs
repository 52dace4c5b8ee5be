//! Parameter bounds and the internal/external value transform.
//!
//! The optimizer works on unbounded internal values. A bounded parameter is
//! mapped with the Minuit-style transforms; a non-negative parameter is first
//! moved into log space so that it can never cross zero.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Non-negative parameter has non-positive value {value}")]
    NonPositiveValue { value: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Minimum and maximum value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

// Infinite limits are written as `null` so the JSON stays valid.
impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;
        let min = self.min.is_finite().then_some(self.min);
        let max = self.max.is_finite().then_some(self.max);
        state.serialize_field("min", &min)?;
        state.serialize_field("max", &max)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;
        Ok(Bounds {
            min: helper.min.unwrap_or(f64::NEG_INFINITY),
            max: helper.max.unwrap_or(f64::INFINITY),
        })
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create bounds, failing if `min > max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tarfit_rs::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert!(bounds.is_within_bounds(10.0));
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// The bounds seen by a log-space parameter. Non-positive limits become
    /// unbounded on that side.
    fn to_log_space(self) -> Self {
        let log = |v: f64, unbounded: f64| {
            if v.is_finite() && v > 0.0 {
                v.ln()
            } else {
                unbounded
            }
        };
        Self {
            min: log(self.min, f64::NEG_INFINITY),
            max: log(self.max, f64::INFINITY),
        }
    }
}

/// Maps between the value the model sees (external) and the value the
/// optimizer moves (internal).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
    log_space: bool,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            log_space: false,
        }
    }

    /// A transform for a parameter optimized as `ln(value)`.
    pub fn non_negative(bounds: Bounds) -> Self {
        Self {
            bounds: bounds.to_log_space(),
            log_space: true,
        }
    }

    /// Transform an internal value to the external value, which is always
    /// within bounds.
    pub fn to_external(&self, internal_value: f64) -> f64 {
        let b = &self.bounds;
        let value = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => b.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => b.min + (internal_value.sin() + 1.0) * (b.max - b.min) / 2.0,
        };
        if self.log_space {
            value.exp()
        } else {
            value
        }
    }

    /// Transform an external value to the internal value.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        let value = if self.log_space {
            if external_value <= 0.0 {
                return Err(BoundsError::NonPositiveValue {
                    value: external_value,
                });
            }
            external_value.ln()
        } else {
            external_value
        };

        let b = &self.bounds;
        // Log rounding can push a value sitting on a bound just past it.
        let value = if self.log_space { b.clamp(value) } else { value };
        if !b.is_within_bounds(value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: b.min,
                max: b.max,
            });
        }

        Ok(match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => value,
            (true, false) => ((value - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let scaled = 2.0 * (value - b.min) / (b.max - b.min) - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        })
    }
}
