//! # Parameter System
//!
//! Labeled parameters shared by all datasets of a model.
//!
//! - [`Parameter`]: value, bounds, vary flag, optional non-negative transform
//!   and optional expression over other parameters
//! - [`Parameters`]: the sorted collection, with expression evaluation and the
//!   internal-space vector handed to the optimizer
//! - [`Bounds`] and [`BoundsTransform`]: mapping between bounded values and
//!   unbounded optimizer coordinates
//! - [`Expression`]: arithmetic over `$label` references
//!
//! ```rust
//! use tarfit_rs::parameters::{Parameter, Parameters};
//!
//! let mut params = Parameters::new();
//! params.add(Parameter::new("rates.k1", 0.5).non_negative()).unwrap();
//! params.add(Parameter::fixed("irf.center", 0.0)).unwrap();
//! params.add_param_with_expr("rates.k2", "$rates.k1 / 10").unwrap();
//!
//! assert_eq!(params.varying_labels(), vec!["rates.k1".to_string()]);
//! ```

pub mod bounds;
pub mod expression;
pub mod parameter;
pub mod parameters;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use expression::{EvaluationContext, Expression, ExpressionError};
pub use parameter::{Parameter, ParameterError};
pub use parameters::{Parameters, SerializationError};
