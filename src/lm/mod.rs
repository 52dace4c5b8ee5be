//! Levenberg-Marquardt minimizer.
//!
//! A damped Gauss-Newton method with Marquardt scaling, used by the
//! optimizer driver to minimize the variable-projection residual. Any type
//! implementing [`LeastSquaresProblem`] can be minimized.

pub mod algorithm;
pub mod config;
pub mod problem;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::{DecompositionMethod, LmConfig};
pub use problem::LeastSquaresProblem;
