//! # tarfit-rs
//!
//! `tarfit-rs` fits kinetic and spectral models to time-resolved
//! spectroscopy data, globally across one or more datasets.
//!
//! The model matrix of each dataset is a sum of pluggable megacomplex
//! contributions. The conditionally linear parameters (clps, e.g. spectra)
//! are solved by variable projection at every global-axis index, after clp
//! constraints and relations have reduced the matrix. The remaining
//! nonlinear parameters (rates, IRF) are refined by Levenberg-Marquardt.
//!
//! The library provides:
//! - A typed model with constraints, relations, Gaussian or measured IRFs and
//!   initial concentrations
//! - Grouped and ungrouped residual problems
//! - A Levenberg-Marquardt minimizer with parameter bounds and expressions
//! - Decay, coherent-artifact and spectral-shape megacomplexes
//! - Simulation and parameter uncertainties
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ndarray::Array1;
//! use std::sync::Arc;
//! use tarfit_rs::megacomplexes::{DecayMegacomplex, KMatrix};
//! use tarfit_rs::model::{DatasetModel, InitialConcentration, Model};
//! use tarfit_rs::{optimize, ClpTable, Parameters, Scheme};
//!
//! let model = Model::new()
//!     .add_megacomplex("mc1", Arc::new(DecayMegacomplex::new(KMatrix::new().with_decay("s1", "k1"))))
//!     .add_initial_concentration("j1", InitialConcentration::new(&["s1"], &["j.1"]))
//!     .add_dataset("dataset1", DatasetModel::new(&["mc1"]).with_initial_concentration("j1"));
//!
//! let mut parameters = Parameters::new();
//! parameters.add_param("k1", 1.0)?;
//! parameters.add(tarfit_rs::parameters::Parameter::fixed("j.1", 1.0))?;
//!
//! let time = Array1::range(0.0, 50.0, 1.5);
//! let global = Array1::from(vec![0.0]);
//! let clps = ClpTable { labels: vec!["s1".to_string()], values: ndarray::array![[1.0]] };
//! let data = tarfit_rs::simulation::simulate(&model, "dataset1", &parameters, &time, &global, &clps, None)?;
//!
//! if let Some(k1) = parameters.get_mut("k1") {
//!     k1.set_value(0.5)?;
//! }
//! let scheme = Scheme::new(model, parameters).with_dataset("dataset1", data);
//! let result = optimize(&scheme)?;
//! println!("{}", result);
//! # Ok::<(), tarfit_rs::TarFitError>(())
//! ```

pub mod error;

pub mod builder;
pub mod dataset;
pub mod lm;
pub mod matrix;
pub mod megacomplexes;
pub mod model;
pub mod optimize;
pub mod parameters;
pub mod problem;
pub mod reduction;
pub mod result;
pub mod scheme;
pub mod simulation;
pub mod uncertainty;
pub mod utils;
pub mod varpro;

// Re-exports for convenience
pub use dataset::Dataset;
pub use error::{Result, TarFitError};
pub use matrix::{ClpTable, ClpVector, DatasetMatrices, LabeledMatrix};
pub use model::{ClpConstraint, Interval, Megacomplex, Model, Relation};
pub use optimize::optimize;
pub use parameters::{Parameter, Parameters};
pub use problem::{create_problem, GroupedProblem, Problem, SingularSystemWarning, UngroupedProblem};
pub use result::{DatasetResult, FitResult};
pub use scheme::{Grouping, Scheme, SchemeConfig};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
