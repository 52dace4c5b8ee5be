//! Numerical helpers shared by the solvers.

pub mod finite_difference;
pub mod matrix_convert;
pub mod trapezoid;

pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
pub use trapezoid::trapezoid_area;
