//! Conversions between ndarray and nalgebra.
//!
//! Matrices are stored and passed around as ndarray arrays; the dense
//! decompositions (SVD, pseudo-inverse) come from nalgebra.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Convert an ndarray matrix view to a nalgebra `DMatrix`.
pub fn ndarray_to_nalgebra(arr: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert a nalgebra `DMatrix` to an ndarray matrix.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Convert an ndarray vector view to a nalgebra `DVector`.
pub fn ndarray_vec_to_nalgebra(arr: ArrayView1<'_, f64>) -> DVector<f64> {
    DVector::from_iterator(arr.len(), arr.iter().copied())
}

/// Convert a nalgebra `DVector` to an ndarray vector.
pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    vec.iter().copied().collect()
}
