//! Trapezoidal integration.

use ndarray::ArrayView1;

/// Area under `y(x)` by the trapezoidal rule. Fewer than two points give 0.
pub fn trapezoid_area(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    x.iter()
        .zip(y.iter())
        .zip(x.iter().skip(1).zip(y.iter().skip(1)))
        .map(|((x0, y0), (x1, y1))| 0.5 * (x1 - x0) * (y0 + y1))
        .sum()
}
