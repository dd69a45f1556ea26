use hiscore_space::BoundedParameterSpace;
use ndarray::{Array1, Array2};

/// Returns the `iter`-th injected point projected onto the bounds
pub(crate) fn propose_injected(
    points: &Array2<f64>,
    iter: usize,
    space: &BoundedParameterSpace,
) -> Option<Array1<f64>> {
    (iter < points.nrows()).then(|| space.clamp(&points.row(iter)))
}
