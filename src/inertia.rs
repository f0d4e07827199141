use ndarray::{ArrayView2, Axis};

use crate::distance::squared_euclidian_distance;

/// Sum of squared distances of every point to the centroid it is assigned to.
pub fn calculate_inertia(data: ArrayView2<f32>, centroids: ArrayView2<f32>, labels: &[usize]) -> f64 {
    data.axis_iter(Axis(0))
        .zip(labels.iter())
        .map(|(point, &label)| squared_euclidian_distance(point, centroids.row(label)) as f64)
        .sum()
}
