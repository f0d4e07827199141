use ndarray::{Array2, ArrayView2};
use rand::{distributions::{Distribution, WeightedIndex}, Rng};
use rayon::prelude::*;

use crate::distance::squared_euclidian_distance;

/// k-means++ seeding: the first centroid is drawn uniformly, every further one
/// with probability proportional to its squared distance to the closest centroid so far.
pub fn kmeans_plusplus<R: Rng>(data: ArrayView2<f32>, k: usize, rng: &mut R) -> Array2<f32> {
    let (n_points, dim) = data.dim();
    let mut centroids = Array2::<f32>::zeros((k, dim));

    // Randomly select the first centroid
    let first_idx = rng.gen_range(0..n_points);
    centroids.row_mut(0).assign(&data.row(first_idx));

    if k == 1 {
        return centroids;
    }

    let mut min_distances = vec![f64::MAX; n_points];

    for centroid_idx in 1..k {
        let last = centroids.row(centroid_idx - 1);
        min_distances
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, min_dist)| {
                let distance = squared_euclidian_distance(data.row(idx), last) as f64;
                *min_dist = min_dist.min(distance);
            });

        // All remaining points coincide with a chosen centroid: fall back to a uniform draw.
        let next_centroid_idx = match WeightedIndex::new(&min_distances) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..n_points),
        };
        centroids.row_mut(centroid_idx).assign(&data.row(next_centroid_idx));
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Axis};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn picks_centroids_from_data() {
        let data = array![[0.0f32, 0.0], [0.1, 0.0], [10.0, 10.0], [10.1, 10.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let centroids = kmeans_plusplus(data.view(), 2, &mut rng);
        for centroid in centroids.axis_iter(Axis(0)) {
            assert!(data.axis_iter(Axis(0)).any(|row| row == centroid));
        }
        // Once one blob is taken, the other has all of the probability mass.
        let near_origin = centroids.axis_iter(Axis(0)).filter(|c| c[0] < 5.0).count();
        assert_eq!(near_origin, 1);
    }

    #[test]
    fn identical_points_do_not_panic() {
        let data = Array2::<f32>::ones((5, 3));
        let mut rng = StdRng::seed_from_u64(1);
        let centroids = kmeans_plusplus(data.view(), 3, &mut rng);
        assert_eq!(centroids, Array2::<f32>::ones((3, 3)));
    }
}
