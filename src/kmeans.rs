use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::centroid::Centroid;
use crate::config::KMeansConfig;
use crate::distance::euclidian_distance;
use crate::error::{DecError, Result};
use crate::inertia::calculate_inertia;
use crate::initialization::kmeans_plusplus;

/// Outcome of a hard clustering: centroids (k × d), one label per point and the inertia.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub centroids: Array2<f32>,
    pub labels: Vec<usize>,
    pub inertia: f64,
}

/// A clustering routine used to seed the cluster centers.
pub trait Clusterer {
    fn fit_predict(&self, points: ArrayView2<f32>, k: usize) -> Result<Clustering>;
}

/// Lloyd's k-means with k-means++ seeding and `n_init` restarts; the run with the lowest
/// inertia wins.
#[derive(Debug, Clone, Default)]
pub struct KMeans {
    pub config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }
}

impl Clusterer for KMeans {
    fn fit_predict(&self, points: ArrayView2<f32>, k: usize) -> Result<Clustering> {
        if points.nrows() == 0 {
            return Err(DecError::EmptyInput("k-means points"));
        }
        if k == 0 {
            return Err(DecError::invalid("k", "must be at least 1"));
        }
        if k > points.nrows() {
            return Err(DecError::invalid(
                "k",
                "number of clusters cannot be greater than the number of data points",
            ));
        }
        if self.config.n_init == 0 {
            return Err(DecError::invalid("n_init", "must be at least 1"));
        }

        let base_seed = self.config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let runs: Vec<(Clustering, usize)> = (0..self.config.n_init)
            .into_par_iter()
            .map(|initialization_index| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(initialization_index as u64));
                kmeans_single(points, k, &self.config, &mut rng)
            })
            .collect();

        let inertia_per_initialization = runs.iter().map(|(run, _)| run.inertia).collect_vec();
        for (initialization_index, (run, iterations)) in runs.iter().enumerate() {
            log::debug!(
                "Finished KMeans for initialization #{} after {} iterations - Inertia: {}",
                initialization_index,
                iterations,
                run.inertia
            );
        }

        let (best_initialization_index, (best, _)) = runs
            .into_iter()
            .enumerate()
            .min_by(|(_, (a, _)), (_, (b, _))| a.inertia.total_cmp(&b.inertia))
            .ok_or(DecError::EmptyInput("k-means initializations"))?;

        log::info!("Inertia per initialization: {:?}", inertia_per_initialization);
        log::info!(
            "Best initialization is index #{} with {} inertia",
            best_initialization_index,
            best.inertia
        );
        Ok(best)
    }
}

fn calculate_frobenius_norm(centroids: &Array2<f32>, prev_centroids: &Array2<f32>) -> f64 {
    centroids
        .iter()
        .zip(prev_centroids.iter())
        .map(|(&a, &b)| {
            let diff = (a - b) as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

fn nearest_centroid(point: ArrayView1<f32>, centroids: &Array2<f32>) -> (usize, f32) {
    centroids
        .axis_iter(Axis(0))
        .map(|centroid| euclidian_distance(point, centroid))
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .unwrap_or((0, f32::MAX))
}

/// Assignment step skipping centroids that the triangle inequality rules out:
/// if d(c_best, c_j) >= 2 d(x, c_best) then c_j cannot be closer to x than c_best.
fn nearest_centroid_pruned(
    point: ArrayView1<f32>,
    centroids: &Array2<f32>,
    centroid_distances: &Array2<f32>,
    start: usize,
) -> (usize, f32) {
    let mut best = start;
    let mut best_distance = euclidian_distance(point, centroids.row(start));
    for candidate in 0..centroids.nrows() {
        if candidate == best || centroid_distances[[best, candidate]] >= 2.0 * best_distance {
            continue;
        }
        let distance = euclidian_distance(point, centroids.row(candidate));
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    (best, best_distance)
}

fn pairwise_centroid_distances(centroids: &Array2<f32>) -> Array2<f32> {
    let k = centroids.nrows();
    Array2::from_shape_fn((k, k), |(a, b)| euclidian_distance(centroids.row(a), centroids.row(b)))
}

/// One k-means run. Returns the clustering and the number of iterations performed.
pub fn kmeans_single<R: Rng>(
    data: ArrayView2<f32>,
    k: usize,
    config: &KMeansConfig,
    rng: &mut R,
) -> (Clustering, usize) {
    let n_points = data.nrows();
    let mut centroids = kmeans_plusplus(data, k, rng);
    let mut labels = vec![0usize; n_points];
    let mut iterations = 0;

    for iter in 0..config.max_iter {
        iterations = iter + 1;

        labels = if config.triangle_inequality {
            let centroid_distances = pairwise_centroid_distances(&centroids);
            let previous = &labels;
            (0..n_points)
                .into_par_iter()
                .map(|idx| nearest_centroid_pruned(data.row(idx), &centroids, &centroid_distances, previous[idx]).0)
                .collect()
        } else {
            (0..n_points)
                .into_par_iter()
                .map(|idx| nearest_centroid(data.row(idx), &centroids).0)
                .collect()
        };

        let mut sums: Vec<Array1<f64>> = vec![Array1::zeros(data.ncols()); k];
        let mut cluster_sizes = vec![0usize; k];
        for (point, &label) in data.axis_iter(Axis(0)).zip(labels.iter()) {
            sums[label].update_centroid(point);
            cluster_sizes[label] += 1;
        }

        let prev_centroids = centroids.clone();
        for (idx, (mut sum, size)) in sums.into_iter().zip(cluster_sizes).enumerate() {
            if size > 0 {
                sum.finalize_centroid(size);
                centroids.row_mut(idx).assign(&sum.mapv(|v| v as f32));
            } else {
                // Reassign to a random data point if cluster is empty
                let replacement = rng.gen_range(0..n_points);
                centroids.row_mut(idx).assign(&data.row(replacement));
            }
        }

        // Check for convergence
        let frobenius_norm = calculate_frobenius_norm(&centroids, &prev_centroids);
        let new_centroids_norm = centroids.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt();
        let relative_shift = if new_centroids_norm > 0.0 {
            frobenius_norm / new_centroids_norm
        } else {
            frobenius_norm
        };
        if relative_shift < config.tol {
            break;
        }
    }

    // Labels must describe the final centroids.
    labels = (0..n_points)
        .into_par_iter()
        .map(|idx| nearest_centroid(data.row(idx), &centroids).0)
        .collect();
    let inertia = calculate_inertia(data, centroids.view(), &labels);

    (
        Clustering {
            centroids,
            labels,
            inertia,
        },
        iterations,
    )
}
