use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use rand::Rng;

use crate::error::{DecError, Result};
use crate::optimizer::Parameter;

const KL_EPSILON: f32 = 1e-7;

/// Converts embeddings into soft cluster assignments with a student-t kernel, as in t-SNE:
///
/// `q_ij = (1 + ||z_i - μ_j||² / α)^(-(α+1)/2)`, normalized over `j`.
///
/// The centers `μ` are the only trainable weights. They are allocated by [`initialize`]
/// once the embedding dimension is known, either from the weights handed to
/// [`with_initial_weights`] or glorot-uniform at random.
///
/// [`initialize`]: ClusteringLayer::initialize
/// [`with_initial_weights`]: ClusteringLayer::with_initial_weights
#[derive(Debug, Clone)]
pub struct ClusteringLayer {
    n_clusters: usize,
    alpha: f32,
    initial_weights: Option<Array2<f32>>,
    centers: Option<Parameter>,
}

impl ClusteringLayer {
    pub fn new(n_clusters: usize, alpha: f32) -> Result<Self> {
        if n_clusters == 0 {
            return Err(DecError::invalid("n_clusters", "must be at least 1"));
        }
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(DecError::invalid("alpha", format!("must be a positive number, got {}", alpha)));
        }
        Ok(Self {
            n_clusters,
            alpha,
            initial_weights: None,
            centers: None,
        })
    }

    pub fn with_initial_weights(mut self, centers: Array2<f32>) -> Self {
        self.initial_weights = Some(centers);
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// `None` until the layer is initialized.
    pub fn embedding_dim(&self) -> Option<usize> {
        self.centers.as_ref().map(|c| c.value.ncols())
    }

    pub fn centers(&self) -> Option<&Array2<f32>> {
        self.centers.as_ref().map(|c| &c.value)
    }

    pub fn initialize<R: Rng>(&mut self, embedding_dim: usize, rng: &mut R) -> Result<()> {
        if embedding_dim == 0 {
            return Err(DecError::invalid("embedding_dim", "must be at least 1"));
        }
        let centers = match self.initial_weights.take() {
            Some(weights) => {
                if weights.dim() != (self.n_clusters, embedding_dim) {
                    let actual = [weights.nrows(), weights.ncols()];
                    self.initial_weights = Some(weights);
                    return Err(DecError::shape("initial cluster centers", &[self.n_clusters, embedding_dim], &actual));
                }
                weights
            }
            None => {
                let limit = (6.0 / (self.n_clusters + embedding_dim) as f32).sqrt();
                Array2::random_using((self.n_clusters, embedding_dim), Uniform::new_inclusive(-limit, limit), rng)
            }
        };
        self.centers = Some(Parameter::new(centers));
        Ok(())
    }

    /// Overwrites the centers, e.g. with k-means centroids.
    pub fn set_centers(&mut self, centers: Array2<f32>) -> Result<()> {
        let expected_dim = self.embedding_dim().unwrap_or(centers.ncols());
        if centers.dim() != (self.n_clusters, expected_dim) {
            return Err(DecError::shape(
                "cluster centers",
                &[self.n_clusters, expected_dim],
                &[centers.nrows(), centers.ncols()],
            ));
        }
        self.initial_weights = None;
        self.centers = Some(Parameter::new(centers));
        Ok(())
    }

    fn checked_centers(&self, embeddings: ArrayView2<f32>) -> Result<&Array2<f32>> {
        let centers = self.centers().ok_or(DecError::NotInitialized("clustering layer"))?;
        if embeddings.ncols() != centers.ncols() {
            return Err(DecError::shape(
                "clustering layer input",
                &[embeddings.nrows(), centers.ncols()],
                &[embeddings.nrows(), embeddings.ncols()],
            ));
        }
        Ok(centers)
    }

    /// Squared distances between every embedding and every center (batch × K).
    fn squared_distances(embeddings: ArrayView2<f32>, centers: &Array2<f32>) -> Array2<f32> {
        Array2::from_shape_fn((embeddings.nrows(), centers.nrows()), |(i, j)| {
            embeddings
                .row(i)
                .iter()
                .zip(centers.row(j).iter())
                .map(|(&z, &mu)| (z - mu) * (z - mu))
                .sum()
        })
    }

    /// Squared distances, rejected when an embedding (or its distance) is not finite.
    fn checked_distances(embeddings: ArrayView2<f32>, centers: &Array2<f32>) -> Result<Array2<f32>> {
        let distances = Self::squared_distances(embeddings, centers);
        if distances.iter().any(|d| !d.is_finite()) {
            return Err(DecError::NonFinite("clustering layer input"));
        }
        Ok(distances)
    }

    /// Normalizes the kernel in log space so large `α` or far points cannot underflow a row.
    fn soft_assignment(&self, distances: &Array2<f32>) -> Array2<f32> {
        let exponent = (self.alpha + 1.0) / 2.0;
        let alpha = self.alpha;
        let mut q = distances.mapv(|d| -exponent * (d / alpha).ln_1p());
        for mut row in q.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            // The row maximum contributes exp(0) = 1, so the sum is at least 1.
            let total = row.sum();
            row /= total;
        }
        q
    }

    /// Soft assignments (batch × K); each row sums to 1.
    pub fn forward(&self, embeddings: ArrayView2<f32>) -> Result<Array2<f32>> {
        let centers = self.checked_centers(embeddings)?;
        let distances = Self::checked_distances(embeddings, centers)?;
        Ok(self.soft_assignment(&distances))
    }

    /// Gradient of the batch-mean `KL(target || q)` for the given embeddings.
    ///
    /// The center gradient is stored on the layer's parameter; the embedding gradient is
    /// returned so it can be pushed through the encoder.
    pub fn backward(&mut self, embeddings: ArrayView2<f32>, target: ArrayView2<f32>) -> Result<Array2<f32>> {
        let centers = self.checked_centers(embeddings)?;
        if target.dim() != (embeddings.nrows(), self.n_clusters) {
            return Err(DecError::shape(
                "target distribution batch",
                &[embeddings.nrows(), self.n_clusters],
                &[target.nrows(), target.ncols()],
            ));
        }

        let distances = Self::checked_distances(embeddings, centers)?;
        let q = self.soft_assignment(&distances);
        let alpha = self.alpha;
        let scale = (alpha + 1.0) / alpha / embeddings.nrows().max(1) as f32;

        // coefficients[i, j] = (α+1)/α · (p_ij − q_ij) / (1 + d_ij/α) / B
        let mut coefficients = &target - &q;
        ndarray::Zip::from(&mut coefficients)
            .and(&distances)
            .for_each(|c, &d| *c *= scale / (1.0 + d / alpha));

        let row_weight = coefficients.sum_axis(Axis(1)).insert_axis(Axis(1));
        let grad_embeddings = &embeddings * &row_weight - coefficients.dot(centers);

        let column_weight = coefficients.sum_axis(Axis(0)).insert_axis(Axis(1));
        let grad_centers = centers * &column_weight - coefficients.t().dot(&embeddings);

        if let Some(param) = self.centers.as_mut() {
            param.grad = grad_centers;
        }
        Ok(grad_embeddings)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.centers.iter_mut().collect()
    }
}

/// Batch-mean `Σ_j p log(p / q)` with both distributions clipped to `[1e-7, 1]`.
pub fn kl_divergence(p: ArrayView2<f32>, q: ArrayView2<f32>) -> Result<f32> {
    if p.dim() != q.dim() {
        return Err(DecError::shape("kl divergence", &[p.nrows(), p.ncols()], &[q.nrows(), q.ncols()]));
    }
    if p.nrows() == 0 {
        return Ok(0.0);
    }
    let total: f32 = p
        .iter()
        .zip(q.iter())
        .map(|(&p, &q)| {
            let p = p.clamp(KL_EPSILON, 1.0);
            let q = q.clamp(KL_EPSILON, 1.0);
            p * (p / q).ln()
        })
        .sum();
    Ok(total / p.nrows() as f32)
}

/// Index of the most probable cluster per row; ties go to the lowest index.
pub fn hard_labels(q: ArrayView2<f32>) -> Vec<usize> {
    q.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_value), (idx, &value)| {
                    if value > best_value {
                        (idx, value)
                    } else {
                        (best, best_value)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn three_centers() -> ClusteringLayer {
        let mut layer = ClusteringLayer::new(3, 1.0).unwrap();
        layer.set_centers(array![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]]).unwrap();
        layer
    }

    #[test]
    fn point_near_center_is_confidently_assigned() {
        let layer = three_centers();
        let q = layer.forward(array![[0.1, 0.1]].view()).unwrap();
        assert_eq!(hard_labels(q.view()), vec![0]);
        assert!(q[[0, 0]] > 0.9, "q = {:?}", q);
    }

    #[test]
    fn rows_sum_to_one_even_on_a_center() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut layer = ClusteringLayer::new(4, 1.0).unwrap();
        layer.initialize(3, &mut rng).unwrap();
        let center = layer.centers().unwrap().row(2).to_owned();

        let mut embeddings = Array2::random_using((20, 3), Uniform::new(-50.0f32, 50.0), &mut rng);
        embeddings.row_mut(0).assign(&center);
        let q = layer.forward(embeddings.view()).unwrap();
        for row in q.axis_iter(Axis(0)) {
            assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(hard_labels(q.view())[0], 2);
    }

    #[test]
    fn non_default_alpha_still_normalizes() {
        let mut layer = ClusteringLayer::new(2, 5.0).unwrap();
        layer.set_centers(array![[0.0], [4.0]]).unwrap();
        let q = layer.forward(array![[1.0]].view()).unwrap();
        assert!(q[[0, 0]] > q[[0, 1]]);
        assert_abs_diff_eq!(q.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn large_alpha_keeps_far_points_sharp() {
        let mut layer = ClusteringLayer::new(2, 100.0).unwrap();
        layer.set_centers(array![[0.0], [100.0]]).unwrap();
        let q = layer.forward(array![[30.0], [70.0], [500.0]].view()).unwrap();
        assert!(q[[0, 0]] > 0.999, "q = {:?}", q);
        assert!(q[[1, 1]] > 0.999, "q = {:?}", q);
        assert!(q[[2, 1]] > 0.999, "q = {:?}", q);
        for row in q.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(hard_labels(q.view()), vec![0, 1, 1]);
    }

    #[test]
    fn large_alpha_backward_uses_the_sharp_assignment() {
        let mut layer = ClusteringLayer::new(2, 100.0).unwrap();
        layer.set_centers(array![[0.0], [100.0]]).unwrap();
        // q is already one-hot, so a matching target leaves nothing to learn.
        let grad = layer.backward(array![[30.0]].view(), array![[1.0, 0.0]].view()).unwrap();
        assert!(grad[[0, 0]].abs() < 1e-6, "grad = {:?}", grad);
        assert!(layer.parameters_mut()[0].grad.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn non_finite_embeddings_are_an_error() {
        let mut layer = three_centers();
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let z = array![[bad, 0.0]];
            assert!(matches!(layer.forward(z.view()), Err(DecError::NonFinite(_))));
            assert!(matches!(
                layer.backward(z.view(), array![[1.0, 0.0, 0.0]].view()),
                Err(DecError::NonFinite(_))
            ));
        }
    }

    #[test]
    fn dimension_mismatch_fails_fast() {
        let layer = three_centers();
        let err = layer.forward(array![[0.0, 0.0, 0.0]].view()).unwrap_err();
        assert!(matches!(err, DecError::ShapeMismatch { .. }));
    }

    #[test]
    fn forward_before_initialize_fails() {
        let layer = ClusteringLayer::new(2, 1.0).unwrap();
        assert!(matches!(
            layer.forward(array![[0.0]].view()),
            Err(DecError::NotInitialized(_))
        ));
    }

    #[test]
    fn initial_weights_bypass_random_init() {
        let mut rng = StdRng::seed_from_u64(0);
        let weights = array![[1.0, 2.0], [3.0, 4.0]];
        let mut layer = ClusteringLayer::new(2, 1.0).unwrap().with_initial_weights(weights.clone());
        layer.initialize(2, &mut rng).unwrap();
        assert_eq!(layer.centers(), Some(&weights));
    }

    #[test]
    fn misshaped_initial_weights_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = ClusteringLayer::new(3, 1.0).unwrap().with_initial_weights(array![[1.0, 2.0]]);
        assert!(matches!(layer.initialize(2, &mut rng), Err(DecError::ShapeMismatch { .. })));
    }

    #[test]
    fn invalid_construction() {
        assert!(ClusteringLayer::new(0, 1.0).is_err());
        assert!(ClusteringLayer::new(3, 0.0).is_err());
        assert!(ClusteringLayer::new(3, f32::NAN).is_err());
    }

    #[test]
    fn set_centers_checks_shape() {
        let mut layer = three_centers();
        assert!(layer.set_centers(array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).is_err());
        assert!(layer.set_centers(array![[0.0, 0.0]]).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut layer = ClusteringLayer::new(3, 1.0).unwrap();
        layer.set_centers(array![[0.0, 0.0], [2.0, 0.5], [-1.0, 2.0]]).unwrap();
        let z = array![[0.3, 0.2], [1.5, 0.4], [-0.5, 1.0], [0.8, -0.6]];
        let p = array![[0.7, 0.2, 0.1], [0.1, 0.8, 0.1], [0.2, 0.1, 0.7], [0.5, 0.3, 0.2]];

        let grad_z = layer.backward(z.view(), p.view()).unwrap();
        let grad_mu = layer.parameters_mut()[0].grad.clone();

        let loss = |layer: &ClusteringLayer, z: &Array2<f32>| {
            let q = layer.forward(z.view()).unwrap();
            kl_divergence(p.view(), q.view()).unwrap()
        };
        let eps = 1e-2;

        let mut z_plus = z.clone();
        z_plus[[1, 0]] += eps;
        let mut z_minus = z.clone();
        z_minus[[1, 0]] -= eps;
        let numeric = (loss(&layer, &z_plus) - loss(&layer, &z_minus)) / (2.0 * eps);
        assert_abs_diff_eq!(grad_z[[1, 0]], numeric, epsilon = 2e-3);

        let mut shifted = layer.centers().unwrap().clone();
        shifted[[2, 1]] += eps;
        let mut plus = layer.clone();
        plus.set_centers(shifted.clone()).unwrap();
        shifted[[2, 1]] -= 2.0 * eps;
        let mut minus = layer.clone();
        minus.set_centers(shifted).unwrap();
        let numeric = (loss(&plus, &z) - loss(&minus, &z)) / (2.0 * eps);
        assert_abs_diff_eq!(grad_mu[[2, 1]], numeric, epsilon = 2e-3);
    }

    #[test]
    fn kl_of_identical_distributions_is_zero() {
        let q = array![[0.3, 0.7], [0.5, 0.5]];
        assert_abs_diff_eq!(kl_divergence(q.view(), q.view()).unwrap(), 0.0, epsilon = 1e-7);
        assert!(kl_divergence(q.view(), array![[1.0, 0.0]].view()).is_err());
    }

    #[test]
    fn hard_labels_break_ties_low() {
        let q = array![[0.5, 0.5], [0.2, 0.8]];
        assert_eq!(hard_labels(q.view()), vec![0, 1]);
    }
}
