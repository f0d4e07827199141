use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::clustering_layer::{hard_labels, kl_divergence, ClusteringLayer};
use crate::encoder::Encoder;
use crate::error::{DecError, Result};
use crate::optimizer::{Optimizer, Parameter};

/// Encoder with the clustering layer stacked on its embeddings.
#[derive(Debug, Clone)]
pub struct DecModel<E: Encoder> {
    pub encoder: E,
    pub clustering: ClusteringLayer,
}

impl<E: Encoder> DecModel<E> {
    /// Fails if the layer already holds centers of another dimensionality than the encoder output.
    pub fn new(encoder: E, clustering: ClusteringLayer) -> Result<Self> {
        if let Some(dim) = clustering.embedding_dim() {
            if dim != encoder.embedding_dim() {
                return Err(DecError::shape(
                    "cluster centers vs. embedding",
                    &[clustering.n_clusters(), encoder.embedding_dim()],
                    &[clustering.n_clusters(), dim],
                ));
            }
        }
        Ok(Self { encoder, clustering })
    }

    /// Allocates the cluster centers for the encoder's embedding size.
    pub fn initialize<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        self.clustering.initialize(self.encoder.embedding_dim(), rng)
    }

    pub fn n_clusters(&self) -> usize {
        self.clustering.n_clusters()
    }

    pub fn embed(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.encoder.predict(inputs)
    }

    /// Soft assignments for every input row.
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let embeddings = self.encoder.predict(inputs)?;
        self.clustering.forward(embeddings.view())
    }

    pub fn predict_labels(&self, inputs: ArrayView2<f32>) -> Result<Vec<usize>> {
        let q = self.predict(inputs)?;
        Ok(hard_labels(q.view()))
    }

    /// One optimizer step on `KL(target || q)` through both the clustering layer and the
    /// encoder. Returns the loss measured before the update.
    pub fn train_on_batch<O: Optimizer>(
        &mut self,
        inputs: ArrayView2<f32>,
        target: ArrayView2<f32>,
        optimizer: &mut O,
    ) -> Result<f32> {
        if inputs.nrows() != target.nrows() {
            return Err(DecError::shape("minibatch rows", &[inputs.nrows()], &[target.nrows()]));
        }

        let embeddings = self.encoder.forward(inputs)?;
        let q = self.clustering.forward(embeddings.view())?;
        let loss = kl_divergence(target, q.view())?;

        let grad_embeddings = self.clustering.backward(embeddings.view(), target)?;
        self.encoder.backward(grad_embeddings.view())?;

        let mut params: Vec<&mut Parameter> = self.encoder.parameters_mut();
        params.extend(self.clustering.parameters_mut());
        optimizer.step(&mut params);
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Activation, Dense, DenseNetwork};
    use crate::optimizer::Adam;
    use crate::target::target_distribution;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn identity_encoder() -> DenseNetwork {
        DenseNetwork {
            layers: vec![Dense::from_parts(
                array![[1.0, 0.0], [0.0, 1.0]],
                Array2::zeros((1, 2)),
                Activation::Identity,
            )],
        }
    }

    #[test]
    fn rejects_centers_of_the_wrong_dimension() {
        let mut layer = ClusteringLayer::new(2, 1.0).unwrap();
        layer.set_centers(array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        assert!(matches!(
            DecModel::new(identity_encoder(), layer),
            Err(DecError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn initialize_sizes_centers_from_encoder() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = DecModel::new(identity_encoder(), ClusteringLayer::new(3, 1.0).unwrap()).unwrap();
        model.initialize(&mut rng).unwrap();
        assert_eq!(model.clustering.centers().unwrap().dim(), (3, 2));
    }

    #[test]
    fn training_steps_lower_the_kl_loss() {
        let mut layer = ClusteringLayer::new(2, 1.0).unwrap();
        layer.set_centers(array![[-1.0, 0.0], [1.0, 0.0]]).unwrap();
        let mut model = DecModel::new(identity_encoder(), layer).unwrap();

        let x = array![[-1.2, 0.3], [-0.8, -0.2], [0.9, 0.1], [1.3, -0.4]];
        let p = target_distribution(model.predict(x.view()).unwrap().view());
        let mut adam = Adam::new_default(0.01);

        let first = model.train_on_batch(x.view(), p.view(), &mut adam).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = model.train_on_batch(x.view(), p.view(), &mut adam).unwrap();
        }
        assert!(last < first, "loss went from {} to {}", first, last);
        assert_eq!(model.predict_labels(x.view()).unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn mismatched_target_rows() {
        let mut layer = ClusteringLayer::new(2, 1.0).unwrap();
        layer.set_centers(array![[-1.0, 0.0], [1.0, 0.0]]).unwrap();
        let mut model = DecModel::new(identity_encoder(), layer).unwrap();
        let mut adam = Adam::new_default(0.01);
        let err = model
            .train_on_batch(array![[0.0, 0.0]].view(), array![[0.5, 0.5], [0.5, 0.5]].view(), &mut adam)
            .unwrap_err();
        assert!(matches!(err, DecError::ShapeMismatch { .. }));
    }
}
