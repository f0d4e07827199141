use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::error::Result;
use crate::optimizer::{Optimizer, Parameter};

/// A differentiable map from flattened samples to fixed-size embeddings.
pub trait Encoder {
    fn input_dim(&self) -> usize;

    fn embedding_dim(&self) -> usize;

    /// Inference pass; does not touch cached activations.
    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Training pass; caches what `backward` needs.
    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Back-propagates the gradient w.r.t. the embeddings of the last `forward` call
    /// into the parameter gradients.
    fn backward(&mut self, grad_embeddings: ArrayView2<f32>) -> Result<()>;

    /// Trainable parameters, always in the same order.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;
}

/// Unsupervised pretraining entry point, run once before clustering.
pub trait Pretrain {
    /// Returns the mean training loss of the final epoch.
    fn pretrain<O: Optimizer, R: Rng>(
        &mut self,
        inputs: ArrayView2<f32>,
        epochs: usize,
        batch_size: usize,
        optimizer: &mut O,
        rng: &mut R,
    ) -> Result<f32>;
}
