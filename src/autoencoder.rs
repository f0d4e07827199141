use ndarray::{Array2, ArrayView2, Axis};
use rand::{seq::SliceRandom, Rng};

use crate::encoder::{Encoder, Pretrain};
use crate::error::{DecError, Result};
use crate::network::{Activation, DenseNetwork};
use crate::optimizer::{Optimizer, Parameter};

/// Encoder plus a mirrored decoder with a sigmoid output, trained on reconstruction error.
#[derive(Debug, Clone)]
pub struct DenseAutoencoder {
    pub encoder: DenseNetwork,
    pub decoder: DenseNetwork,
}

impl DenseAutoencoder {
    pub fn new<R: Rng>(
        input_dim: usize,
        hidden_dims: &[usize],
        embedding_dim: usize,
        embedding_activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        let mut encoder_dims = vec![input_dim];
        encoder_dims.extend_from_slice(hidden_dims);
        encoder_dims.push(embedding_dim);
        let decoder_dims: Vec<usize> = encoder_dims.iter().rev().copied().collect();

        let encoder = DenseNetwork::new(&encoder_dims, Activation::Relu, embedding_activation, rng)?;
        let decoder = DenseNetwork::new(&decoder_dims, Activation::Relu, Activation::Sigmoid, rng)?;
        Ok(Self { encoder, decoder })
    }

    pub fn from_parts(encoder: DenseNetwork, decoder: DenseNetwork) -> Result<Self> {
        if encoder.embedding_dim() != decoder.input_dim() || decoder.embedding_dim() != encoder.input_dim() {
            return Err(DecError::shape(
                "autoencoder halves",
                &[encoder.input_dim(), encoder.embedding_dim()],
                &[decoder.embedding_dim(), decoder.input_dim()],
            ));
        }
        Ok(Self { encoder, decoder })
    }

    pub fn reconstruct(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let embeddings = self.encoder.predict(inputs)?;
        self.decoder.predict(embeddings.view())
    }

    pub fn reconstruction_loss(&self, inputs: ArrayView2<f32>) -> Result<f32> {
        let reconstruction = self.reconstruct(inputs)?;
        Ok(mean_squared_error(&reconstruction, inputs))
    }

    pub fn into_encoder(self) -> DenseNetwork {
        self.encoder
    }

    fn train_on_batch<O: Optimizer>(&mut self, batch: ArrayView2<f32>, optimizer: &mut O) -> Result<f32> {
        let embeddings = self.encoder.forward(batch)?;
        let reconstruction = self.decoder.forward(embeddings.view())?;
        let loss = mean_squared_error(&reconstruction, batch);

        let scale = 2.0 / reconstruction.len() as f32;
        let grad_reconstruction = (&reconstruction - &batch) * scale;
        let grad_embeddings = self.decoder.backward_to_input(grad_reconstruction.view())?;
        self.encoder.backward(grad_embeddings.view())?;

        let mut params: Vec<&mut Parameter> = self.encoder.parameters_mut();
        params.extend(self.decoder.parameters_mut());
        optimizer.step(&mut params);
        Ok(loss)
    }
}

fn mean_squared_error(prediction: &Array2<f32>, target: ArrayView2<f32>) -> f32 {
    let squared: f32 = prediction
        .iter()
        .zip(target.iter())
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum();
    squared / prediction.len().max(1) as f32
}

impl Encoder for DenseAutoencoder {
    fn input_dim(&self) -> usize {
        self.encoder.input_dim()
    }

    fn embedding_dim(&self) -> usize {
        self.encoder.embedding_dim()
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.encoder.predict(inputs)
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.encoder.forward(inputs)
    }

    fn backward(&mut self, grad_embeddings: ArrayView2<f32>) -> Result<()> {
        self.encoder.backward(grad_embeddings)
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.encoder.parameters_mut()
    }
}

impl Pretrain for DenseAutoencoder {
    fn pretrain<O: Optimizer, R: Rng>(
        &mut self,
        inputs: ArrayView2<f32>,
        epochs: usize,
        batch_size: usize,
        optimizer: &mut O,
        rng: &mut R,
    ) -> Result<f32> {
        if inputs.nrows() == 0 {
            return Err(DecError::EmptyInput("pretraining inputs"));
        }
        if batch_size == 0 {
            return Err(DecError::invalid("batch_size", "must be at least 1"));
        }

        let mut order: Vec<usize> = (0..inputs.nrows()).collect();
        let mut epoch_loss = self.reconstruction_loss(inputs)?;
        for epoch in 0..epochs {
            order.shuffle(rng);
            let mut loss_sum = 0.0;
            let mut n_batches = 0;
            for chunk in order.chunks(batch_size) {
                let batch = inputs.select(Axis(0), chunk);
                loss_sum += self.train_on_batch(batch.view(), optimizer)?;
                n_batches += 1;
            }
            epoch_loss = loss_sum / n_batches as f32;
            log::info!("Pretrain epoch {}/{}: loss = {:.6}", epoch + 1, epochs, epoch_loss);
        }
        Ok(epoch_loss)
    }
}
