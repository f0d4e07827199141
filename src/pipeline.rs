//! End-to-end run: pretrain, seed the centers, refine, evaluate.

use ndarray::ArrayView2;
use rand::{rngs::StdRng, SeedableRng};

use crate::autoencoder::DenseAutoencoder;
use crate::checkpoint::{load_autoencoder, load_dec, load_encoder, save_autoencoder, save_dec, save_encoder};
use crate::clustering_layer::{hard_labels, kl_divergence, ClusteringLayer};
use crate::config::PipelineConfig;
use crate::dec::DecModel;
use crate::encoder::{Encoder, Pretrain};
use crate::error::{DecError, Result};
use crate::initializer::initialize_cluster_centers;
use crate::kmeans::KMeans;
use crate::load::{save_embeddings, Dataset, DatasetLoader};
use crate::metrics::{confusion_matrix, format_confusion_matrix, ClusterMetrics};
use crate::network::DenseNetwork;
use crate::optimizer::Adam;
use crate::target::target_distribution;
use crate::trainer::{DecTrainer, TrainingReport};

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Vec<usize>,
    /// `KL(P || Q)` of the evaluated set against its own target distribution.
    pub loss: f32,
    pub metrics: Option<ClusterMetrics>,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub model: DecModel<DenseNetwork>,
    /// Absent when the refined model was loaded instead of trained.
    pub training: Option<TrainingReport>,
    pub evaluation: Evaluation,
}

pub struct Pipeline {
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Loads the datasets from `data_dir` and runs every stage.
    pub fn run(&self) -> Result<PipelineOutcome> {
        let train = DatasetLoader::new(&self.config.data_dir, &self.config.train_prefix)?.dataset;
        let test = match &self.config.test_prefix {
            Some(prefix) => Some(DatasetLoader::new(&self.config.data_dir, prefix)?.dataset),
            None => None,
        };
        self.run_on(&train, test.as_ref())
    }

    /// Runs every stage on in-memory data; the final evaluation uses `test` when given and
    /// falls back to `train`.
    pub fn run_on(&self, train: &Dataset, test: Option<&Dataset>) -> Result<PipelineOutcome> {
        if train.is_empty() {
            return Err(DecError::EmptyInput("training set"));
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let (model, training) = if self.config.train_cluster {
            let encoder = self.encoder_stage(train, &mut rng)?;
            let n_clusters = self.n_clusters(train)?;
            let (model, report) = self.cluster_stage(encoder, n_clusters, train)?;
            (model, Some(report))
        } else {
            (load_dec(&self.config.dec_path())?, None)
        };

        let eval_set = test.unwrap_or(train);
        log::info!("Evaluating on {} samples", eval_set.len());
        let evaluation = evaluate(&model, eval_set.images.view(), eval_set.labels.as_deref())?;

        if self.config.export_embeddings {
            let embeddings = model.embed(eval_set.images.view())?;
            save_embeddings(
                &self.config.embeddings_path(),
                &embeddings,
                eval_set.labels.as_deref(),
                &evaluation.predictions,
            )?;
        }

        Ok(PipelineOutcome {
            model,
            training,
            evaluation,
        })
    }

    fn encoder_stage(&self, train: &Dataset, rng: &mut StdRng) -> Result<DenseNetwork> {
        if !self.config.pretrain_autoencoder {
            return self.load_pretrained(train);
        }

        let pretrain = &self.config.pretrain;
        let mut autoencoder = DenseAutoencoder::new(
            train.images.ncols(),
            &pretrain.hidden_dims,
            pretrain.embedding_dim,
            pretrain.embedding_activation,
            rng,
        )?;
        log::info!(
            "Pretraining autoencoder {} -> {:?} -> {} for {} epochs",
            train.images.ncols(),
            pretrain.hidden_dims,
            pretrain.embedding_dim,
            pretrain.epochs
        );
        let mut optimizer = Adam::new_default(pretrain.learning_rate);
        let loss = autoencoder.pretrain(
            train.images.view(),
            pretrain.epochs,
            pretrain.batch_size,
            &mut optimizer,
            rng,
        )?;

        save_autoencoder(&self.config.autoencoder_path(), &autoencoder, loss)?;
        let encoder = autoencoder.into_encoder();
        save_encoder(&self.config.encoder_path(), &encoder)?;
        Ok(encoder)
    }

    /// Restores both pretraining checkpoints; the encoder checkpoint is the one refined.
    fn load_pretrained(&self, train: &Dataset) -> Result<DenseNetwork> {
        let autoencoder = load_autoencoder(&self.config.autoencoder_path())?;
        let encoder = load_encoder(&self.config.encoder_path())?;
        if encoder.input_dim() != autoencoder.encoder.input_dim()
            || encoder.embedding_dim() != autoencoder.encoder.embedding_dim()
        {
            return Err(DecError::shape(
                "encoder checkpoint vs. autoencoder",
                &[autoencoder.encoder.input_dim(), autoencoder.encoder.embedding_dim()],
                &[encoder.input_dim(), encoder.embedding_dim()],
            ));
        }
        log::info!(
            "Reconstruction loss of the loaded autoencoder on {} training samples: {:.6}",
            train.len(),
            autoencoder.reconstruction_loss(train.images.view())?
        );
        Ok(encoder)
    }

    fn n_clusters(&self, train: &Dataset) -> Result<usize> {
        match (self.config.n_clusters, train.n_classes()) {
            (Some(k), _) => Ok(k),
            (None, Some(k)) => {
                log::info!("Inferred {} clusters from the training labels", k);
                Ok(k)
            }
            (None, None) => Err(DecError::invalid(
                "n_clusters",
                "required when the training set is unlabeled",
            )),
        }
    }

    fn cluster_stage(
        &self,
        encoder: DenseNetwork,
        n_clusters: usize,
        train: &Dataset,
    ) -> Result<(DecModel<DenseNetwork>, TrainingReport)> {
        let clustering = ClusteringLayer::new(n_clusters, self.config.dec.alpha)?;
        let mut model = DecModel::new(encoder, clustering)?;

        let mut kmeans_config = self.config.kmeans.clone();
        kmeans_config.seed = kmeans_config.seed.or(Some(self.config.seed));
        let seed_labels = initialize_cluster_centers(&mut model, train.images.view(), &KMeans::new(kmeans_config))?;

        let trainer = DecTrainer::new(self.config.dec.clone());
        let mut optimizer = Adam::new_default(self.config.dec.learning_rate);
        let report = trainer.fit(
            &mut model,
            train.images.view(),
            train.labels.as_deref(),
            seed_labels,
            &mut optimizer,
        )?;

        save_dec(&self.config.dec_path(), &model, Some(&report))?;
        Ok((model, report))
    }
}

/// Predicts clusters for `inputs` and, when labels are known, scores them.
pub fn evaluate<E: Encoder>(
    model: &DecModel<E>,
    inputs: ArrayView2<f32>,
    labels: Option<&[usize]>,
) -> Result<Evaluation> {
    let q = model.predict(inputs)?;
    let p = target_distribution(q.view());
    let loss = kl_divergence(p.view(), q.view())?;
    let predictions = hard_labels(q.view());

    let metrics = match labels {
        Some(y_true) => {
            let metrics = ClusterMetrics::compute(y_true, &predictions)?;
            log::info!(
                "Acc = {:.5}, nmi = {:.5}, ari = {:.5} ; loss={:.10}",
                metrics.accuracy,
                metrics.nmi,
                metrics.ari,
                loss
            );
            let matrix = confusion_matrix(y_true, &predictions)?;
            log::info!("Confusion matrix (rows: true label, columns: cluster)\n{}", format_confusion_matrix(&matrix));
            Some(metrics)
        }
        None => {
            log::info!("loss={:.10}", loss);
            None
        }
    };

    Ok(Evaluation {
        predictions,
        loss,
        metrics,
    })
}
