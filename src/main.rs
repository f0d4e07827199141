use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use dec::config::{DecConfig, KMeansConfig, PipelineConfig, PretrainConfig};
use dec::logger::init_logger;
use dec::network::Activation;
use dec::pipeline::Pipeline;

/// Deep embedded clustering of prost-encoded image datasets.
#[derive(Parser)]
#[command(name = "dec", about = "Pretrain an autoencoder and refine its embeddings into clusters")]
struct Args {
    /// Folder holding `<prefix>_batch_*.bin` dataset files.
    #[arg(long, default_value = "./data_in")]
    data_dir: PathBuf,

    #[arg(long, default_value = "train")]
    train_prefix: String,

    /// Evaluate on this dataset instead of the training set.
    #[arg(long, default_value = "test")]
    test_prefix: String,

    #[arg(long)]
    no_test: bool,

    /// Where checkpoints and exported embeddings are written.
    #[arg(long, default_value = "./models")]
    model_dir: PathBuf,

    /// Load `encoder.bin` instead of pretraining.
    #[arg(long)]
    skip_pretrain: bool,

    /// Load `dec_final.bin` instead of training.
    #[arg(long)]
    skip_cluster: bool,

    /// Defaults to the number of distinct training labels.
    #[arg(long)]
    n_clusters: Option<usize>,

    #[arg(long)]
    export_embeddings: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    alpha: f32,

    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    #[arg(long, default_value_t = 8000)]
    max_iter: usize,

    #[arg(long, default_value_t = 140)]
    update_interval: usize,

    #[arg(long, default_value_t = 0.001)]
    tol: f64,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    #[arg(long, default_value_t = 200)]
    pretrain_epochs: usize,

    /// Comma separated hidden layer widths of the encoder.
    #[arg(long, value_delimiter = ',', default_value = "500,500,2000")]
    hidden_dims: Vec<usize>,

    #[arg(long, default_value_t = 10)]
    embedding_dim: usize,

    /// Use an identity activation on the embedding layer instead of ReLU.
    #[arg(long)]
    linear_embedding: bool,

    #[arg(long, default_value_t = 20)]
    kmeans_n_init: usize,

    /// Disable triangle-inequality pruning in k-means.
    #[arg(long)]
    no_triangle_inequality: bool,
}

impl From<Args> for PipelineConfig {
    fn from(args: Args) -> Self {
        PipelineConfig {
            data_dir: args.data_dir,
            train_prefix: args.train_prefix,
            test_prefix: if args.no_test { None } else { Some(args.test_prefix) },
            model_dir: args.model_dir,
            pretrain_autoencoder: !args.skip_pretrain,
            train_cluster: !args.skip_cluster,
            n_clusters: args.n_clusters,
            export_embeddings: args.export_embeddings,
            seed: args.seed,
            dec: DecConfig {
                alpha: args.alpha,
                batch_size: args.batch_size,
                max_iter: args.max_iter,
                update_interval: args.update_interval,
                tol: args.tol,
                learning_rate: args.learning_rate,
            },
            kmeans: KMeansConfig {
                n_init: args.kmeans_n_init,
                triangle_inequality: !args.no_triangle_inequality,
                seed: Some(args.seed),
                ..Default::default()
            },
            pretrain: PretrainConfig {
                epochs: args.pretrain_epochs,
                batch_size: args.batch_size,
                hidden_dims: args.hidden_dims,
                embedding_dim: args.embedding_dim,
                embedding_activation: if args.linear_embedding {
                    Activation::Identity
                } else {
                    Activation::Relu
                },
                ..Default::default()
            },
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logger()?;
    let config = PipelineConfig::from(Args::parse());
    log::info!("Starting DEC run with {:?}", config);

    let outcome = Pipeline::new(config).run()?;
    if let Some(report) = &outcome.training {
        log::info!(
            "Training finished with {:?} after {} iterations (last delta {:?})",
            report.status,
            report.iterations,
            report.final_delta
        );
    }
    if let Some(metrics) = outcome.evaluation.metrics {
        log::info!(
            "Final: acc = {:.5}, nmi = {:.5}, ari = {:.5}",
            metrics.accuracy,
            metrics.nmi,
            metrics.ari
        );
    }
    Ok(())
}
