use std::path::PathBuf;

use crate::network::Activation;

/// Hyper-parameters of the DEC refinement stage.
#[derive(Debug, Clone)]
pub struct DecConfig {
    /// Degrees of freedom of the student-t kernel.
    pub alpha: f32,
    pub batch_size: usize,
    pub max_iter: usize,
    /// Number of minibatches between two recomputations of the target distribution.
    pub update_interval: usize,
    /// Label drift below which training is considered converged.
    pub tol: f64,
    pub learning_rate: f32,
}

impl Default for DecConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            batch_size: 128,
            max_iter: 8000,
            update_interval: 140,
            tol: 0.001,
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansConfig {
    pub n_init: usize,
    pub max_iter: usize,
    /// Relative centroid shift (frobenius norm) below which a run stops.
    pub tol: f64,
    pub triangle_inequality: bool,
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_init: 20,
            max_iter: 300,
            tol: 1e-4,
            triangle_inequality: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PretrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub hidden_dims: Vec<usize>,
    pub embedding_dim: usize,
    pub embedding_activation: Activation,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            batch_size: 128,
            learning_rate: 0.001,
            hidden_dims: vec![500, 500, 2000],
            embedding_dim: 10,
            embedding_activation: Activation::Relu,
        }
    }
}

/// Where artifacts live and which stages run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub train_prefix: String,
    pub test_prefix: Option<String>,
    pub model_dir: PathBuf,
    /// Train the autoencoder from scratch instead of loading `autoencoder.bin`/`encoder.bin`.
    pub pretrain_autoencoder: bool,
    /// Run DEC refinement instead of loading `dec_final.bin`.
    pub train_cluster: bool,
    /// Number of clusters; inferred from the distinct training labels when absent.
    pub n_clusters: Option<usize>,
    pub export_embeddings: bool,
    pub seed: u64,
    pub dec: DecConfig,
    pub kmeans: KMeansConfig,
    pub pretrain: PretrainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data_in"),
            train_prefix: "train".to_string(),
            test_prefix: Some("test".to_string()),
            model_dir: PathBuf::from("./models"),
            pretrain_autoencoder: true,
            train_cluster: true,
            n_clusters: None,
            export_embeddings: false,
            seed: 0,
            dec: DecConfig::default(),
            kmeans: KMeansConfig::default(),
            pretrain: PretrainConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn autoencoder_path(&self) -> PathBuf {
        self.model_dir.join("autoencoder.bin")
    }

    pub fn encoder_path(&self) -> PathBuf {
        self.model_dir.join("encoder.bin")
    }

    pub fn dec_path(&self) -> PathBuf {
        self.model_dir.join("dec_final.bin")
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.model_dir.join("test_embeddings.bin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let dec = DecConfig::default();
        assert_eq!(dec.batch_size, 128);
        assert_eq!(dec.max_iter, 8000);
        assert_eq!(dec.update_interval, 140);
        assert_eq!(dec.tol, 0.001);
        assert_eq!(KMeansConfig::default().n_init, 20);
        assert_eq!(PretrainConfig::default().embedding_dim, 10);
    }

    #[test]
    fn checkpoint_paths_live_in_model_dir() {
        let config = PipelineConfig {
            model_dir: PathBuf::from("/tmp/dec"),
            ..Default::default()
        };
        assert_eq!(config.dec_path(), PathBuf::from("/tmp/dec/dec_final.bin"));
        assert_eq!(config.encoder_path(), PathBuf::from("/tmp/dec/encoder.bin"));
    }
}
