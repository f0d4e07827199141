//! Deep embedded clustering: an encoder's embeddings are softly assigned to learned
//! cluster centers and refined by self-training against a sharpened target distribution.

pub mod assignment;
pub mod autoencoder;
pub mod centroid;
pub mod checkpoint;
pub mod clustering_layer;
pub mod config;
pub mod dec;
pub mod distance;
pub mod encoder;
pub mod error;
pub mod inertia;
pub mod initialization;
pub mod initializer;
pub mod kmeans;
pub mod load;
pub mod logger;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod pipeline;
pub mod proto;
pub mod target;
pub mod trainer;

pub use clustering_layer::{hard_labels, kl_divergence, ClusteringLayer};
pub use dec::DecModel;
pub use encoder::{Encoder, Pretrain};
pub use error::{DecError, Result};
pub use initializer::initialize_cluster_centers;
pub use kmeans::{Clusterer, Clustering, KMeans};
pub use metrics::{adjusted_rand_index, cluster_accuracy, normalized_mutual_info, ClusterMetrics};
pub use target::target_distribution;
pub use trainer::{BatchCursor, DecTrainer, TrainingReport, TrainingState, TrainingStatus};
