use ndarray::ArrayView2;

use crate::dec::DecModel;
use crate::encoder::Encoder;
use crate::error::{DecError, Result};
use crate::kmeans::Clusterer;

/// Seeds the cluster centers of `model` by clustering the embeddings of `inputs`.
///
/// Returns the hard labels found by the clusterer; they are the baseline for the first
/// label-drift measurement of the training loop.
pub fn initialize_cluster_centers<E: Encoder, C: Clusterer>(
    model: &mut DecModel<E>,
    inputs: ArrayView2<f32>,
    clusterer: &C,
) -> Result<Vec<usize>> {
    let embeddings = model.embed(inputs)?;
    let clustering = clusterer.fit_predict(embeddings.view(), model.n_clusters())?;
    if clustering.centroids.dim() != (model.n_clusters(), embeddings.ncols()) {
        return Err(DecError::shape(
            "clusterer centroids",
            &[model.n_clusters(), embeddings.ncols()],
            &[clustering.centroids.nrows(), clustering.centroids.ncols()],
        ));
    }
    if clustering.labels.len() != inputs.nrows() {
        return Err(DecError::shape("clusterer labels", &[inputs.nrows()], &[clustering.labels.len()]));
    }

    log::info!(
        "Initialized {} cluster centers from {} embeddings (inertia {:.4})",
        model.n_clusters(),
        embeddings.nrows(),
        clustering.inertia
    );
    model.clustering.set_centers(clustering.centroids)?;
    Ok(clustering.labels)
}
