use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use ndarray::{Array2, ArrayView2, Axis};

use crate::checkpoint::{read_message, write_message};
use crate::error::{DecError, Result};
use crate::network::{matrix_from_proto, matrix_to_proto};
use crate::proto::{DatasetProto, EmbeddingsProto};

/// Flattened samples plus optional ground-truth labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub images: Array2<f32>,
    pub labels: Option<Vec<usize>>,
}

impl Dataset {
    pub fn new(images: Array2<f32>, labels: Option<Vec<usize>>) -> Result<Self> {
        if let Some(labels) = &labels {
            if labels.len() != images.nrows() {
                return Err(DecError::shape("dataset labels", &[images.nrows()], &[labels.len()]));
            }
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.images.nrows() == 0
    }

    /// Number of distinct ground-truth labels.
    pub fn n_classes(&self) -> Option<usize> {
        self.labels.as_ref().map(|labels| labels.iter().unique().count())
    }

    pub fn to_proto(&self) -> DatasetProto {
        DatasetProto {
            images: Some(matrix_to_proto(&self.images)),
            labels: self
                .labels
                .as_ref()
                .map(|labels| labels.iter().map(|&l| l as u32).collect())
                .unwrap_or_default(),
        }
    }

    pub fn from_proto(proto: &DatasetProto) -> Result<Self> {
        let images = proto.images.as_ref().ok_or(DecError::EmptyInput("dataset images"))?;
        let images = matrix_from_proto(images)?;
        let labels = if proto.labels.is_empty() {
            None
        } else {
            Some(proto.labels.iter().map(|&l| l as usize).collect())
        };
        Self::new(images, labels)
    }
}

pub fn save_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    write_message(path, &dataset.to_proto())
}

/// Reads every `<prefix>_batch_*.bin` file of a folder, in file-name order, into one dataset.
pub struct DatasetLoader {
    pub folder_path: PathBuf,
    pub filenames: Vec<String>,
    pub dataset: Dataset,
}

impl DatasetLoader {
    pub fn new(folder_path: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let folder_path = folder_path.as_ref().to_path_buf();
        let batch_prefix = format!("{}_batch_", prefix);

        let filenames: Vec<String> = fs::read_dir(&folder_path)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&batch_prefix) && name.ends_with(".bin"))
            .sorted()
            .collect();
        if filenames.is_empty() {
            return Err(DecError::EmptyInput("dataset batch files"));
        }

        let mut batches = Vec::with_capacity(filenames.len());
        for (index, filename) in filenames.iter().enumerate() {
            let proto: DatasetProto = read_message(&folder_path.join(filename))?;
            let batch = Dataset::from_proto(&proto)?;
            log::info!("Loaded {} batch #{} ({} samples)", prefix, index + 1, batch.len());
            batches.push(batch);
        }
        let dataset = concatenate(batches)?;
        log::info!(
            "Loaded {} dataset: {} samples of dimension {}",
            prefix,
            dataset.len(),
            dataset.images.ncols()
        );

        Ok(Self {
            folder_path,
            filenames,
            dataset,
        })
    }
}

fn concatenate(batches: Vec<Dataset>) -> Result<Dataset> {
    let views: Vec<ArrayView2<f32>> = batches.iter().map(|b| b.images.view()).collect();
    let images = ndarray::concatenate(Axis(0), &views).map_err(|_| {
        DecError::shape(
            "dataset batches",
            &[views[0].ncols()],
            &views.iter().map(|v| v.ncols()).unique().collect_vec(),
        )
    })?;

    // Labels are kept only when every batch carries them.
    let labels = if batches.iter().all(|b| b.labels.is_some()) {
        Some(batches.iter().flat_map(|b| b.labels.iter().flatten().copied()).collect())
    } else {
        if batches.iter().any(|b| b.labels.is_some()) {
            log::warn!("Some dataset batches are unlabeled, dropping labels");
        }
        None
    };
    Dataset::new(images, labels)
}

pub fn save_embeddings(
    path: &Path,
    embeddings: &Array2<f32>,
    labels: Option<&[usize]>,
    predictions: &[usize],
) -> Result<()> {
    let message = EmbeddingsProto {
        embeddings: Some(matrix_to_proto(embeddings)),
        labels: labels
            .map(|labels| labels.iter().map(|&l| l as u32).collect())
            .unwrap_or_default(),
        predictions: predictions.iter().map(|&p| p as u32).collect(),
    };
    write_message(path, &message)?;
    log::info!("Saved {} embeddings to {}", embeddings.nrows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dec-load-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn concatenates_batches_in_name_order() {
        let dir = scratch("order");
        let first = Dataset::new(array![[1.0, 1.0], [2.0, 2.0]], Some(vec![0, 1])).unwrap();
        let second = Dataset::new(array![[3.0, 3.0]], Some(vec![2])).unwrap();
        save_dataset(&dir.join("train_batch_1.bin"), &second).unwrap();
        save_dataset(&dir.join("train_batch_0.bin"), &first).unwrap();
        save_dataset(&dir.join("test_batch_0.bin"), &second).unwrap();

        let loader = DatasetLoader::new(&dir, "train").unwrap();
        assert_eq!(loader.filenames, vec!["train_batch_0.bin", "train_batch_1.bin"]);
        assert_eq!(loader.dataset.images, array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
        assert_eq!(loader.dataset.labels, Some(vec![0, 1, 2]));
        assert_eq!(loader.dataset.n_classes(), Some(3));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unlabeled_batch_drops_labels() {
        let dir = scratch("unlabeled");
        save_dataset(&dir.join("x_batch_0.bin"), &Dataset::new(array![[1.0]], Some(vec![4])).unwrap()).unwrap();
        save_dataset(&dir.join("x_batch_1.bin"), &Dataset::new(array![[2.0]], None).unwrap()).unwrap();
        let loader = DatasetLoader::new(&dir, "x").unwrap();
        assert_eq!(loader.dataset.len(), 2);
        assert!(loader.dataset.labels.is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn folder_without_batches_is_empty_input() {
        let dir = scratch("empty");
        assert!(matches!(DatasetLoader::new(&dir, "train"), Err(DecError::EmptyInput(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mismatched_label_count() {
        let err = Dataset::new(array![[1.0], [2.0]], Some(vec![0])).unwrap_err();
        assert!(matches!(err, DecError::ShapeMismatch { .. }));
    }
}
