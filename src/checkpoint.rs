use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::Utc;
use prost::Message;
use prost_types::Timestamp;

use crate::autoencoder::DenseAutoencoder;
use crate::clustering_layer::ClusteringLayer;
use crate::dec::DecModel;
use crate::error::{DecError, Result};
use crate::network::{matrix_from_proto, matrix_to_proto, DenseNetwork};
use crate::proto::{AutoencoderCheckpoint, DecCheckpoint, EncoderCheckpoint};
use crate::trainer::{TrainingReport, TrainingStatus};

fn now() -> Timestamp {
    let now = Utc::now();
    Timestamp {
        seconds: now.timestamp(),
        nanos: now.timestamp_subsec_nanos() as i32,
    }
}

pub(crate) fn write_message<M: Message>(path: &Path, message: &M) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

pub(crate) fn read_message<M: Message + Default>(path: &Path) -> Result<M> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(M::decode(&*buf)?)
}

pub fn save_autoencoder(path: &Path, autoencoder: &DenseAutoencoder, reconstruction_loss: f32) -> Result<()> {
    let checkpoint = AutoencoderCheckpoint {
        encoder: Some(autoencoder.encoder.to_proto()),
        decoder: Some(autoencoder.decoder.to_proto()),
        reconstruction_loss,
        created_at: Some(now()),
    };
    write_message(path, &checkpoint)?;
    log::info!("Saved autoencoder to {}", path.display());
    Ok(())
}

pub fn load_autoencoder(path: &Path) -> Result<DenseAutoencoder> {
    let checkpoint: AutoencoderCheckpoint = read_message(path)?;
    let encoder = checkpoint.encoder.as_ref().ok_or(DecError::EmptyInput("autoencoder checkpoint encoder"))?;
    let decoder = checkpoint.decoder.as_ref().ok_or(DecError::EmptyInput("autoencoder checkpoint decoder"))?;
    let autoencoder = DenseAutoencoder::from_parts(DenseNetwork::from_proto(encoder)?, DenseNetwork::from_proto(decoder)?)?;
    log::info!(
        "Loaded autoencoder from {} (reconstruction loss {:.6})",
        path.display(),
        checkpoint.reconstruction_loss
    );
    Ok(autoencoder)
}

pub fn save_encoder(path: &Path, encoder: &DenseNetwork) -> Result<()> {
    let checkpoint = EncoderCheckpoint {
        encoder: Some(encoder.to_proto()),
        created_at: Some(now()),
    };
    write_message(path, &checkpoint)?;
    log::info!("Saved encoder to {}", path.display());
    Ok(())
}

pub fn load_encoder(path: &Path) -> Result<DenseNetwork> {
    let checkpoint: EncoderCheckpoint = read_message(path)?;
    let encoder = checkpoint.encoder.as_ref().ok_or(DecError::EmptyInput("encoder checkpoint"))?;
    DenseNetwork::from_proto(encoder)
}

/// Stores the refined encoder and cluster centers together with how training ended.
pub fn save_dec(path: &Path, model: &DecModel<DenseNetwork>, report: Option<&TrainingReport>) -> Result<()> {
    let centers = model
        .clustering
        .centers()
        .ok_or(DecError::NotInitialized("cluster centers"))?;
    let checkpoint = DecCheckpoint {
        encoder: Some(model.encoder.to_proto()),
        alpha: model.clustering.alpha(),
        centers: Some(matrix_to_proto(centers)),
        iterations: report.map(|r| r.iterations as u64).unwrap_or(0),
        converged: report.map(|r| r.status == TrainingStatus::Converged).unwrap_or(false),
        created_at: Some(now()),
    };
    write_message(path, &checkpoint)?;
    log::info!("Saved DEC model to {}", path.display());
    Ok(())
}

pub fn load_dec(path: &Path) -> Result<DecModel<DenseNetwork>> {
    let checkpoint: DecCheckpoint = read_message(path)?;
    let encoder = checkpoint.encoder.as_ref().ok_or(DecError::EmptyInput("DEC checkpoint encoder"))?;
    let centers = checkpoint.centers.as_ref().ok_or(DecError::EmptyInput("DEC checkpoint centers"))?;
    let centers = matrix_from_proto(centers)?;

    let mut clustering = ClusteringLayer::new(centers.nrows(), checkpoint.alpha)?;
    clustering.set_centers(centers)?;
    let model = DecModel::new(DenseNetwork::from_proto(encoder)?, clustering)?;
    log::info!(
        "Loaded DEC model from {} ({} iterations, converged: {})",
        path.display(),
        checkpoint.iterations,
        checkpoint.converged
    );
    Ok(model)
}
