use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};

use crate::clustering_layer::hard_labels;
use crate::config::DecConfig;
use crate::dec::DecModel;
use crate::encoder::Encoder;
use crate::error::{DecError, Result};
use crate::metrics::ClusterMetrics;
use crate::optimizer::Optimizer;
use crate::target::target_distribution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStatus {
    Running,
    /// Label drift fell below the tolerance.
    Converged,
    MaxIterReached,
}

/// Cycles through a fixed sample ordering in contiguous slices of `batch_size`.
///
/// The last slice of a sweep may be short; the cursor wraps to 0 once the next slice would
/// start at or past the end. The ordering is never reshuffled.
#[derive(Debug, Clone)]
pub struct BatchCursor {
    len: usize,
    batch_size: usize,
    index: usize,
}

impl BatchCursor {
    pub fn new(len: usize, batch_size: usize) -> Result<Self> {
        if len == 0 {
            return Err(DecError::EmptyInput("training samples"));
        }
        if batch_size == 0 {
            return Err(DecError::invalid("batch_size", "must be at least 1"));
        }
        Ok(Self {
            len,
            batch_size,
            index: 0,
        })
    }

    pub fn next_range(&mut self) -> Range<usize> {
        let start = self.index * self.batch_size;
        let end = (start + self.batch_size).min(self.len);
        self.index = if end < self.len { self.index + 1 } else { 0 };
        start..end
    }
}

/// Fraction of samples whose hard label differs between two assignments.
pub fn label_drift(previous: &[usize], current: &[usize]) -> Result<f64> {
    if previous.len() != current.len() {
        return Err(DecError::shape("label drift", &[previous.len()], &[current.len()]));
    }
    if current.is_empty() {
        return Err(DecError::EmptyInput("label drift"));
    }
    let changed = previous.iter().zip(current.iter()).filter(|(a, b)| a != b).count();
    Ok(changed as f64 / current.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub delta: f64,
    pub status: TrainingStatus,
}

/// Everything the loop mutates between iterations.
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub iteration: usize,
    pub last_loss: f32,
    pub last_delta: Option<f64>,
    previous_labels: Vec<usize>,
    cursor: BatchCursor,
    status: TrainingStatus,
    update_interval: usize,
    max_iter: usize,
    tol: f64,
}

impl TrainingState {
    /// `seed_labels` are the clusterer's labels, the baseline of the first drift measurement.
    pub fn new(seed_labels: Vec<usize>, config: &DecConfig) -> Result<Self> {
        if config.update_interval == 0 {
            return Err(DecError::invalid("update_interval", "must be at least 1"));
        }
        let cursor = BatchCursor::new(seed_labels.len(), config.batch_size)?;
        let status = if config.max_iter == 0 {
            TrainingStatus::MaxIterReached
        } else {
            TrainingStatus::Running
        };
        Ok(Self {
            iteration: 0,
            last_loss: 0.0,
            last_delta: None,
            previous_labels: seed_labels,
            cursor,
            status,
            update_interval: config.update_interval,
            max_iter: config.max_iter,
            tol: config.tol,
        })
    }

    pub fn status(&self) -> TrainingStatus {
        self.status
    }

    pub fn previous_labels(&self) -> &[usize] {
        &self.previous_labels
    }

    pub fn is_evaluation_tick(&self) -> bool {
        self.iteration % self.update_interval == 0
    }

    /// Measures drift against the previous tick, stores the new labels and decides
    /// whether training has converged. Iteration 0 never converges.
    pub fn record_tick(&mut self, labels: Vec<usize>) -> Result<TickOutcome> {
        let delta = label_drift(&self.previous_labels, &labels)?;
        self.previous_labels = labels;
        self.last_delta = Some(delta);
        if self.iteration > 0 && delta < self.tol {
            self.status = TrainingStatus::Converged;
        }
        Ok(TickOutcome {
            delta,
            status: self.status,
        })
    }

    pub fn next_batch(&mut self) -> Range<usize> {
        self.cursor.next_range()
    }

    /// Closes an iteration after its gradient step.
    pub fn advance(&mut self, loss: f32) {
        self.last_loss = loss;
        self.iteration += 1;
        if self.status == TrainingStatus::Running && self.iteration >= self.max_iter {
            self.status = TrainingStatus::MaxIterReached;
        }
    }

    pub fn finish(self) -> TrainingReport {
        TrainingReport {
            status: self.status,
            iterations: self.iteration,
            final_delta: self.last_delta,
            final_loss: self.last_loss,
            labels: self.previous_labels,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub status: TrainingStatus,
    pub iterations: usize,
    pub final_delta: Option<f64>,
    pub final_loss: f32,
    /// Hard labels of the last evaluation tick.
    pub labels: Vec<usize>,
}

/// Self-training schedule: every `update_interval` minibatches the target distribution is
/// recomputed from a full pass, in between the model is fitted to the held target.
#[derive(Debug, Clone, Default)]
pub struct DecTrainer {
    pub config: DecConfig,
}

impl DecTrainer {
    pub fn new(config: DecConfig) -> Self {
        Self { config }
    }

    pub fn fit<E: Encoder, O: Optimizer>(
        &self,
        model: &mut DecModel<E>,
        inputs: ArrayView2<f32>,
        labels: Option<&[usize]>,
        seed_labels: Vec<usize>,
        optimizer: &mut O,
    ) -> Result<TrainingReport> {
        if seed_labels.len() != inputs.nrows() {
            return Err(DecError::shape("seed labels", &[inputs.nrows()], &[seed_labels.len()]));
        }

        let mut state = TrainingState::new(seed_labels, &self.config)?;
        let mut target = Array2::<f32>::zeros((0, model.n_clusters()));

        while state.status() == TrainingStatus::Running {
            if state.is_evaluation_tick() {
                let q = model.predict(inputs)?;
                target = target_distribution(q.view());
                let y_pred = hard_labels(q.view());

                if let Some(y_true) = labels {
                    report_tick(state.iteration, y_true, &y_pred, state.last_loss);
                }

                let outcome = state.record_tick(y_pred)?;
                log::debug!("Iter {}: delta_label = {:.5}", state.iteration, outcome.delta);
                if outcome.status == TrainingStatus::Converged {
                    log::info!("delta_label {:.5} < tol {}", outcome.delta, self.config.tol);
                    log::info!("Reached tolerance threshold. Stopping training.");
                    break;
                }
            }

            let batch = state.next_batch();
            let loss = model.train_on_batch(
                inputs.slice(s![batch.clone(), ..]),
                target.slice(s![batch, ..]),
                optimizer,
            )?;
            state.advance(loss);
        }

        if state.status() == TrainingStatus::MaxIterReached {
            log::info!(
                "Stopped after {} iterations without label drift falling below tol {}",
                state.iteration,
                self.config.tol
            );
        }

        Ok(state.finish())
    }
}

/// Best-effort monitoring line; a metric failure only suppresses the line.
fn report_tick(iteration: usize, y_true: &[usize], y_pred: &[usize], loss: f32) {
    match ClusterMetrics::compute(y_true, y_pred) {
        Ok(metrics) => log::info!(
            "Iter {}: acc = {:.5}, nmi = {:.5}, ari = {:.5} ; loss={:.10}",
            iteration,
            metrics.accuracy,
            metrics.nmi,
            metrics.ari,
            loss
        ),
        Err(err) => log::debug!("Skipping metrics at iteration {}: {}", iteration, err),
    }
}
