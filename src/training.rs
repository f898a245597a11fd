use chrono::{DateTime, FixedOffset};
use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{ForecastError, ForecastResult};
use crate::horizon::Horizon;
use crate::layers::linear::LinearGradients;
use crate::loss::{LossFunction, MSELoss};
use crate::metrics::{MetricsRecorder, TrainingMetrics, DEFAULT_SAMPLE_EVERY};
use crate::models::feed_forward::{FeedForwardGradients, FeedForwardNetwork};
use crate::optimizers::{Adam, Optimizer};
use crate::synthetic::{self, Dataset};

/// Configuration for training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    /// Fraction of the synthetic set held out for validation
    pub validation_split: f64,
    pub shuffle: bool,
    pub clip_gradient: Option<f64>,
    /// Record metrics every this many epochs
    pub sample_every: usize,
    pub hourly_samples: usize,
    pub weekly_samples: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 100,
            batch_size: 16,
            learning_rate: 0.01,
            dropout: 0.2,
            validation_split: 0.2,
            shuffle: true,
            clip_gradient: Some(5.0),
            sample_every: DEFAULT_SAMPLE_EVERY,
            hourly_samples: 150,
            weekly_samples: 100,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        if self.epochs == 0 {
            return Err(ForecastError::InvalidConfig("training.epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidConfig("training.batch_size must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "training.learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidConfig("training.dropout must be in [0, 1)".into()));
        }
        if !(0.0..=0.5).contains(&self.validation_split) {
            return Err(ForecastError::InvalidConfig("training.validation_split must be in [0, 0.5]".into()));
        }
        if self.hourly_samples < self.batch_size || self.weekly_samples < self.batch_size {
            return Err(ForecastError::InvalidConfig(
                "synthetic sample counts must be at least one batch".into(),
            ));
        }
        Ok(())
    }

    pub fn samples_for(&self, horizon: Horizon) -> usize {
        match horizon {
            Horizon::Hourly => self.hourly_samples,
            Horizon::Weekly => self.weekly_samples,
        }
    }
}

/// Mini-batch trainer for the feed-forward regressor with configurable loss and optimizer
pub struct Trainer<L: LossFunction, O: Optimizer> {
    pub network: FeedForwardNetwork,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    recorder: MetricsRecorder,
}

impl<L: LossFunction, O: Optimizer> Trainer<L, O> {
    pub fn new(network: FeedForwardNetwork, loss_function: L, optimizer: O) -> Self {
        let config = TrainingConfig::default();
        Trainer {
            network,
            loss_function,
            optimizer,
            recorder: MetricsRecorder::new(config.sample_every),
            config,
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.recorder = MetricsRecorder::new(config.sample_every);
        self.config = config;
        self
    }

    /// One optimizer step on a (features, batch) slice; returns the batch loss
    pub fn train_batch<R: Rng + ?Sized>(&mut self, inputs: &Array2<f64>, targets: &Array2<f64>, rng: &mut R) -> f64 {
        let (outputs, cache) = self.network.forward_with_cache(inputs, rng);
        let loss = self.loss_function.compute_loss(&outputs, targets);
        let grad = self.loss_function.compute_gradient(&outputs, targets);

        let mut gradients = self.network.backward(&grad, &cache);

        if let Some(clip_value) = self.config.clip_gradient {
            clip_gradients(&mut gradients, clip_value);
        }

        self.network.update_parameters(&gradients, &mut self.optimizer);
        loss
    }

    /// Train for the configured number of epochs
    ///
    /// Fails as soon as an epoch produces a non-finite loss, leaving the
    /// caller to discard the network.
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        train_data: &Dataset,
        validation_data: Option<&Dataset>,
        rng: &mut R,
    ) -> ForecastResult<TrainingMetrics> {
        let horizon = train_data.horizon;
        if train_data.is_empty() {
            return Err(ForecastError::Training {
                horizon,
                message: "empty training set".into(),
            });
        }

        info!(%horizon, samples = train_data.len(), epochs = self.config.epochs, "starting training");
        let started = Instant::now();
        self.recorder.clear();
        self.network.train();

        let batch_size = self.config.batch_size.max(1);
        let mut indices: Vec<usize> = (0..train_data.len()).collect();

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                indices.shuffle(rng);
            }

            let mut epoch_loss = 0.0;
            for batch in indices.chunks(batch_size) {
                let (inputs, targets) = train_data.select(batch);
                let loss = self.train_batch(&inputs, &targets, rng);
                epoch_loss += loss * batch.len() as f64;
            }
            epoch_loss /= train_data.len() as f64;

            if !epoch_loss.is_finite() {
                self.network.eval();
                return Err(ForecastError::Training {
                    horizon,
                    message: format!("loss diverged at epoch {}", epoch),
                });
            }

            let validation_loss = validation_data.map(|val| self.evaluate(val));
            if self.recorder.record_with_validation(epoch, epoch_loss, validation_loss) {
                match validation_loss {
                    Some(val_loss) => debug!(%horizon, epoch, loss = epoch_loss, val_loss, "epoch"),
                    None => debug!(%horizon, epoch, loss = epoch_loss, "epoch"),
                }
            }
        }

        self.network.eval();
        let metrics = self.recorder.snapshot();
        info!(
            %horizon,
            final_loss = metrics.final_loss().unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "training completed"
        );
        Ok(metrics)
    }

    /// Mean loss over a dataset, using the inference path
    pub fn evaluate(&self, data: &Dataset) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let outputs = self.network.predict(&data.features);
        self.loss_function.compute_loss(&outputs, &data.targets)
    }

    pub fn metrics(&self) -> TrainingMetrics {
        self.recorder.snapshot()
    }

    pub fn into_network(self) -> FeedForwardNetwork {
        self.network
    }
}

/// Create a trainer with Adam and MSE loss
pub fn create_basic_trainer(network: FeedForwardNetwork, learning_rate: f64) -> Trainer<MSELoss, Adam> {
    Trainer::new(network, MSELoss, Adam::new(learning_rate))
}

/// A freshly trained network with what it was trained on
#[derive(Clone, Debug)]
pub struct TrainedModel {
    pub network: FeedForwardNetwork,
    pub metrics: TrainingMetrics,
    pub training_samples: usize,
}

/// Build the synthetic set for `horizon`, hold out the validation split and
/// train a fresh network on the rest
///
/// CPU-bound; async callers should run it on a blocking thread.
pub fn train_horizon<R: Rng + ?Sized>(
    horizon: Horizon,
    config: &TrainingConfig,
    reference: DateTime<FixedOffset>,
    rng: &mut R,
) -> ForecastResult<TrainedModel> {
    config.validate()?;

    let dataset = synthetic::generate(horizon, reference, config.samples_for(horizon), rng);
    let (train_data, validation_data) = dataset.split(config.validation_split, rng);

    let network = FeedForwardNetwork::for_horizon(horizon, config.dropout, rng);
    let mut trainer = create_basic_trainer(network, config.learning_rate).with_config(config.clone());
    let metrics = trainer.train(&train_data, validation_data.as_ref(), rng)?;

    let network = trainer.into_network();
    if !network.is_finite() {
        return Err(ForecastError::Training {
            horizon,
            message: "trained weights are not finite".into(),
        });
    }

    Ok(TrainedModel {
        network,
        metrics,
        training_samples: train_data.len(),
    })
}

fn clip_gradients(gradients: &mut FeedForwardGradients, max_norm: f64) {
    for layer in [&mut gradients.hidden1, &mut gradients.hidden2, &mut gradients.output] {
        clip_layer(layer, max_norm);
    }
}

fn clip_layer(gradients: &mut LinearGradients, max_norm: f64) {
    clip_gradient_matrix(&mut gradients.weight, max_norm);
    clip_gradient_matrix(&mut gradients.bias, max_norm);
}

/// Rescale a gradient matrix whose L2 norm exceeds `max_norm`
fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}
