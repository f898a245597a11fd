//! Sampled training curve for display.

use serde::{Deserialize, Serialize};

/// Epoch interval between recorded samples
pub const DEFAULT_SAMPLE_EVERY: usize = 10;

/// Multiplier turning MSE on normalized targets into the accuracy proxy.
///
/// The proxy is `clamp(1 - loss * 10, 0, 1)`. It is not a classification
/// accuracy, only a number a chart can show going up.
pub const ACCURACY_PROXY_SCALE: f64 = 10.0;

pub fn accuracy_proxy(loss: f64) -> f64 {
    if !loss.is_finite() {
        return 0.0;
    }
    (1.0 - loss * ACCURACY_PROXY_SCALE).clamp(0.0, 1.0)
}

/// Snapshot of the sampled curve as parallel arrays
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch: Vec<usize>,
    pub loss: Vec<f64>,
    pub accuracy_proxy: Vec<f64>,
    /// Validation loss at the same epochs, when a validation split was used
    #[serde(default)]
    pub validation_loss: Vec<f64>,
}

impl TrainingMetrics {
    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    pub fn final_accuracy(&self) -> Option<f64> {
        self.accuracy_proxy.last().copied()
    }
}

/// Collects every `sample_every`-th epoch of a training run
#[derive(Clone, Debug)]
pub struct MetricsRecorder {
    sample_every: usize,
    metrics: TrainingMetrics,
}

impl MetricsRecorder {
    pub fn new(sample_every: usize) -> Self {
        MetricsRecorder {
            sample_every: sample_every.max(1),
            metrics: TrainingMetrics::default(),
        }
    }

    /// Record `loss` for `epoch` if it falls on the sampling interval.
    ///
    /// Returns whether the sample was kept.
    pub fn record(&mut self, epoch: usize, loss: f64) -> bool {
        self.record_with_validation(epoch, loss, None)
    }

    pub fn record_with_validation(&mut self, epoch: usize, loss: f64, validation_loss: Option<f64>) -> bool {
        if epoch % self.sample_every != 0 {
            return false;
        }

        self.metrics.epoch.push(epoch);
        self.metrics.loss.push(loss);
        self.metrics.accuracy_proxy.push(accuracy_proxy(loss));
        if let Some(val) = validation_loss {
            self.metrics.validation_loss.push(val);
        }
        true
    }

    pub fn snapshot(&self) -> TrainingMetrics {
        self.metrics.clone()
    }

    pub fn clear(&mut self) {
        self.metrics = TrainingMetrics::default();
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_EVERY)
    }
}
