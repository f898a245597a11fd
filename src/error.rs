//! Error types for the forecasting pipeline.
//!
//! None of these escape the public forecast calls; they drive the fallback path
//! and show up in logs.

use thiserror::Error;

use crate::horizon::Horizon;
use crate::persistence::PersistenceError;
use crate::providers::ProviderError;

/// Errors raised while initializing or running the forecast model
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("training failed for {horizon} model: {message}")]
    Training { horizon: Horizon, message: String },

    #[error("prediction failed at {horizon} step {step}: {message}")]
    Prediction {
        horizon: Horizon,
        step: usize,
        message: String,
    },

    #[error("feature vector has {actual} values, {horizon} model expects {expected}")]
    FeatureShape {
        horizon: Horizon,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type ForecastResult<T> = Result<T, ForecastError>;
