//! # AQI Forecast
//!
//! Short-horizon air-quality forecasting: 24 hourly or 7 daily AQI points for a
//! location, produced by a small feed-forward network and kept plausible by a
//! constraint engine. When the model cannot answer, a synthetic generator
//! produces a series with the same shape and bounds.
//!
//! ## Core Components
//!
//! - **Features**: calendar, rush-hour and weather encoding normalized to `[0, 1]`
//! - **Network**: dense ReLU layers with dropout, He-normal initialization
//! - **Training**: mini-batch Adam on synthetic data, sampled loss curve
//! - **Constraints**: per-step change limits, jitter, AQI domain, confidence decay
//! - **Service**: upstream fetches, model lifecycle, fallback routing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aqi_forecast::{ForecastConfig, ForecastService};
//!
//! # async fn run() -> Result<(), aqi_forecast::ForecastError> {
//! let service = ForecastService::from_config(ForecastConfig::load()?)?;
//! service.init_models().await;
//!
//! for point in service.get_hourly_predictions(12.97, 77.59).await {
//!     println!("{} {} ({:.2})", point.timestamp, point.aqi, point.confidence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod utils;
pub mod layers;
pub mod models;
pub mod loss;
pub mod optimizers;
pub mod metrics;
pub mod training;
pub mod persistence;
pub mod horizon;
pub mod features;
pub mod synthetic;
pub mod constraints;
pub mod forecast;
pub mod fallback;
pub mod providers;
pub mod state;
pub mod report;
pub mod config;
pub mod error;
pub mod service;

// Re-export commonly used items
pub use config::ForecastConfig;
pub use constraints::{confidence, Constraints};
pub use error::{ForecastError, ForecastResult};
pub use fallback::FallbackGenerator;
pub use features::{encode, FeatureVector, WeatherCondition, WeatherSignal};
pub use forecast::{ForecastPoint, ForecastSource};
pub use horizon::Horizon;
pub use metrics::{MetricsRecorder, TrainingMetrics};
pub use models::feed_forward::FeedForwardNetwork;
pub use persistence::{FileModelStore, MemoryModelStore, ModelPersistence, ModelStore, PersistenceError, SavedModel};
pub use providers::{AqiProvider, Coordinates, CurrentAqi, ProviderError, WeatherProvider, WeatherReport};
pub use report::AqiCategory;
pub use service::{ForecastService, ModelInformation, ModelStatus};
pub use state::{FileScalarStore, MemoryScalarStore, ScalarStore};
pub use training::{train_horizon, TrainingConfig};
