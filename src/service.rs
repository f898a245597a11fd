//! The forecast orchestrator.
//!
//! `ForecastService` is built once and shared behind an `Arc`. Every public
//! forecast call returns a full, well-formed series: upstream failures fall
//! back to defaults, and model failures fall back to the synthetic generator.

use chrono::{DateTime, FixedOffset, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ForecastConfig;
use crate::constraints::confidence;
use crate::error::{ForecastError, ForecastResult};
use crate::fallback::{perturb_seed, FallbackGenerator};
use crate::features::{denormalize_aqi, encode, FeatureVector, WeatherCondition};
use crate::forecast::{feature_importance, pollutant_components, ForecastPoint, ForecastSource};
use crate::horizon::Horizon;
use crate::metrics::TrainingMetrics;
use crate::models::feed_forward::FeedForwardNetwork;
use crate::persistence::{
    model_key, FileModelStore, MemoryModelStore, ModelMetadata, ModelPersistence, ModelStore,
};
use crate::providers::{
    AqiProvider, Coordinates, HttpAqiProvider, OpenWeatherProvider, ProviderError, WeatherProvider,
};
use crate::report::{self, ReportError};
use crate::state::{FileScalarStore, MemoryScalarStore, ScalarStore, LAST_AQI_KEY};
use crate::training::train_horizon;

/// Display name of the forecasting model
pub const MODEL_NAME: &str = "AirQualNet";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Loading,
    Ready,
    Error,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Training run of the hourly model; `training_metrics_for` covers the weekly one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub epochs: usize,
    pub data_points: usize,
    pub final_loss: Option<f64>,
}

/// Descriptive metadata about the models currently serving forecasts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInformation {
    pub status: ModelStatus,
    pub name: String,
    pub model_type: String,
    pub features: Vec<String>,
    /// Accuracy proxy of the hourly model at the end of training
    pub accuracy: Option<f64>,
    pub training: TrainingSummary,
    pub architecture: Vec<String>,
}

struct HorizonModel {
    network: FeedForwardNetwork,
    metadata: ModelMetadata,
}

struct LoadedModels {
    hourly: HorizonModel,
    weekly: HorizonModel,
}

impl LoadedModels {
    fn get(&self, horizon: Horizon) -> &HorizonModel {
        match horizon {
            Horizon::Hourly => &self.hourly,
            Horizon::Weekly => &self.weekly,
        }
    }
}

/// Assembles a `ForecastService`; anything not set is built from the config
pub struct ForecastServiceBuilder {
    config: ForecastConfig,
    aqi_provider: Option<Arc<dyn AqiProvider>>,
    weather_provider: Option<Arc<dyn WeatherProvider>>,
    model_store: Option<Arc<dyn ModelStore>>,
    scalar_store: Option<Arc<dyn ScalarStore>>,
}

impl ForecastServiceBuilder {
    pub fn aqi_provider(mut self, provider: Arc<dyn AqiProvider>) -> Self {
        self.aqi_provider = Some(provider);
        self
    }

    pub fn weather_provider(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.weather_provider = Some(provider);
        self
    }

    pub fn model_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.model_store = Some(store);
        self
    }

    pub fn scalar_store(mut self, store: Arc<dyn ScalarStore>) -> Self {
        self.scalar_store = Some(store);
        self
    }

    pub fn build(self) -> ForecastResult<ForecastService> {
        let config = self.config;
        config.validate_serving()?;
        let offset = config
            .utc_offset()
            .ok_or_else(|| ForecastError::InvalidConfig("UTC offset out of range".into()))?;
        let timeout = config.providers.request_timeout();

        let aqi_provider: Arc<dyn AqiProvider> = match self.aqi_provider {
            Some(p) => p,
            None => Arc::new(HttpAqiProvider::new(config.providers.aqi_api_url.clone(), timeout)?),
        };
        let weather_provider: Arc<dyn WeatherProvider> = match self.weather_provider {
            Some(p) => p,
            None => Arc::new(OpenWeatherProvider::new(
                config.providers.weather_api_url.clone(),
                config.providers.weather_api_key.clone(),
                timeout,
            )?),
        };
        let model_store: Arc<dyn ModelStore> = match (self.model_store, &config.storage.model_dir) {
            (Some(s), _) => s,
            (None, Some(dir)) => Arc::new(FileModelStore::new(dir.clone(), config.storage.model_format)),
            (None, None) => Arc::new(MemoryModelStore::new()),
        };
        let scalar_store: Arc<dyn ScalarStore> = match (self.scalar_store, &config.storage.state_path) {
            (Some(s), _) => s,
            (None, Some(path)) => Arc::new(FileScalarStore::new(path.clone())),
            (None, None) => Arc::new(MemoryScalarStore::new()),
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(ForecastService {
            fallback: FallbackGenerator::new(scalar_store.clone(), config.constraints.clone()),
            offset,
            aqi_provider,
            weather_provider,
            model_store,
            scalar_store,
            models: RwLock::new(None),
            init_lock: AsyncMutex::new(()),
            status: Mutex::new(ModelStatus::Loading),
            rng: Mutex::new(rng),
            config,
        })
    }
}

pub struct ForecastService {
    config: ForecastConfig,
    offset: FixedOffset,
    aqi_provider: Arc<dyn AqiProvider>,
    weather_provider: Arc<dyn WeatherProvider>,
    model_store: Arc<dyn ModelStore>,
    scalar_store: Arc<dyn ScalarStore>,
    fallback: FallbackGenerator,
    models: RwLock<Option<Arc<LoadedModels>>>,
    /// Held for the whole of an initialization so only one runs at a time
    init_lock: AsyncMutex<()>,
    status: Mutex<ModelStatus>,
    rng: Mutex<StdRng>,
}

impl ForecastService {
    pub fn builder(config: ForecastConfig) -> ForecastServiceBuilder {
        ForecastServiceBuilder {
            config,
            aqi_provider: None,
            weather_provider: None,
            model_store: None,
            scalar_store: None,
        }
    }

    /// Service wired entirely from `config`
    pub fn from_config(config: ForecastConfig) -> ForecastResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn status(&self) -> ModelStatus {
        *lock(&self.status)
    }

    fn set_status(&self, status: ModelStatus) {
        *lock(&self.status) = status;
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        lock(&self.rng)
    }

    /// Load both models from the store, training whichever is missing
    ///
    /// Returns whether models are ready. Concurrent callers wait for the
    /// running initialization and share its outcome. A failed initialization
    /// is retried by the next call.
    pub async fn init_models(&self) -> bool {
        if self.models.read().await.is_some() {
            return true;
        }

        let _guard = self.init_lock.lock().await;
        if self.models.read().await.is_some() {
            return true;
        }

        self.set_status(ModelStatus::Loading);
        info!("initializing forecast models");

        match self.load_or_train_all().await {
            Ok(models) => {
                *self.models.write().await = Some(Arc::new(models));
                self.set_status(ModelStatus::Ready);
                info!("forecast models ready");
                true
            }
            Err(e) => {
                self.set_status(ModelStatus::Error);
                error!(error = %e, "forecast model initialization failed");
                false
            }
        }
    }

    async fn load_or_train_all(&self) -> ForecastResult<LoadedModels> {
        let hourly = self.load_or_train(Horizon::Hourly).await?;
        let weekly = self.load_or_train(Horizon::Weekly).await?;
        Ok(LoadedModels { hourly, weekly })
    }

    async fn load_or_train(&self, horizon: Horizon) -> ForecastResult<HorizonModel> {
        let key = model_key(horizon);

        match self.model_store.load(&key).await {
            Ok(Some(saved)) => match saved.restore(horizon) {
                Ok((network, metadata)) => {
                    info!(%horizon, created_at = %metadata.created_at, "loaded stored model");
                    return Ok(HorizonModel { network, metadata });
                }
                Err(e) => warn!(%horizon, error = %e, "stored model rejected, retraining"),
            },
            Ok(None) => debug!(%horizon, "no stored model"),
            Err(e) => warn!(%horizon, error = %e, "could not read stored model, retraining"),
        }

        let training = self.config.training.clone();
        let reference = Utc::now().with_timezone(&self.offset);
        let seed: u64 = self.rng().gen();

        let trained = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            train_horizon(horizon, &training, reference, &mut rng)
        })
        .await
        .map_err(|e| ForecastError::Task(e.to_string()))??;

        let saved = ModelPersistence::create_saved_model(
            &trained.network,
            horizon,
            &trained.metrics,
            self.config.training.epochs,
            trained.training_samples,
            Some(format!("{} AQI regressor trained on synthetic data", horizon)),
        );
        if let Err(e) = self.model_store.save(&key, &saved).await {
            warn!(%horizon, error = %e, "could not persist trained model");
        }

        Ok(HorizonModel {
            network: trained.network,
            metadata: saved.metadata,
        })
    }

    /// Next 24 hours from now
    pub async fn get_hourly_predictions(&self, lat: f64, lon: f64) -> Vec<ForecastPoint> {
        self.get_forecast_at(Horizon::Hourly, Coordinates::new(lat, lon), Utc::now())
            .await
    }

    /// Next 7 days from now
    pub async fn get_weekly_predictions(&self, lat: f64, lon: f64) -> Vec<ForecastPoint> {
        self.get_forecast_at(Horizon::Weekly, Coordinates::new(lat, lon), Utc::now())
            .await
    }

    /// Forecast `horizon.steps()` points starting at `now`
    pub async fn get_forecast_at(
        &self,
        horizon: Horizon,
        coords: Coordinates,
        now: DateTime<Utc>,
    ) -> Vec<ForecastPoint> {
        let local_now = now.with_timezone(&self.offset);

        let (current, weather) = if coords.is_valid() {
            (self.fetch_current_aqi(coords).await, self.fetch_weather(coords).await)
        } else {
            warn!(lat = coords.lat, lon = coords.lon, "invalid coordinates, skipping upstream fetches");
            (None, WeatherCondition::default())
        };
        let baseline = current.unwrap_or(self.config.default_aqi);

        if !self.init_models().await {
            return self.fallback_series(horizon, current, local_now).await;
        }

        let Some(models) = self.models.read().await.clone() else {
            return self.fallback_series(horizon, current, local_now).await;
        };

        match self.predict_series(models.get(horizon), horizon, baseline, weather, local_now) {
            Ok(points) => points,
            Err(e) => {
                warn!(%horizon, error = %e, "model prediction failed, using fallback");
                self.fallback_series(horizon, current, local_now).await
            }
        }
    }

    fn predict_series(
        &self,
        model: &HorizonModel,
        horizon: Horizon,
        baseline: f64,
        weather: WeatherCondition,
        now: DateTime<FixedOffset>,
    ) -> ForecastResult<Vec<ForecastPoint>> {
        let constraints = &self.config.constraints;
        let signal = weather.signal();
        let mut rng = self.rng();

        let mut previous = constraints.clamp_to_domain(baseline);
        let mut points = Vec::with_capacity(horizon.steps());

        for step in 0..horizon.steps() {
            let timestamp = now + horizon.step_interval() * step as i32;
            let features = encode(horizon, &timestamp, previous, signal);
            let normalized = predict_one(&model.network, &features, step)?;

            let raw = denormalize_aqi(normalized) * signal.factor;
            if !raw.is_finite() {
                return Err(ForecastError::Prediction {
                    horizon,
                    step,
                    message: format!("model produced {}", raw),
                });
            }

            let aqi = constraints.constrain(raw, previous, horizon, &mut *rng);
            points.push(ForecastPoint {
                timestamp: timestamp.timestamp_millis(),
                aqi,
                confidence: confidence(step, horizon),
                components: Some(pollutant_components(aqi, &mut *rng)),
                feature_importance: Some(feature_importance(horizon, &timestamp, signal.factor)),
                source: ForecastSource::Model,
            });
            previous = f64::from(aqi);
        }

        Ok(points)
    }

    async fn fallback_series(
        &self,
        horizon: Horizon,
        baseline: Option<f64>,
        now: DateTime<FixedOffset>,
    ) -> Vec<ForecastPoint> {
        let base = self.fallback.base_seed(baseline).await;
        let (seed, points) = {
            let mut rng = self.rng();
            let seed = perturb_seed(base, &mut *rng);
            (seed, self.fallback.series(horizon, seed, now, &mut *rng))
        };
        self.fallback.remember(seed).await;
        points
    }

    /// Current AQI, or `None` when the provider fails or times out
    async fn fetch_current_aqi(&self, coords: Coordinates) -> Option<f64> {
        let result = self
            .bounded(self.aqi_provider.current_aqi(coords))
            .await
            .map(|current| current.aqi);

        match result {
            Ok(aqi) => {
                debug!(aqi, "current AQI");
                if let Err(e) = self.scalar_store.set(LAST_AQI_KEY, aqi).await {
                    warn!(error = %e, "could not persist last AQI value");
                }
                Some(aqi)
            }
            Err(e) => {
                warn!(error = %e, default = self.config.default_aqi, "current AQI unavailable, using default");
                None
            }
        }
    }

    async fn fetch_weather(&self, coords: Coordinates) -> WeatherCondition {
        match self.bounded(self.weather_provider.current_weather(coords)).await {
            Ok(report) => {
                debug!(condition = %report.condition, factor = report.condition.factor(), "current weather");
                report.condition
            }
            Err(e) => {
                warn!(error = %e, "weather unavailable, assuming neutral conditions");
                WeatherCondition::default()
            }
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let timeout: Duration = self.config.providers.request_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or(Err(ProviderError::Timeout(timeout)))
    }

    /// Metrics of the hourly model's training run; empty before initialization
    pub async fn training_metrics(&self) -> TrainingMetrics {
        self.training_metrics_for(Horizon::Hourly).await
    }

    pub async fn training_metrics_for(&self, horizon: Horizon) -> TrainingMetrics {
        match self.models.read().await.as_ref() {
            Some(models) => models.get(horizon).metadata.metrics.clone(),
            None => TrainingMetrics::default(),
        }
    }

    pub async fn model_information(&self) -> ModelInformation {
        let mut features: Vec<String> = Vec::new();
        for horizon in Horizon::ALL {
            for name in FeatureVector::names(horizon) {
                if !features.iter().any(|f| f == name) {
                    features.push(name.to_string());
                }
            }
        }

        let models = self.models.read().await.clone();
        let (accuracy, training, architecture) = match models.as_ref() {
            Some(models) => {
                let hourly = &models.hourly;
                let weekly = &models.weekly;
                let mut architecture: Vec<String> = hourly
                    .network
                    .architecture()
                    .into_iter()
                    .map(|layer| format!("hourly: {}", layer))
                    .collect();
                architecture.extend(weekly.network.architecture().into_iter().map(|layer| format!("weekly: {}", layer)));

                let training = TrainingSummary {
                    epochs: hourly.metadata.total_epochs,
                    data_points: hourly.metadata.training_samples,
                    final_loss: hourly.metadata.final_loss,
                };
                (hourly.metadata.metrics.final_accuracy(), training, architecture)
            }
            None => (
                None,
                TrainingSummary {
                    epochs: 0,
                    data_points: 0,
                    final_loss: None,
                },
                Vec::new(),
            ),
        };

        ModelInformation {
            status: self.status(),
            name: MODEL_NAME.to_string(),
            model_type: "Feed-forward neural network (two ReLU hidden layers, dropout)".to_string(),
            features,
            accuracy,
            training,
            architecture,
        }
    }

    /// Hourly then weekly forecast for `coords` as a CSV report
    pub async fn export_csv(&self, lat: f64, lon: f64) -> Result<String, ReportError> {
        let coords = Coordinates::new(lat, lon);
        let now = Utc::now();
        let hourly = self.get_forecast_at(Horizon::Hourly, coords, now).await;
        let weekly = self.get_forecast_at(Horizon::Weekly, coords, now).await;
        report::to_csv(&hourly, &weekly, self.offset)
    }
}

fn predict_one(network: &FeedForwardNetwork, features: &FeatureVector, step: usize) -> ForecastResult<f64> {
    let horizon = features.horizon();
    if features.len() != network.input_size {
        return Err(ForecastError::FeatureShape {
            horizon,
            expected: network.input_size,
            actual: features.len(),
        });
    }

    let value = network
        .predict(&features.as_column())
        .iter()
        .next()
        .copied()
        .ok_or_else(|| ForecastError::Prediction {
            horizon,
            step,
            message: "empty model output".into(),
        })?;

    if !value.is_finite() {
        return Err(ForecastError::Prediction {
            horizon,
            step,
            message: format!("model produced {}", value),
        });
    }
    Ok(value)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
