//! Service configuration.
//!
//! Loaded in layers:
//! 1. Defaults in code
//! 2. An optional file (`config/aqi-forecast.toml`, `.json`, ...)
//! 3. Environment overrides prefixed `AQI_FORECAST`, nested with `__`
//!    (e.g. `AQI_FORECAST__TRAINING__EPOCHS=50`)

use chrono::FixedOffset;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constraints::Constraints;
use crate::error::{ForecastError, ForecastResult};
use crate::persistence::SnapshotFormat;
use crate::providers::OpenWeatherProvider;
use crate::training::TrainingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config/aqi-forecast";
pub const ENV_PREFIX: &str = "AQI_FORECAST";

/// Upstream endpoints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the AQI service; `{base}/current` is queried
    pub aqi_api_url: String,
    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            aqi_api_url: "http://localhost:3001/api".to_string(),
            weather_api_url: OpenWeatherProvider::DEFAULT_BASE_URL.to_string(),
            weather_api_key: None,
            request_timeout_secs: 8,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where models and the last-AQI scalar live; `None` keeps them in memory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub model_dir: Option<PathBuf>,
    pub model_format: SnapshotFormat,
    pub state_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            model_dir: None,
            model_format: SnapshotFormat::Json,
            state_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub providers: ProviderConfig,
    pub storage: StorageConfig,
    /// Fixed offset used for local hour/day features
    pub utc_offset_minutes: i32,
    /// Seed for all randomness; drawn from the OS when absent
    pub seed: Option<u64>,
    /// Baseline AQI when the upstream fetch fails
    pub default_aqi: f64,
    pub training: TrainingConfig,
    pub constraints: Constraints,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            providers: ProviderConfig::default(),
            storage: StorageConfig::default(),
            utc_offset_minutes: 0,
            seed: None,
            default_aqi: 50.0,
            training: TrainingConfig::default(),
            constraints: Constraints::default(),
        }
    }
}

impl ForecastConfig {
    /// Load from `config/aqi-forecast.*` (if present) and the environment
    pub fn load() -> ForecastResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Same as `load` with an explicit file stem or path; a missing file is fine
    pub fn load_from(file: &str) -> ForecastResult<Self> {
        let config: ForecastConfig = config::Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ForecastError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ForecastResult<()> {
        self.validate_serving()?;
        self.training.validate()
    }

    /// Everything except the training section
    ///
    /// Bad training settings only surface when the models are initialized, and
    /// the service keeps answering from the fallback meanwhile.
    pub fn validate_serving(&self) -> ForecastResult<()> {
        if self.providers.request_timeout_secs == 0 {
            return Err(ForecastError::InvalidConfig("request timeout must be positive".into()));
        }
        if self.utc_offset().is_none() {
            return Err(ForecastError::InvalidConfig(format!(
                "UTC offset of {} minutes is out of range",
                self.utc_offset_minutes
            )));
        }
        if !(self.default_aqi.is_finite() && self.default_aqi >= 0.0) {
            return Err(ForecastError::InvalidConfig("default AQI must be a non-negative number".into()));
        }
        self.constraints.validate()
    }

    pub fn utc_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ForecastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.request_timeout(), Duration::from_secs(8));
        assert_eq!(config.utc_offset(), FixedOffset::east_opt(0));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = ForecastConfig::default();
        config.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());

        let mut config = ForecastConfig::default();
        config.providers.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ForecastConfig::default();
        config.training.learning_rate = -1.0;
        assert!(config.validate().is_err());
        assert!(config.validate_serving().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.toml");
        std::fs::write(
            &path,
            r#"
utc_offset_minutes = 330
seed = 7

[training]
epochs = 20

[providers]
weather_api_key = "abc"
"#,
        )
        .unwrap();

        let config = ForecastConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.utc_offset_minutes, 330);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.providers.weather_api_key.as_deref(), Some("abc"));
        assert_eq!(config.providers.request_timeout_secs, 8);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("absent");
        let config = ForecastConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.default_aqi, 50.0);
    }
}
