use async_trait::async_trait;
use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::horizon::Horizon;
use crate::layers::linear::LinearLayer;
use crate::metrics::TrainingMetrics;
use crate::models::feed_forward::FeedForwardNetwork;

/// Base key under which trained models are stored; one entry per horizon
pub const MODEL_STORAGE_KEY: &str = "aqi-prediction-model";

pub fn model_key(horizon: Horizon) -> String {
    format!("{}-{}", MODEL_STORAGE_KEY, horizon)
}

/// Errors that can occur during model persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(error: serde_json::Error) -> Self {
        PersistenceError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(error: bincode::Error) -> Self {
        PersistenceError::Serialization(error.to_string())
    }
}

/// Serializable version of Array2<f64> for persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl TryFrom<SerializableArray2> for Array2<f64> {
    type Error = PersistenceError;

    fn try_from(value: SerializableArray2) -> Result<Self, Self::Error> {
        let shape = value.shape;
        Array2::from_shape_vec(shape, value.data).map_err(|e| {
            PersistenceError::InvalidSnapshot(format!("array of shape {:?}: {}", shape, e))
        })
    }
}

/// Serializable dense layer parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableLinearLayer {
    weight: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LinearLayer> for SerializableLinearLayer {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl TryFrom<SerializableLinearLayer> for LinearLayer {
    type Error = PersistenceError;

    fn try_from(value: SerializableLinearLayer) -> Result<Self, Self::Error> {
        let weight: Array2<f64> = value.weight.try_into()?;
        let bias: Array2<f64> = value.bias.try_into()?;
        LinearLayer::from_weights(weight, bias)
            .ok_or_else(|| PersistenceError::InvalidSnapshot("bias does not match weight rows".into()))
    }
}

/// Serializable feed-forward network (weights + architecture)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableNetwork {
    hidden1: SerializableLinearLayer,
    hidden2: SerializableLinearLayer,
    output: SerializableLinearLayer,
    dropout_rate: f64,
    input_size: usize,
    hidden_sizes: [usize; 2],
}

impl From<&FeedForwardNetwork> for SerializableNetwork {
    fn from(network: &FeedForwardNetwork) -> Self {
        Self {
            hidden1: (&network.hidden1).into(),
            hidden2: (&network.hidden2).into(),
            output: (&network.output).into(),
            dropout_rate: network.dropout.dropout_rate,
            input_size: network.input_size,
            hidden_sizes: network.hidden_sizes,
        }
    }
}

impl TryFrom<SerializableNetwork> for FeedForwardNetwork {
    type Error = PersistenceError;

    fn try_from(value: SerializableNetwork) -> Result<Self, Self::Error> {
        let network = FeedForwardNetwork::from_layers(
            value.hidden1.try_into()?,
            value.hidden2.try_into()?,
            value.output.try_into()?,
            value.dropout_rate,
        )
        .ok_or_else(|| PersistenceError::InvalidSnapshot("layer shapes do not chain".into()))?;

        if network.input_size != value.input_size || network.hidden_sizes != value.hidden_sizes {
            return Err(PersistenceError::InvalidSnapshot(
                "recorded architecture disagrees with stored weights".into(),
            ));
        }
        Ok(network)
    }
}

/// Model metadata for tracking training information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub horizon: Horizon,
    pub input_size: usize,
    pub hidden_sizes: [usize; 2],
    pub total_epochs: usize,
    pub training_samples: usize,
    pub final_loss: Option<f64>,
    #[serde(default)]
    pub metrics: TrainingMetrics,
    pub description: Option<String>,
}

/// Complete saved model including network and metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub network: SerializableNetwork,
    pub metadata: ModelMetadata,
}

impl SavedModel {
    /// Restore the network, checking it fits `horizon` and holds finite weights
    pub fn restore(self, horizon: Horizon) -> Result<(FeedForwardNetwork, ModelMetadata), PersistenceError> {
        if self.metadata.horizon != horizon {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "snapshot is for the {} model, expected {}",
                self.metadata.horizon, horizon
            )));
        }

        let network: FeedForwardNetwork = self.network.try_into()?;
        if network.input_size != horizon.feature_count() {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "{} model expects {} inputs, snapshot has {}",
                horizon,
                horizon.feature_count(),
                network.input_size
            )));
        }
        if !network.is_finite() {
            return Err(PersistenceError::InvalidSnapshot("non-finite weights".into()));
        }
        Ok((network, self.metadata))
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    pub fn to_json(model: &SavedModel) -> Result<Vec<u8>, PersistenceError> {
        Ok(serde_json::to_vec_pretty(model)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<SavedModel, PersistenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_binary(model: &SavedModel) -> Result<Vec<u8>, PersistenceError> {
        Ok(bincode::serialize(model)?)
    }

    pub fn from_binary(bytes: &[u8]) -> Result<SavedModel, PersistenceError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Create a model with metadata
    pub fn create_saved_model(
        network: &FeedForwardNetwork,
        horizon: Horizon,
        metrics: &TrainingMetrics,
        total_epochs: usize,
        training_samples: usize,
        description: Option<String>,
    ) -> SavedModel {
        let metadata = ModelMetadata {
            model_name: model_key(horizon),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            horizon,
            input_size: network.input_size,
            hidden_sizes: network.hidden_sizes,
            total_epochs,
            training_samples,
            final_loss: metrics.final_loss(),
            metrics: metrics.clone(),
            description,
        };

        SavedModel {
            network: network.into(),
            metadata,
        }
    }
}

/// Key-value store for trained models, scoped to the running device
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, key: &str, model: &SavedModel) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing is stored under `key`
    async fn load(&self, key: &str) -> Result<Option<SavedModel>, PersistenceError>;

    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Snapshot encoding used by `FileModelStore`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Json,
    Binary,
}

impl SnapshotFormat {
    fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "bin",
        }
    }

    /// Format implied by a path's extension; binary unless it ends in `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Binary,
        }
    }
}

/// One file per key under a directory
#[derive(Clone, Debug)]
pub struct FileModelStore {
    dir: PathBuf,
    format: SnapshotFormat,
}

impl FileModelStore {
    pub fn new<P: Into<PathBuf>>(dir: P, format: SnapshotFormat) -> Self {
        FileModelStore {
            dir: dir.into(),
            format,
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", file_name, self.format.extension()))
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save(&self, key: &str, model: &SavedModel) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let bytes = match SnapshotFormat::from_path(&path) {
            SnapshotFormat::Json => ModelPersistence::to_json(model)?,
            SnapshotFormat::Binary => ModelPersistence::to_binary(model)?,
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<SavedModel>, PersistenceError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let model = match SnapshotFormat::from_path(&path) {
            SnapshotFormat::Json => ModelPersistence::from_json(&bytes)?,
            SnapshotFormat::Binary => ModelPersistence::from_binary(&bytes)?,
        };
        Ok(Some(model))
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, for tests and sessions that should not touch disk
#[derive(Default)]
pub struct MemoryModelStore {
    models: RwLock<HashMap<String, SavedModel>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.models.read().await.is_empty()
    }
}

#[async_trait]
impl ModelStore for MemoryModelStore {
    async fn save(&self, key: &str, model: &SavedModel) -> Result<(), PersistenceError> {
        self.models.write().await.insert(key.to_string(), model.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<SavedModel>, PersistenceError> {
        Ok(self.models.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.models.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn saved(horizon: Horizon) -> (FeedForwardNetwork, SavedModel) {
        let mut rng = StdRng::seed_from_u64(12);
        let network = FeedForwardNetwork::for_horizon(horizon, 0.2, &mut rng);
        let model = ModelPersistence::create_saved_model(
            &network,
            horizon,
            &TrainingMetrics::default(),
            0,
            0,
            None,
        );
        (network, model)
    }

    #[test]
    fn test_model_key() {
        assert_eq!(model_key(Horizon::Hourly), "aqi-prediction-model-hourly");
        assert_eq!(model_key(Horizon::Weekly), "aqi-prediction-model-weekly");
    }

    #[test]
    fn test_binary_restore_preserves_predictions() {
        let (network, model) = saved(Horizon::Hourly);
        let bytes = ModelPersistence::to_binary(&model).unwrap();
        let (restored, metadata) = ModelPersistence::from_binary(&bytes)
            .unwrap()
            .restore(Horizon::Hourly)
            .unwrap();

        assert_eq!(metadata.horizon, Horizon::Hourly);
        let input = Array2::from_elem((6, 1), 0.5);
        assert_eq!(network.predict(&input), restored.predict(&input));
    }

    #[test]
    fn test_restore_rejects_wrong_horizon() {
        let (_, model) = saved(Horizon::Weekly);
        assert!(matches!(
            model.restore(Horizon::Hourly),
            Err(PersistenceError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_restore_rejects_non_finite_weights() {
        let (mut network, _) = saved(Horizon::Weekly);
        network.output.bias[[0, 0]] = f64::NAN;
        let model = ModelPersistence::create_saved_model(
            &network,
            Horizon::Weekly,
            &TrainingMetrics::default(),
            0,
            0,
            None,
        );
        assert!(model.restore(Horizon::Weekly).is_err());
    }

    #[test]
    fn test_corrupt_bytes_are_an_error() {
        assert!(ModelPersistence::from_binary(&[1, 2, 3]).is_err());
        assert!(ModelPersistence::from_json(b"{\"network\":").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SnapshotFormat::from_path(Path::new("m.json")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("m.model")), SnapshotFormat::Binary);
        assert_eq!(SnapshotFormat::from_path(Path::new("m")), SnapshotFormat::Binary);
    }
}
