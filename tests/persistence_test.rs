use aqi_forecast::persistence::{model_key, SnapshotFormat};
use aqi_forecast::{
    FeedForwardNetwork, FileModelStore, FileScalarStore, ForecastConfig, ForecastService, Horizon, ModelPersistence,
    ModelStatus, ModelStore, ScalarStore, TrainingConfig, TrainingMetrics,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn trained_metrics() -> TrainingMetrics {
    TrainingMetrics {
        epoch: vec![0, 10],
        loss: vec![0.05, 0.01],
        accuracy_proxy: vec![0.5, 0.9],
        validation_loss: Vec::new(),
    }
}

#[tokio::test]
async fn test_file_store_json_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileModelStore::new(dir.path(), SnapshotFormat::Json);

    let mut rng = StdRng::seed_from_u64(1);
    let network = FeedForwardNetwork::for_horizon(Horizon::Hourly, 0.2, &mut rng);
    let saved = ModelPersistence::create_saved_model(&network, Horizon::Hourly, &trained_metrics(), 100, 120, None);

    let key = model_key(Horizon::Hourly);
    store.save(&key, &saved).await.unwrap();
    assert!(store.path_for(&key).exists());
    assert!(store.path_for(&key).to_string_lossy().ends_with(".json"));

    let (restored, metadata) = store.load(&key).await.unwrap().unwrap().restore(Horizon::Hourly).unwrap();
    assert_eq!(metadata.final_loss, Some(0.01));
    assert_eq!(metadata.metrics, trained_metrics());
    assert_eq!(metadata.training_samples, 120);

    let input = Array2::from_elem((6, 1), 0.3);
    assert_eq!(network.predict(&input), restored.predict(&input));
}

#[tokio::test]
async fn test_file_store_binary_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileModelStore::new(dir.path().join("models"), SnapshotFormat::Binary);

    let mut rng = StdRng::seed_from_u64(2);
    let network = FeedForwardNetwork::for_horizon(Horizon::Weekly, 0.2, &mut rng);
    let saved = ModelPersistence::create_saved_model(&network, Horizon::Weekly, &trained_metrics(), 100, 80, None);

    let key = model_key(Horizon::Weekly);
    store.save(&key, &saved).await.unwrap();
    let (restored, _) = store.load(&key).await.unwrap().unwrap().restore(Horizon::Weekly).unwrap();

    let input = Array2::from_elem((5, 1), 0.7);
    assert_eq!(network.predict(&input), restored.predict(&input));
}

#[tokio::test]
async fn test_missing_and_removed_models() {
    let dir = tempdir().unwrap();
    let store = FileModelStore::new(dir.path(), SnapshotFormat::Json);
    let key = model_key(Horizon::Hourly);
    assert!(store.load(&key).await.unwrap().is_none());

    let mut rng = StdRng::seed_from_u64(3);
    let network = FeedForwardNetwork::for_horizon(Horizon::Hourly, 0.2, &mut rng);
    let saved = ModelPersistence::create_saved_model(&network, Horizon::Hourly, &TrainingMetrics::default(), 0, 0, None);
    store.save(&key, &saved).await.unwrap();
    store.remove(&key).await.unwrap();
    assert!(store.load(&key).await.unwrap().is_none());
    store.remove(&key).await.unwrap();
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error() {
    let dir = tempdir().unwrap();
    let store = FileModelStore::new(dir.path(), SnapshotFormat::Json);
    let key = model_key(Horizon::Weekly);
    tokio::fs::write(store.path_for(&key), b"{\"network\": 3}").await.unwrap();

    assert!(store.load(&key).await.is_err());
}

#[tokio::test]
async fn test_service_restarts_from_disk() {
    let dir = tempdir().unwrap();
    let config = ForecastConfig {
        seed: Some(11),
        training: TrainingConfig {
            epochs: 10,
            ..TrainingConfig::default()
        },
        storage: aqi_forecast::config::StorageConfig {
            model_dir: Some(dir.path().join("models")),
            model_format: SnapshotFormat::Binary,
            state_path: Some(dir.path().join("state.json")),
        },
        ..ForecastConfig::default()
    };

    let first = ForecastService::from_config(config.clone()).unwrap();
    assert!(first.init_models().await);
    let metrics = first.training_metrics().await;
    assert!(FileModelStore::new(dir.path().join("models"), SnapshotFormat::Binary)
        .path_for(&model_key(Horizon::Hourly))
        .exists());

    let second = ForecastService::from_config(config).unwrap();
    assert!(second.init_models().await);
    assert_eq!(second.status(), ModelStatus::Ready);
    assert_eq!(second.training_metrics().await, metrics);
}

#[tokio::test]
async fn test_scalar_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    FileScalarStore::new(&path).set("lastAQIValue", 77.0).await.unwrap();
    assert_eq!(FileScalarStore::new(&path).get("lastAQIValue").await.unwrap(), Some(77.0));
}
