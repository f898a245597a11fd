//! Scalar key-value state, used for the last-known AQI smoothing value.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::persistence::PersistenceError;

/// Key of the last AQI value the fallback generator seeded from
pub const LAST_AQI_KEY: &str = "lastAQIValue";

/// Last-writer-wins store of named `f64` values
#[async_trait]
pub trait ScalarStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<f64>, PersistenceError>;

    async fn set(&self, key: &str, value: f64) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct MemoryScalarStore {
    values: RwLock<HashMap<String, f64>>,
}

impl MemoryScalarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: f64) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value);
        MemoryScalarStore {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl ScalarStore for MemoryScalarStore {
    async fn get(&self, key: &str) -> Result<Option<f64>, PersistenceError> {
        Ok(self.values.read().await.get(key).copied())
    }

    async fn set(&self, key: &str, value: f64) -> Result<(), PersistenceError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// All values in one JSON object on disk
///
/// Writes are serialized through a mutex so concurrent `set`s do not interleave
/// read-modify-write cycles.
pub struct FileScalarStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileScalarStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileScalarStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, f64>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ScalarStore for FileScalarStore {
    async fn get(&self, key: &str) -> Result<Option<f64>, PersistenceError> {
        Ok(self.read_all().await?.get(key).copied())
    }

    async fn set(&self, key: &str, value: f64) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        // last writer wins, even over an unparsable file
        let mut values = match self.read_all().await {
            Ok(values) => values,
            Err(PersistenceError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable state file");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        values.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&values)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_last_writer_wins() {
        let store = MemoryScalarStore::new();
        assert_eq!(store.get(LAST_AQI_KEY).await.unwrap(), None);
        store.set(LAST_AQI_KEY, 42.0).await.unwrap();
        store.set(LAST_AQI_KEY, 57.0).await.unwrap();
        assert_eq!(store.get(LAST_AQI_KEY).await.unwrap(), Some(57.0));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScalarStore::new(dir.path().join("state").join("scalars.json"));

        assert_eq!(store.get(LAST_AQI_KEY).await.unwrap(), None);
        store.set(LAST_AQI_KEY, 63.0).await.unwrap();
        store.set("other", 1.5).await.unwrap();

        let reopened = FileScalarStore::new(dir.path().join("state").join("scalars.json"));
        assert_eq!(reopened.get(LAST_AQI_KEY).await.unwrap(), Some(63.0));
        assert_eq!(reopened.get("other").await.unwrap(), Some(1.5));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(FileScalarStore::new(&path).get(LAST_AQI_KEY).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_overwrites_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileScalarStore::new(&path);
        store.set(LAST_AQI_KEY, 60.0).await.unwrap();
        store.set(LAST_AQI_KEY, 61.0).await.unwrap();

        assert_eq!(store.get(LAST_AQI_KEY).await.unwrap(), Some(61.0));
        assert_eq!(FileScalarStore::new(&path).get(LAST_AQI_KEY).await.unwrap(), Some(61.0));
    }
}
