//! Process-wide key-value storage shared by the orchestrator and UI surfaces.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{RwLock, broadcast};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Notification sent to subscribers after every write.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub value: Value,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Receives every change made through this store.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Reads and decodes a typed value.
pub async fn load<T, S>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a typed value.
pub async fn save<T, S>(store: &S, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    store.set(key, serde_json::to_value(value)?).await
}

/// Subscription narrowed to a single key.
pub struct KeyWatcher {
    key: String,
    rx: broadcast::Receiver<StorageChange>,
}

impl KeyWatcher {
    pub fn new<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Self {
        Self {
            key: key.to_string(),
            rx: store.subscribe(),
        }
    }

    /// Next value written under the watched key; `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.key == self.key => return Some(change.value),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Storage watcher for {} lagged by {} changes", self.key, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

const CHANGE_CAPACITY: usize = 256;

/// In-memory store for tests and embedding.
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.clone());
        // No subscribers is fine.
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

/// JSON file holding every key; survives restarts.
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Opens the store, loading existing contents if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            path,
            values: RwLock::new(values),
            changes,
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cyrec")
            .join("state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &HashMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value.clone());
        self.persist(&values).await?;
        drop(values);
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_notifies() {
        let store = MemoryStore::new();
        let mut watcher = KeyWatcher::new(&store, "b");
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!("two")).await.unwrap();
        assert_eq!(watcher.changed().await, Some(json!("two")));
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::open(&path).await.unwrap();
        save(&store, "list", &vec!["x", "y"]).await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        let list: Option<Vec<String>> = load(&reopened, "list").await.unwrap();
        assert_eq!(list, Some(vec!["x".to_string(), "y".to_string()]));
    }
}
