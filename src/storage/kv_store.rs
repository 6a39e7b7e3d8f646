//! Key-value store capability
//!
//! Every value is a string; callers persist structured data as JSON.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{with_timeout, DEFAULT_STORE_TIMEOUT};
use crate::error::{LogError, Result};

/// Durable small-value persistence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process key-value store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| LogError::KeyValue("store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        // Yield so concurrent read-modify-write callers actually interleave
        tokio::task::yield_now().await;
        let mut values = self
            .values
            .lock()
            .map_err(|_| LogError::KeyValue("store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| LogError::KeyValue("store lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// Key-value store persisted as a single JSON object file
///
/// Writes go through a temp file and a rename so a crash never leaves a half
/// written store behind. A corrupt file reads as empty and is replaced on the next
/// write.
#[derive(Debug)]
pub struct JsonFileKvStore {
    store_path: PathBuf,
    timeout: Duration,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileKvStore {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            timeout: DEFAULT_STORE_TIMEOUT,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Set the per-operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the path to the store file
    pub fn path(&self) -> &Path {
        &self.store_path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        let path = &self.store_path;
        let content = with_timeout(self.timeout, path, async {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(e),
            }
        })
        .await?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(values) => Ok(values),
            Err(e) => {
                tracing::warn!(
                    target: "devicelog::storage",
                    path = %path.display(),
                    error = %e,
                    "Key-value store file is corrupt, treating as empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(values)?;
        let path = &self.store_path;
        let tmp_path = path.with_extension("json.tmp");

        with_timeout(self.timeout, path, async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp_path, content).await?;
            tokio::fs::rename(&tmp_path, path).await
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for JsonFileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}
