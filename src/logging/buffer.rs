//! Bounded durable buffer of high-severity records
//!
//! A FIFO capped at `max_entries`, persisted as one JSON array under a single
//! key-value key. Appends are read-modify-write, serialized by an async mutex so
//! concurrent appends never lose entries.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::record::LogRecord;
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Key holding the buffered records
pub const BUFFER_KEY: &str = "error_logs";

pub struct DurableBuffer {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_entries: usize,
    append_lock: Mutex<()>,
}

impl DurableBuffer {
    /// Create a buffer over the default key with the specified capacity
    pub fn new(store: Arc<dyn KeyValueStore>, max_entries: usize) -> Self {
        Self {
            store,
            key: BUFFER_KEY.to_string(),
            max_entries: max_entries.max(1),
            append_lock: Mutex::new(()),
        }
    }

    /// Append a record, evicting the oldest entries beyond capacity
    pub async fn append(&self, record: &LogRecord) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        let mut entries: VecDeque<Value> = self.load_raw().await?.into();
        entries.push_back(serde_json::to_value(record)?);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }

        let content = serde_json::to_string(&entries)?;
        self.store.set(&self.key, &content).await
    }

    /// All readable records, oldest first
    ///
    /// Entries that fail to parse are skipped.
    pub async fn read_all(&self) -> Result<Vec<LogRecord>> {
        let raw = self.load_raw().await?;
        let total = raw.len();
        let records: Vec<LogRecord> = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        if records.len() < total {
            tracing::warn!(
                target: "devicelog::buffer",
                skipped = total - records.len(),
                "Skipped unreadable buffered records"
            );
        }

        Ok(records)
    }

    /// Get the number of readable records
    pub async fn len(&self) -> Result<usize> {
        Ok(self.read_all().await?.len())
    }

    /// Check if the buffer is empty
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Replace the stored sequence with an empty one
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        self.store.set(&self.key, "[]").await
    }

    /// Stored JSON elements; an absent or corrupt value reads as empty
    async fn load_raw(&self) -> Result<Vec<Value>> {
        let Some(content) = self.store.get(&self.key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(values) => Ok(values),
            Err(e) => {
                tracing::warn!(
                    target: "devicelog::buffer",
                    error = %e,
                    "Durable buffer is corrupt, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;
    use crate::logging::record::LogLevel;
    use crate::storage::MemoryKvStore;
    use chrono::{TimeZone, Utc};

    fn record(i: usize) -> LogRecord {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(i as i64);
        LogRecord::builder(at, LogLevel::Error, format!("error {}", i), Environment::Development).build()
    }

    fn buffer(max_entries: usize) -> (Arc<MemoryKvStore>, DurableBuffer) {
        let store = Arc::new(MemoryKvStore::new());
        let buffer = DurableBuffer::new(store.clone(), max_entries);
        (store, buffer)
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let (_, buffer) = buffer(10);
        assert!(buffer.is_empty().await.unwrap());

        buffer.append(&record(1)).await.unwrap();
        buffer.append(&record(2)).await.unwrap();

        let records = buffer.read_all().await.unwrap();
        assert_eq!(records, vec![record(1), record(2)]);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let (_, buffer) = buffer(3);

        for i in 0..5 {
            buffer.append(&record(i)).await.unwrap();
        }

        let records = buffer.read_all().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message(), "error 2");
        assert_eq!(records[1].message(), "error 3");
        assert_eq!(records[2].message(), "error 4");
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let (store, buffer) = buffer(5);
        buffer.append(&record(7)).await.unwrap();
        drop(buffer);

        let reopened = DurableBuffer::new(store, 5);
        assert_eq!(reopened.read_all().await.unwrap(), vec![record(7)]);
    }

    #[tokio::test]
    async fn test_corrupt_value_reads_empty_and_recovers() {
        let (store, buffer) = buffer(5);
        store.set(BUFFER_KEY, "not json at all").await.unwrap();

        assert!(buffer.read_all().await.unwrap().is_empty());

        buffer.append(&record(1)).await.unwrap();
        assert_eq!(buffer.read_all().await.unwrap(), vec![record(1)]);
    }

    #[tokio::test]
    async fn test_unparseable_entries_are_skipped() {
        let (store, buffer) = buffer(5);
        let good = serde_json::to_value(record(1)).unwrap();
        let content = serde_json::json!([good, {"level": "nonsense"}, 42]).to_string();
        store.set(BUFFER_KEY, &content).await.unwrap();

        assert_eq!(buffer.read_all().await.unwrap(), vec![record(1)]);
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, buffer) = buffer(5);
        buffer.append(&record(1)).await.unwrap();
        buffer.clear().await.unwrap();

        assert!(buffer.read_all().await.unwrap().is_empty());
        assert_eq!(store.get(BUFFER_KEY).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let (_, buffer) = buffer(100);
        let buffer = Arc::new(buffer);

        let mut handles = Vec::new();
        for i in 0..40 {
            let buffer = Arc::clone(&buffer);
            handles.push(tokio::spawn(async move { buffer.append(&record(i)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(buffer.len().await.unwrap(), 40);
    }
}
