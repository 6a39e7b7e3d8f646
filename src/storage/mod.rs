//! Storage capabilities consumed by the logging engine
//!
//! Two seams:
//! - [`FileStore`]: file operations under an application-private document root
//! - [`KeyValueStore`]: small durable string values (buffer key, current user)
//!
//! Each has an on-disk implementation for real use and an in-memory one for tests
//! and embedding.

mod file_store;
mod kv_store;

pub use file_store::{FileStore, LocalFileStore, MemoryFileStore};
pub use kv_store::{JsonFileKvStore, KeyValueStore, MemoryKvStore};

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::{LogError, Result};

/// Default timeout for a single store operation
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an I/O future under the store's operation timeout
async fn with_timeout<T, F>(timeout: Duration, path: &Path, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| LogError::io(path, e)),
        Err(_) => Err(LogError::Timeout(timeout)),
    }
}
