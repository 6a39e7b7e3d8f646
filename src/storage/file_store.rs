//! File store capability
//!
//! Paths passed to a [`FileStore`] are relative to its root.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use super::{with_timeout, DEFAULT_STORE_TIMEOUT};
use crate::context::Clock;
use crate::error::{LogError, Result};

/// File operations rooted at an application-private documents path
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create (or truncate) a file with the given contents
    async fn create_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Append bytes to a file, creating it if absent
    async fn append_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    async fn read_to_string(&self, path: &Path) -> Result<String>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Current size in bytes
    async fn size(&self, path: &Path) -> Result<u64>;

    async fn last_modified(&self, path: &Path) -> Result<DateTime<Utc>>;

    /// Files directly inside `dir`, as root-relative paths
    ///
    /// A missing directory lists as empty.
    async fn list_directory(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    async fn delete(&self, path: &Path) -> Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    async fn create_directory_if_absent(&self, dir: &Path) -> Result<()>;

    /// Full location of a root-relative path, for reports
    fn display_path(&self, path: &Path) -> PathBuf;
}

/// File store backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    timeout: Duration,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Set the per-operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn create_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        with_timeout(self.timeout, &full, tokio::fs::write(&full, contents)).await
    }

    async fn append_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        with_timeout(self.timeout, &full, async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)
                .await?;
            file.write_all(bytes).await?;
            file.flush().await
        })
        .await
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        with_timeout(self.timeout, &full, tokio::fs::read_to_string(&full)).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let full = self.resolve(path);
        with_timeout(self.timeout, &full, tokio::fs::try_exists(&full)).await
    }

    async fn size(&self, path: &Path) -> Result<u64> {
        let full = self.resolve(path);
        let metadata = with_timeout(self.timeout, &full, tokio::fs::metadata(&full)).await?;
        Ok(metadata.len())
    }

    async fn last_modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        let full = self.resolve(path);
        let modified = with_timeout(self.timeout, &full, async {
            tokio::fs::metadata(&full).await?.modified()
        })
        .await?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn list_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let full = self.resolve(dir);
        let names = with_timeout(self.timeout, &full, async {
            let mut names = Vec::new();
            let mut entries = match tokio::fs::read_dir(&full).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    names.push(entry.file_name());
                }
            }
            Ok(names)
        })
        .await?;

        let mut paths: Vec<PathBuf> = names.into_iter().map(|name| dir.join(name)).collect();
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        with_timeout(self.timeout, &full, tokio::fs::remove_file(&full)).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.resolve(from);
        let dest = self.resolve(to);
        with_timeout(self.timeout, &dest, tokio::fs::copy(&source, &dest)).await?;
        Ok(())
    }

    async fn create_directory_if_absent(&self, dir: &Path) -> Result<()> {
        let full = self.resolve(dir);
        with_timeout(self.timeout, &full, tokio::fs::create_dir_all(&full)).await
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-process file store
///
/// Modification times come from the supplied clock, so retention can be tested by
/// advancing a [`ManualClock`](crate::context::ManualClock). Writes can be made
/// to fail on demand to exercise degraded paths.
pub struct MemoryFileStore {
    clock: Arc<dyn Clock>,
    files: Mutex<BTreeMap<PathBuf, MemoryFile>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    fail_writes: AtomicBool,
}

impl MemoryFileStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(BTreeSet::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every mutating operation fail with `PermissionDenied`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Override a file's modification time
    pub fn set_modified(&self, path: &Path, modified: DateTime<Utc>) {
        if let Some(file) = self.files().get_mut(path) {
            file.modified = modified;
        }
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MemoryFile>> {
        self.files.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn dirs(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.dirs.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LogError::io(
                path,
                std::io::Error::new(ErrorKind::PermissionDenied, "writes disabled"),
            ));
        }
        Ok(())
    }

    fn not_found(path: &Path) -> LogError {
        LogError::io(path, std::io::Error::new(ErrorKind::NotFound, "no such file"))
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let file = MemoryFile {
            contents: contents.to_vec(),
            modified: self.clock.now(),
        };
        self.files().insert(path.to_path_buf(), file);
        Ok(())
    }

    async fn append_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let now = self.clock.now();
        let mut files = self.files();
        let file = files.entry(path.to_path_buf()).or_insert_with(|| MemoryFile {
            contents: Vec::new(),
            modified: now,
        });
        file.contents.extend_from_slice(bytes);
        file.modified = now;
        Ok(())
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files();
        let file = files.get(path).ok_or_else(|| Self::not_found(path))?;
        String::from_utf8(file.contents.clone()).map_err(|e| {
            LogError::io(path, std::io::Error::new(ErrorKind::InvalidData, e))
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files().contains_key(path))
    }

    async fn size(&self, path: &Path) -> Result<u64> {
        self.files()
            .get(path)
            .map(|f| f.contents.len() as u64)
            .ok_or_else(|| Self::not_found(path))
    }

    async fn last_modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        self.files()
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| Self::not_found(path))
    }

    async fn list_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        self.files()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_writable(to)?;
        let now = self.clock.now();
        let mut files = self.files();
        let contents = files
            .get(from)
            .map(|f| f.contents.clone())
            .ok_or_else(|| Self::not_found(from))?;
        files.insert(
            to.to_path_buf(),
            MemoryFile {
                contents,
                modified: now,
            },
        );
        Ok(())
    }

    async fn create_directory_if_absent(&self, dir: &Path) -> Result<()> {
        self.check_writable(dir)?;
        self.dirs().insert(dir.to_path_buf());
        Ok(())
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}
