//! Rotating log file writer
//!
//! Owns the active log file. Before every append it decides whether the file must
//! be rotated (missing, too large, or too old); rotation copies the file into
//! `archived_logs/`, deletes the original and opens a fresh one. The rotation
//! state sits behind an async mutex so the decision and the write are a single
//! critical section.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::policy::RetentionPolicy;
use super::record::LogRecord;
use super::retention;
use crate::context::Context;
use crate::error::Result;
use crate::storage::FileStore;

/// Directory (relative to the document root) holding rotated files
pub const ARCHIVE_DIR: &str = "archived_logs";

/// Generate a timestamped log file name
///
/// The timestamp is ISO-8601 with `-` in place of `:` so the name is valid on
/// every filesystem.
pub fn log_file_name(prefix: &str, created_at: DateTime<Utc>) -> String {
    format!(
        "{}{}.log",
        prefix,
        created_at.format("%Y-%m-%dT%H-%M-%S%.3fZ")
    )
}

#[derive(Debug, Clone)]
struct RotationState {
    path: PathBuf,
    created_at: DateTime<Utc>,
}

/// Information about the active log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFileInfo {
    /// Full path to the log file
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// `size / max_file_bytes × 100`
    pub utilization_percent: f64,
}

pub struct RotationManager {
    files: Arc<dyn FileStore>,
    context: Arc<Context>,
    policy: RetentionPolicy,
    state: Mutex<Option<RotationState>>,
    rotations: AtomicU64,
    last_failure: std::sync::Mutex<Option<String>>,
}

impl RotationManager {
    pub fn new(files: Arc<dyn FileStore>, context: Arc<Context>, policy: RetentionPolicy) -> Self {
        Self {
            files,
            context,
            policy,
            state: Mutex::new(None),
            rotations: AtomicU64::new(0),
            last_failure: std::sync::Mutex::new(None),
        }
    }

    /// Open a log file if none is active; returns the active file's path
    pub async fn ensure_file(&self) -> Result<PathBuf> {
        let mut state = self.state.lock().await;
        let result = self.ensure_locked(&mut state).await;
        self.record_outcome(&result);
        result
    }

    /// Append a record, rotating first if the active file is due
    pub async fn append(&self, record: &LogRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        let result = self.append_locked(&mut state, record).await;
        self.record_outcome(&result);
        result
    }

    /// Move the active file into the archive without opening a new one
    ///
    /// Returns the archive path, or `None` when there was nothing to archive.
    pub async fn archive_current(&self) -> Result<Option<PathBuf>> {
        let mut state = self.state.lock().await;
        self.archive_locked(&mut state).await
    }

    /// Delete the active file and every archive; returns the number of files removed
    pub async fn delete_all(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut deleted = 0;

        if let Some(current) = state.take() {
            if self.files.exists(&current.path).await? {
                self.files.delete(&current.path).await?;
                deleted += 1;
            }
        }

        for path in self.files.list_directory(Path::new(ARCHIVE_DIR)).await? {
            self.files.delete(&path).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    /// Delete archives older than the retention period
    ///
    /// Returns the number of files deleted.
    pub async fn prune_archives(&self) -> Result<usize> {
        let _state = self.state.lock().await;
        retention::prune_archives(
            self.files.as_ref(),
            Path::new(ARCHIVE_DIR),
            self.context.now(),
            self.policy.retention_chrono(),
        )
        .await
    }

    /// Active file path, observed size and age
    ///
    /// `None` when no file is open or the open file has disappeared; the next
    /// append rotates in that case.
    pub async fn status(&self) -> Result<Option<LogFileInfo>> {
        let state = self.state.lock().await;
        let Some(current) = state.as_ref() else {
            return Ok(None);
        };
        if !self.files.exists(&current.path).await? {
            return Ok(None);
        }

        let size_bytes = self.files.size(&current.path).await?;
        Ok(Some(LogFileInfo {
            path: self.files.display_path(&current.path),
            size_bytes,
            created_at: current.created_at,
            utilization_percent: size_bytes as f64 / self.policy.max_file_bytes as f64 * 100.0,
        }))
    }

    /// Number of rotations performed by this manager
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Most recent open or append failure, cleared by the next successful one
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn record_outcome<T>(&self, result: &Result<T>) {
        let mut last = self.last_failure.lock().unwrap_or_else(|p| p.into_inner());
        *last = result.as_ref().err().map(|e| e.to_string());
    }

    async fn append_locked(&self, state: &mut Option<RotationState>, record: &LogRecord) -> Result<()> {
        let rotate = match state.as_ref() {
            Some(current) => self.should_rotate(current).await?,
            None => false,
        };
        let path = if rotate {
            self.rotate_locked(state).await?
        } else {
            self.ensure_locked(state).await?
        };

        self.files
            .append_bytes(&path, record.render_line().as_bytes())
            .await
    }

    async fn ensure_locked(&self, state: &mut Option<RotationState>) -> Result<PathBuf> {
        if let Some(current) = state {
            return Ok(current.path.clone());
        }

        let created_at = self.context.now();
        let path = PathBuf::from(log_file_name(&self.policy.file_name_prefix, created_at));
        self.files
            .create_file(&path, self.header(created_at).as_bytes())
            .await?;

        tracing::debug!(target: "devicelog::file", path = %path.display(), "Opened log file");

        *state = Some(RotationState {
            path: path.clone(),
            created_at,
        });
        Ok(path)
    }

    async fn should_rotate(&self, current: &RotationState) -> Result<bool> {
        if !self.files.exists(&current.path).await? {
            return Ok(true);
        }
        if self.files.size(&current.path).await? >= self.policy.max_file_bytes {
            return Ok(true);
        }
        Ok(self.context.now() - current.created_at >= self.policy.retention_chrono())
    }

    async fn rotate_locked(&self, state: &mut Option<RotationState>) -> Result<PathBuf> {
        self.archive_locked(state).await?;
        self.rotations.fetch_add(1, Ordering::Relaxed);
        self.ensure_locked(state).await
    }

    /// Copy the active file into the archive and delete it
    ///
    /// State is only cleared once the original is gone, so a failed archive leaves
    /// the active file in place and the next append retries.
    async fn archive_locked(&self, state: &mut Option<RotationState>) -> Result<Option<PathBuf>> {
        let Some(current) = state.as_ref() else {
            return Ok(None);
        };

        if !self.files.exists(&current.path).await? {
            *state = None;
            return Ok(None);
        }

        self.files
            .create_directory_if_absent(Path::new(ARCHIVE_DIR))
            .await?;

        let destination = self.archive_destination(&current.path).await?;
        self.files.copy(&current.path, &destination).await?;
        self.files.delete(&current.path).await?;

        tracing::debug!(
            target: "devicelog::file",
            archived = %destination.display(),
            "Rotated log file"
        );

        *state = None;
        Ok(Some(destination))
    }

    /// First free archive path for `path`
    ///
    /// Files opened within the same millisecond share a name, so later archives of
    /// that name get a `_1`, `_2`, ... suffix instead of replacing earlier ones.
    async fn archive_destination(&self, path: &Path) -> Result<PathBuf> {
        let archive_dir = Path::new(ARCHIVE_DIR);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut candidate = archive_dir.join(format!("{}.log", stem));
        let mut suffix = 1u32;
        while self.files.exists(&candidate).await? {
            candidate = archive_dir.join(format!("{}_{}.log", stem, suffix));
            suffix += 1;
        }
        Ok(candidate)
    }

    fn header(&self, created_at: DateTime<Utc>) -> String {
        let stamps = self.context.snapshot();
        format!(
            "==================== LOG FILE ====================\n\
             Created: {}\n\
             Environment: {}\n\
             App Version: {}\n\
             Device: {}\n\
             ==================================================\n",
            created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.context.environment(),
            stamps.app_version.as_deref().unwrap_or("unknown"),
            stamps.device_info.as_deref().unwrap_or("unknown"),
        )
    }
}
