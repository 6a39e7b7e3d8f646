//! Error types for the logging engine
//!
//! Every internal operation returns [`Result`]. The engine converts failures into
//! console reports at its public boundary so callers never see them.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "Disk full - free space needed to keep logging",
            DiskErrorKind::PermissionDenied => "Permission denied",
            DiskErrorKind::NotFound => "File or directory not found",
            DiskErrorKind::Other => "Failed to write log data",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull => DiskErrorKind::DiskFull,
        // On some systems, disk full appears as WriteZero
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,

        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,

        ErrorKind::NotFound => DiskErrorKind::NotFound,

        // Check raw OS error for disk full on Unix
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28 on Linux and macOS
                    // EDQUOT = 122 on Linux, 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &std::io::Error, context: &str) -> String {
    let kind = categorize_io_error(e);
    match kind {
        DiskErrorKind::DiskFull | DiskErrorKind::PermissionDenied => {
            format!("{}: {}", context, kind.user_message())
        }
        DiskErrorKind::NotFound => format!("{}: file or directory not found", context),
        DiskErrorKind::Other => format!("{}: {}", context, e),
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Key-value store error: {0}")]
    KeyValue(String),
}

impl LogError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Human-readable description for console reports
    ///
    /// I/O errors are categorized (disk full, permission denied, ...) so the report
    /// says what the operator can actually do about it.
    pub fn describe(&self, context: &str) -> String {
        match self {
            LogError::Io { path, source } => {
                format!(
                    "{} ({})",
                    friendly_io_error_message(source, context),
                    path.display()
                )
            }
            other => format!("{}: {}", context, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
