//! Archive retention management
//!
//! Handles cleanup of archived log files based on age.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::storage::FileStore;

/// Delete archived files last modified more than `retention` before `now`
///
/// Files that cannot be inspected or deleted are skipped. Returns the number of
/// files deleted.
pub async fn prune_archives(
    files: &dyn FileStore,
    archive_dir: &Path,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<usize> {
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return Ok(0);
    };

    let mut deleted_count = 0;

    for path in files.list_directory(archive_dir).await? {
        let modified = match files.last_modified(&path).await {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!(target: "devicelog::file", path = %path.display(), error = %e, "Skipping archive");
                continue;
            }
        };

        if modified < cutoff && files.delete(&path).await.is_ok() {
            deleted_count += 1;
        }
    }

    if deleted_count > 0 {
        tracing::info!(target: "devicelog::file", "Pruned {} expired log archives", deleted_count);
    }

    Ok(deleted_count)
}
