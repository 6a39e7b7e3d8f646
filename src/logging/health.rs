//! Health snapshot of the file and buffer tiers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::buffer::DurableBuffer;
use super::file_writer::{LogFileInfo, RotationManager};
use super::policy::{PolicySummary, RetentionPolicy, Sink};
use super::query::{self, RecordFilter, StatisticsReport, TimeRange};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    /// Active log file; `None` when the file sink is disabled or no file is open
    pub current_file: Option<LogFileInfo>,
    /// Buffered records from the last 24 hours
    pub last_24h: Option<StatisticsReport>,
    pub configuration: PolicySummary,
    /// Failure description when unhealthy
    pub error: Option<String>,
    pub rotations: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Build a health report without touching the log file
///
/// Failures produce an unhealthy report instead of an error.
pub async fn check(
    rotation: &RotationManager,
    buffer: &DurableBuffer,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> HealthReport {
    let mut report = HealthReport {
        status: HealthStatus::Healthy,
        checked_at: now,
        current_file: None,
        last_24h: None,
        configuration: policy.summary(),
        error: None,
        rotations: rotation.rotation_count(),
    };

    match collect(rotation, buffer, policy, now).await {
        Ok((current_file, last_24h)) => {
            report.current_file = current_file;
            report.last_24h = Some(last_24h);
        }
        Err(e) => {
            report.status = HealthStatus::Unhealthy;
            report.error = Some(e.to_string());
        }
    }

    if report.error.is_none() && policy.sink_enabled(Sink::File) {
        if let Some(failure) = rotation.last_failure() {
            report.status = HealthStatus::Unhealthy;
            report.error = Some(failure);
        }
    }

    report
}

async fn collect(
    rotation: &RotationManager,
    buffer: &DurableBuffer,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<(Option<LogFileInfo>, StatisticsReport)> {
    let current_file = if policy.sink_enabled(Sink::File) {
        rotation.status().await?
    } else {
        None
    };

    let records = buffer.read_all().await?;
    let recent = RecordFilter::all().time_range(TimeRange::since(now - Duration::hours(24)));
    let last_24h = query::statistics(&query::filter(&records, &recent));

    Ok((current_file, last_24h))
}
