//! Filtering and aggregation over buffered records
//!
//! Filters are conjunctive: a record must satisfy every supplied predicate, and an
//! omitted predicate matches everything.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{LogLevel, LogRecord};

/// Inclusive time bounds; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Everything at or after `start`
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

/// Record predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub time_range: Option<TimeRange>,
    pub levels: Option<BTreeSet<LogLevel>>,
    pub user_context: Option<String>,
    /// Case-insensitive substring of the message
    pub text_contains: Option<String>,
    pub device_info: Option<String>,
    pub app_version: Option<String>,
}

impl RecordFilter {
    /// Filter that matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user_context = Some(user.into());
        self
    }

    pub fn text(mut self, needle: impl Into<String>) -> Self {
        self.text_contains = Some(needle.into());
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device_info = Some(device.into());
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Check a single record against every supplied predicate
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(range) = &self.time_range {
            if !range.contains(record.timestamp()) {
                return false;
            }
        }
        if let Some(levels) = &self.levels {
            if !levels.contains(&record.level()) {
                return false;
            }
        }
        if let Some(user) = &self.user_context {
            if record.user_context() != Some(user.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.text_contains {
            if !record
                .message()
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(device) = &self.device_info {
            if record.device_info() != Some(device.as_str()) {
                return false;
            }
        }
        if let Some(version) = &self.app_version {
            if record.app_version() != Some(version.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Records satisfying the filter, in input order
pub fn filter(records: &[LogRecord], filter: &RecordFilter) -> Vec<LogRecord> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

/// Aggregated statistics over a record set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub by_user: BTreeMap<String, usize>,
    pub by_device: BTreeMap<String, usize>,
    /// Records at error or critical level
    pub error_count: usize,
    pub unique_users: BTreeSet<String>,
    pub unique_devices: BTreeSet<String>,
    /// Earliest and latest timestamps; `None` for an empty set
    pub time_span: Option<TimeRange>,
}

impl StatisticsReport {
    /// Add a record to the aggregation
    pub fn add_record(&mut self, record: &LogRecord) {
        self.total += 1;
        *self.by_level.entry(record.level()).or_default() += 1;

        if let Some(user) = record.user_context() {
            *self.by_user.entry(user.to_string()).or_default() += 1;
            self.unique_users.insert(user.to_string());
        }
        if let Some(device) = record.device_info() {
            *self.by_device.entry(device.to_string()).or_default() += 1;
            self.unique_devices.insert(device.to_string());
        }
        if record.level().is_severe() {
            self.error_count += 1;
        }

        let at = record.timestamp();
        self.time_span = Some(match self.time_span {
            Some(TimeRange {
                start: Some(start),
                end: Some(end),
            }) => TimeRange::new(Some(start.min(at)), Some(end.max(at))),
            _ => TimeRange::new(Some(at), Some(at)),
        });
    }

    pub fn count_for(&self, level: LogLevel) -> usize {
        self.by_level.get(&level).copied().unwrap_or(0)
    }
}

/// Calculate statistics in a single pass
pub fn statistics(records: &[LogRecord]) -> StatisticsReport {
    let mut report = StatisticsReport::default();
    for record in records {
        report.add_record(record);
    }
    report
}
