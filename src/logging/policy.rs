//! Per-environment retention policy
//!
//! Resolution is pure and total: every environment maps to a complete profile.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::record::LogLevel;
use crate::context::Environment;

const DAY: u64 = 24 * 60 * 60;
const MIB: u64 = 1024 * 1024;

/// Destination for a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sink {
    Console,
    File,
    DurableBuffer,
}

/// Which levels and sinks are active, and the limits of the file and buffer tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub environment: Environment,
    pub enabled_sinks: BTreeSet<Sink>,
    pub enabled_levels: BTreeSet<LogLevel>,
    /// Active file is rotated once it reaches this size
    pub max_file_bytes: u64,
    /// Durable buffer capacity
    pub max_buffer_entries: usize,
    pub file_name_prefix: String,
    /// Maximum age of the active file and of archives
    pub retention: Duration,
}

impl RetentionPolicy {
    /// Canonical profile for an environment
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self {
                environment,
                enabled_sinks: [Sink::File, Sink::DurableBuffer].into(),
                enabled_levels: [
                    LogLevel::Info,
                    LogLevel::Warning,
                    LogLevel::Error,
                    LogLevel::Critical,
                ]
                .into(),
                max_file_bytes: 5 * MIB,
                max_buffer_entries: 100,
                file_name_prefix: "prod_app_log_".to_string(),
                retention: Duration::from_secs(30 * DAY),
            },
            Environment::Staging => Self {
                environment,
                enabled_sinks: [Sink::Console, Sink::File, Sink::DurableBuffer].into(),
                enabled_levels: LogLevel::ALL
                    .into_iter()
                    .filter(|l| *l >= LogLevel::Debug)
                    .collect(),
                max_file_bytes: 5 * MIB,
                max_buffer_entries: 500,
                file_name_prefix: "staging_app_log_".to_string(),
                retention: Duration::from_secs(14 * DAY),
            },
            Environment::Development => Self {
                environment,
                enabled_sinks: [Sink::Console, Sink::File, Sink::DurableBuffer].into(),
                enabled_levels: LogLevel::ALL.into(),
                max_file_bytes: 10 * MIB,
                max_buffer_entries: 1000,
                file_name_prefix: "dev_app_log_".to_string(),
                retention: Duration::from_secs(7 * DAY),
            },
        }
    }

    /// Resolve from a raw environment tag
    pub fn for_tag(tag: &str) -> Self {
        Self::for_environment(Environment::from_tag(tag))
    }

    pub fn level_enabled(&self, level: LogLevel) -> bool {
        self.enabled_levels.contains(&level)
    }

    pub fn sink_enabled(&self, sink: Sink) -> bool {
        self.enabled_sinks.contains(&sink)
    }

    /// Retention as a chrono duration, for timestamp arithmetic
    pub fn retention_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX)
    }

    /// Summary for health reports
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            environment: self.environment,
            enabled_sinks: self.enabled_sinks.iter().copied().collect(),
            enabled_levels: self.enabled_levels.iter().copied().collect(),
            max_file_bytes: self.max_file_bytes,
            max_buffer_entries: self.max_buffer_entries,
            retention_secs: self.retention.as_secs(),
            file_name_prefix: self.file_name_prefix.clone(),
        }
    }
}

/// Serializable view of a resolved policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub environment: Environment,
    pub enabled_sinks: Vec<Sink>,
    pub enabled_levels: Vec<LogLevel>,
    pub max_file_bytes: u64,
    pub max_buffer_entries: usize,
    pub retention_secs: u64,
    pub file_name_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_profile() {
        let policy = RetentionPolicy::for_environment(Environment::Production);
        assert!(!policy.sink_enabled(Sink::Console));
        assert!(policy.sink_enabled(Sink::File));
        assert!(policy.sink_enabled(Sink::DurableBuffer));
        assert!(!policy.level_enabled(LogLevel::Debug));
        assert!(policy.level_enabled(LogLevel::Critical));
        assert_eq!(policy.max_buffer_entries, 100);
        assert_eq!(policy.retention, Duration::from_secs(30 * DAY));
    }

    #[test]
    fn test_staging_profile() {
        let policy = RetentionPolicy::for_environment(Environment::Staging);
        assert!(policy.sink_enabled(Sink::Console));
        assert!(!policy.level_enabled(LogLevel::Verbose));
        assert!(policy.level_enabled(LogLevel::Debug));
        assert_eq!(policy.retention, Duration::from_secs(14 * DAY));
    }

    #[test]
    fn test_development_profile_is_most_permissive() {
        let dev = RetentionPolicy::for_environment(Environment::Development);
        let staging = RetentionPolicy::for_environment(Environment::Staging);
        let prod = RetentionPolicy::for_environment(Environment::Production);

        assert_eq!(dev.enabled_levels.len(), LogLevel::ALL.len());
        assert!(dev.max_buffer_entries > staging.max_buffer_entries);
        assert!(staging.max_buffer_entries > prod.max_buffer_entries);
        assert!(dev.retention < staging.retention);
        assert!(staging.retention < prod.retention);
    }

    #[test]
    fn test_unknown_tag_falls_back_to_development() {
        assert_eq!(
            RetentionPolicy::for_tag("unknown"),
            RetentionPolicy::for_environment(Environment::Development)
        );
    }

    #[test]
    fn test_every_profile_has_positive_limits() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ] {
            let policy = RetentionPolicy::for_environment(env);
            assert!(policy.max_file_bytes > 0);
            assert!(policy.max_buffer_entries > 0);
            assert!(!policy.file_name_prefix.is_empty());
        }
    }
}
