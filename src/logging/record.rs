//! Log record model
//!
//! A [`LogRecord`] is immutable once built: fields are private and only readable.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{Context, Environment};

/// Severity of a log record, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// All levels in ascending severity
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    /// Get the display name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Error or critical: these records also go to the durable buffer
    pub fn is_severe(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }

    /// Parse a level name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Some(LogLevel::Verbose),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" | "fatal" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

/// Optional error details and metadata supplied with an emission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogOptions {
    pub error_summary: Option<String>,
    pub stack_trace: Option<String>,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl LogOptions {
    /// Capture an error: `Display` becomes the summary and the `source()` chain
    /// becomes the stack trace
    pub fn with_error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        self.error_summary = Some(error.to_string());

        let mut chain = String::new();
        let mut source = error.source();
        while let Some(cause) = source {
            if !chain.is_empty() {
                chain.push('\n');
            }
            let _ = write!(chain, "caused by: {}", cause);
            source = cause.source();
        }
        if !chain.is_empty() {
            self.stack_trace = Some(chain);
        }
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    /// Attach one metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A single log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_context: Option<String>,
    environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_version: Option<String>,
}

impl LogRecord {
    /// Build a record stamped with the context's time, environment and stamps
    pub fn capture(
        context: &Context,
        level: LogLevel,
        message: impl Into<String>,
        options: LogOptions,
    ) -> Self {
        let stamps = context.snapshot();
        Self {
            timestamp: context.now(),
            level,
            message: message.into(),
            user_context: stamps.current_user,
            environment: context.environment(),
            error_summary: options.error_summary,
            stack_trace: options.stack_trace,
            metadata: options.metadata,
            device_info: stamps.device_info,
            app_version: stamps.app_version,
        }
    }

    /// Start a record with explicit fields (imports, tests)
    pub fn builder(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: impl Into<String>,
        environment: Environment,
    ) -> LogRecordBuilder {
        LogRecordBuilder {
            record: Self {
                timestamp,
                level,
                message: message.into(),
                user_context: None,
                environment,
                error_summary: None,
                stack_trace: None,
                metadata: None,
                device_info: None,
                app_version: None,
            },
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_context(&self) -> Option<&str> {
        self.user_context.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn error_summary(&self) -> Option<&str> {
        self.error_summary.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.metadata.as_ref()
    }

    pub fn device_info(&self) -> Option<&str> {
        self.device_info.as_deref()
    }

    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    /// Render for the log file: one header line plus indented continuation lines
    pub fn render_line(&self) -> String {
        let mut out = format!(
            "[{}] [{}] [{}] [{}] {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_str(),
            self.user_context.as_deref().unwrap_or("anonymous"),
            self.app_version.as_deref().unwrap_or("unknown"),
            self.message
        );

        if let Some(error) = &self.error_summary {
            let _ = writeln!(out, "  Error: {}", error);
        }
        if let Some(trace) = &self.stack_trace {
            let _ = writeln!(out, "  StackTrace: {}", trace);
        }
        if let Some(metadata) = self.metadata.as_ref().filter(|m| !m.is_empty()) {
            if let Ok(json) = serde_json::to_string(metadata) {
                let _ = writeln!(out, "  Metadata: {}", json);
            }
        }
        if let Some(device) = &self.device_info {
            let _ = writeln!(out, "  Device: {}", device);
        }

        out
    }
}

/// Builder for records with explicit fields
#[derive(Debug, Clone)]
pub struct LogRecordBuilder {
    record: LogRecord,
}

impl LogRecordBuilder {
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.record.user_context = Some(user.into());
        self
    }

    pub fn error_summary(mut self, error: impl Into<String>) -> Self {
        self.record.error_summary = Some(error.into());
        self
    }

    pub fn stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.record.stack_trace = Some(trace.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.record
            .metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.record.device_info = Some(device.into());
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.record.app_version = Some(version.into());
        self
    }

    pub fn build(self) -> LogRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 21, 14, 30, 45).unwrap()
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Verbose < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
    }

    #[test]
    fn test_level_is_severe() {
        assert!(!LogLevel::Verbose.is_severe());
        assert!(!LogLevel::Info.is_severe());
        assert!(!LogLevel::Warning.is_severe());
        assert!(LogLevel::Error.is_severe());
        assert!(LogLevel::Critical.is_severe());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("critical"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_capture_copies_context() {
        let context = Context::with_clock(
            Environment::Staging,
            Box::new(ManualClock::new(sample_time())),
        );
        context.set_current_user(Some("u1".to_string()));
        context.set_app_version(Some("1.4.0".to_string()));

        let record = LogRecord::capture(&context, LogLevel::Info, "hello", LogOptions::default());
        context.set_current_user(Some("u2".to_string()));

        assert_eq!(record.timestamp(), sample_time());
        assert_eq!(record.user_context(), Some("u1"));
        assert_eq!(record.environment(), Environment::Staging);
        assert_eq!(record.app_version(), Some("1.4.0"));
        assert!(record.device_info().is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let record = LogRecord::builder(sample_time(), LogLevel::Error, "upload failed", Environment::Production)
            .user("u1")
            .error_summary("timeout")
            .stack_trace("caused by: connection reset")
            .metadata("attempt", 3)
            .metadata("tags", serde_json::json!(["ftp", "retry"]))
            .device("iPhone 15")
            .app_version("3.0.1")
            .build();

        let json = serde_json::to_string(&record).unwrap();
        let parsed: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_round_trip_minimal_record() {
        let record = LogRecord::builder(sample_time(), LogLevel::Verbose, "", Environment::Development).build();
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("user_context"));
        let parsed: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_render_line() {
        let record = LogRecord::builder(sample_time(), LogLevel::Warning, "low disk", Environment::Production)
            .error_summary("ENOSPC")
            .metadata("free_mb", 12)
            .device("Pixel 8")
            .build();

        let rendered = record.render_line();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines[0],
            "[2026-01-21T14:30:45.000Z] [WARNING] [anonymous] [unknown] low disk"
        );
        assert_eq!(lines[1], "  Error: ENOSPC");
        assert_eq!(lines[2], "  Metadata: {\"free_mb\":12}");
        assert_eq!(lines[3], "  Device: Pixel 8");
        assert_eq!(lines.len(), 4);
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sync failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_options_with_error_chain() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "socket closed"));
        let options = LogOptions::default().with_error(&err);

        assert_eq!(options.error_summary.as_deref(), Some("sync failed"));
        assert_eq!(options.stack_trace.as_deref(), Some("caused by: socket closed"));
    }
}
