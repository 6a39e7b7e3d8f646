//! JSON and CSV export of record sets

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::query::TimeRange;
use super::record::LogRecord;
use crate::context::Environment;
use crate::error::Result;

/// CSV header row
pub const CSV_HEADER: &str =
    "Timestamp,Level,User,Message,Error,StackTrace,DeviceInfo,AppVersion,Environment,Metadata";

/// JSON export envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExport {
    pub export_timestamp: DateTime<Utc>,
    pub environment: Environment,
    pub app_version: Option<String>,
    pub device_info: Option<String>,
    pub total_records: usize,
    /// Time range the records were filtered by, if any
    pub time_range: Option<TimeRange>,
    pub logs: Vec<LogRecord>,
}

impl JsonExport {
    pub fn new(
        export_timestamp: DateTime<Utc>,
        environment: Environment,
        app_version: Option<String>,
        device_info: Option<String>,
        time_range: Option<TimeRange>,
        logs: Vec<LogRecord>,
    ) -> Self {
        Self {
            export_timestamp,
            environment,
            app_version,
            device_info,
            total_records: logs.len(),
            time_range,
            logs,
        }
    }

    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Quote a CSV field if it contains a comma, quote or line break
///
/// Inner quotes are doubled.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render records as CSV, one row per record in input order
pub fn to_csv(records: &[LogRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for record in records {
        let metadata = record
            .metadata()
            .and_then(|m| serde_json::to_string(m).ok())
            .unwrap_or_default();
        let timestamp = record
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let fields = [
            timestamp.as_str(),
            record.level().as_str(),
            record.user_context().unwrap_or(""),
            record.message(),
            record.error_summary().unwrap_or(""),
            record.stack_trace().unwrap_or(""),
            record.device_info().unwrap_or(""),
            record.app_version().unwrap_or(""),
            record.environment().as_str(),
            metadata.as_str(),
        ];

        let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}
