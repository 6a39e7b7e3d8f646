//! Logging engine for devicelog
//!
//! Records flow through three sinks gated by an environment retention policy:
//! the console (via `tracing`), a size- and age-rotated log file, and a bounded
//! durable buffer of error and critical records that can be queried and exported.

mod buffer;
mod console;
mod engine;
mod export;
mod file_writer;
mod health;
mod policy;
mod query;
mod record;
mod retention;

pub use buffer::{DurableBuffer, BUFFER_KEY};
pub use console::init_console_logging;
pub use engine::{LogEngine, CURRENT_USER_KEY};
pub use export::{escape_csv_field, to_csv, JsonExport, CSV_HEADER};
pub use file_writer::{log_file_name, LogFileInfo, RotationManager, ARCHIVE_DIR};
pub use health::{HealthReport, HealthStatus};
pub use policy::{PolicySummary, RetentionPolicy, Sink};
pub use query::{filter, statistics, RecordFilter, StatisticsReport, TimeRange};
pub use record::{LogLevel, LogOptions, LogRecord, LogRecordBuilder};
pub use retention::prune_archives;
