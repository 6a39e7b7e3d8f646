//! Logging engine
//!
//! Gates records by the retention policy and fans them out to the console, the
//! rotating file and (for error and critical) the durable buffer. Public methods
//! never return errors: failures are reported on the console and the affected
//! sink drops the record.

use std::sync::Arc;

use super::buffer::DurableBuffer;
use super::console;
use super::export::{self, JsonExport};
use super::file_writer::{LogFileInfo, RotationManager};
use super::health::{self, HealthReport};
use super::policy::{RetentionPolicy, Sink};
use super::query::{self, RecordFilter, StatisticsReport, TimeRange};
use super::record::{LogLevel, LogOptions, LogRecord};
use crate::config::Config;
use crate::context::Context;
use crate::storage::{FileStore, JsonFileKvStore, KeyValueStore, LocalFileStore};

/// Key holding the persisted current user identifier
pub const CURRENT_USER_KEY: &str = "current_user_id";

pub struct LogEngine {
    policy: RetentionPolicy,
    context: Arc<Context>,
    rotation: RotationManager,
    buffer: DurableBuffer,
    kv: Arc<dyn KeyValueStore>,
}

impl LogEngine {
    /// Start an engine over the given stores
    ///
    /// Restores the persisted current user, opens the log file and prunes expired
    /// archives. Failures leave the engine running without the failing tier.
    pub async fn start(
        policy: RetentionPolicy,
        context: Arc<Context>,
        files: Arc<dyn FileStore>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let rotation = RotationManager::new(files, Arc::clone(&context), policy.clone());
        let buffer = DurableBuffer::new(Arc::clone(&kv), policy.max_buffer_entries);

        let engine = Self {
            policy,
            context,
            rotation,
            buffer,
            kv,
        };

        engine.restore_current_user().await;

        if engine.policy.sink_enabled(Sink::File) {
            if let Err(e) = engine.rotation.ensure_file().await {
                console::report_failure(&e, "Failed to open log file, continuing without file logging");
            }
        }
        engine.prune_archives().await;

        tracing::debug!(
            target: "devicelog::engine",
            environment = %engine.context.environment(),
            "Logging engine started"
        );

        engine
    }

    /// Start an engine on the local filesystem as described by the config
    pub async fn from_config(config: &Config) -> Self {
        let context = Arc::new(Context::new(config.environment()));
        context.set_app_version(config.app_version.clone());
        context.set_device_info(config.device_info.clone());

        let files = Arc::new(
            LocalFileStore::new(&config.documents_dir).with_timeout(config.store_timeout()),
        );
        let kv = Arc::new(
            JsonFileKvStore::new(config.kv_store_path()).with_timeout(config.store_timeout()),
        );

        Self::start(config.resolve_policy(), context, files, kv).await
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Emit a record
    ///
    /// Disabled levels are a silent no-op.
    pub async fn log(&self, message: impl Into<String>, level: LogLevel, options: LogOptions) {
        if !self.policy.level_enabled(level) {
            return;
        }

        let record = LogRecord::capture(&self.context, level, message, options);

        if self.policy.sink_enabled(Sink::Console) {
            console::emit(&record);
        }

        if self.policy.sink_enabled(Sink::File) {
            if let Err(e) = self.rotation.append(&record).await {
                console::report_failure(&e, "Failed to write log file");
            }
        }

        if level.is_severe() && self.policy.sink_enabled(Sink::DurableBuffer) {
            if let Err(e) = self.buffer.append(&record).await {
                console::report_failure(&e, "Failed to buffer error record");
            }
        }
    }

    pub async fn verbose(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Verbose, LogOptions::default()).await
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Debug, LogOptions::default()).await
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Info, LogOptions::default()).await
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Warning, LogOptions::default()).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Error, LogOptions::default()).await
    }

    pub async fn critical(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Critical, LogOptions::default()).await
    }

    /// Buffered error and critical records, oldest first
    pub async fn recent_records(&self) -> Vec<LogRecord> {
        match self.buffer.read_all().await {
            Ok(records) => records,
            Err(e) => {
                console::report_failure(&e, "Failed to read buffered records");
                Vec::new()
            }
        }
    }

    pub async fn filtered_records(&self, filter: &RecordFilter) -> Vec<LogRecord> {
        query::filter(&self.recent_records().await, filter)
    }

    /// Statistics over buffered records, optionally restricted to a time range
    pub async fn statistics(&self, range: Option<TimeRange>) -> StatisticsReport {
        let records = self.recent_records().await;
        match range {
            Some(range) => {
                query::statistics(&query::filter(&records, &RecordFilter::all().time_range(range)))
            }
            None => query::statistics(&records),
        }
    }

    /// JSON export of the buffered records matching the filter
    pub async fn export_json(&self, filter: &RecordFilter) -> String {
        let stamps = self.context.snapshot();
        let export = JsonExport::new(
            self.context.now(),
            self.context.environment(),
            stamps.app_version,
            stamps.device_info,
            filter.time_range,
            self.filtered_records(filter).await,
        );

        match export.to_json() {
            Ok(json) => json,
            Err(e) => {
                console::report_failure(&e, "Failed to render JSON export");
                "{}".to_string()
            }
        }
    }

    /// CSV export of the buffered records matching the filter
    pub async fn export_csv(&self, filter: &RecordFilter) -> String {
        export::to_csv(&self.filtered_records(filter).await)
    }

    /// Empty the buffer and delete the active log file and every archive
    pub async fn clear_all(&self) {
        if let Err(e) = self.buffer.clear().await {
            console::report_failure(&e, "Failed to clear buffered records");
        }
        if let Err(e) = self.rotation.delete_all().await {
            console::report_failure(&e, "Failed to delete log files");
        }
    }

    /// Move the active log file into the archive and empty the buffer
    pub async fn archive_and_clear(&self) {
        if let Err(e) = self.rotation.archive_current().await {
            console::report_failure(&e, "Failed to archive log file");
        }
        if let Err(e) = self.buffer.clear().await {
            console::report_failure(&e, "Failed to clear buffered records");
        }
    }

    /// Delete expired archives; returns the number deleted
    pub async fn prune_archives(&self) -> usize {
        match self.rotation.prune_archives().await {
            Ok(count) => count,
            Err(e) => {
                console::report_failure(&e, "Failed to prune log archives");
                0
            }
        }
    }

    /// Active log file, if one is open
    pub async fn current_log_file(&self) -> Option<LogFileInfo> {
        match self.rotation.status().await {
            Ok(info) => info,
            Err(e) => {
                console::report_failure(&e, "Failed to inspect log file");
                None
            }
        }
    }

    pub async fn check_health(&self) -> HealthReport {
        health::check(&self.rotation, &self.buffer, &self.policy, self.context.now()).await
    }

    /// Set the acting user and persist it for the next start
    pub async fn update_current_user(&self, user: Option<String>) {
        self.context.set_current_user(user.clone());

        let persisted = match &user {
            Some(id) => self.kv.set(CURRENT_USER_KEY, id).await,
            None => self.kv.delete(CURRENT_USER_KEY).await,
        };
        if let Err(e) = persisted {
            console::report_failure(&e, "Failed to persist current user");
        }
    }

    pub fn update_device_info(&self, device: Option<String>) {
        self.context.set_device_info(device);
    }

    pub fn update_app_version(&self, version: Option<String>) {
        self.context.set_app_version(version);
    }

    async fn restore_current_user(&self) {
        if self.context.current_user().is_some() {
            return;
        }
        match self.kv.get(CURRENT_USER_KEY).await {
            Ok(Some(user)) => self.context.set_current_user(Some(user)),
            Ok(None) => {}
            Err(e) => console::report_failure(&e, "Failed to restore current user"),
        }
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("policy", &self.policy)
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Environment, ManualClock};
    use crate::logging::buffer::BUFFER_KEY;
    use crate::logging::health::HealthStatus;
    use crate::storage::{MemoryFileStore, MemoryKvStore};
    use crate::logging::file_writer::ARCHIVE_DIR;
    use chrono::{DateTime, TimeZone, Utc};
    use std::path::Path;

    fn archive_dir() -> &'static Path {
        Path::new(ARCHIVE_DIR)
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    struct Harness {
        clock: Arc<ManualClock>,
        files: Arc<MemoryFileStore>,
        kv: Arc<MemoryKvStore>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(start_time()));
            Self {
                files: Arc::new(MemoryFileStore::new(clock.clone())),
                kv: Arc::new(MemoryKvStore::new()),
                clock,
            }
        }

        async fn engine(&self, policy: RetentionPolicy) -> LogEngine {
            let context = Arc::new(Context::with_clock(
                policy.environment,
                Box::new(Arc::clone(&self.clock)),
            ));
            LogEngine::start(policy, context, self.files.clone(), self.kv.clone()).await
        }

        async fn active_file_contents(&self, engine: &LogEngine) -> String {
            let info = engine.current_log_file().await.unwrap();
            self.files.read_to_string(&info.path).await.unwrap()
        }
    }

    fn dev_policy() -> RetentionPolicy {
        RetentionPolicy::for_environment(Environment::Development)
    }

    #[tokio::test]
    async fn test_end_to_end_level_gating() {
        let h = Harness::new();
        let mut policy = dev_policy();
        policy.enabled_levels = [LogLevel::Info, LogLevel::Error].into();
        let engine = h.engine(policy).await;

        engine.debug("debug detail").await;
        engine.info("user opened settings").await;
        engine.error("upload failed").await;

        let recent = engine.recent_records().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message(), "upload failed");
        assert_eq!(recent[0].level(), LogLevel::Error);

        let contents = h.active_file_contents(&engine).await;
        assert!(!contents.contains("debug detail"));
        assert!(contents.contains("[INFO] [anonymous] [unknown] user opened settings"));
        assert!(contents.contains("[ERROR] [anonymous] [unknown] upload failed"));

        let health = engine.check_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.error.is_none());
        assert_eq!(health.last_24h.as_ref().unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_warning_is_not_buffered() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.warning("slow response").await;
        engine.critical("database corrupted").await;

        let recent = engine.recent_records().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].level(), LogLevel::Critical);
    }

    #[tokio::test]
    async fn test_disabled_buffer_sink() {
        let h = Harness::new();
        let mut policy = dev_policy();
        policy.enabled_sinks = [Sink::File].into();
        let engine = h.engine(policy).await;

        engine.error("only in file").await;

        assert!(engine.recent_records().await.is_empty());
        assert!(h.active_file_contents(&engine).await.contains("only in file"));
    }

    #[tokio::test]
    async fn test_buffer_capacity_from_policy() {
        let h = Harness::new();
        let mut policy = dev_policy();
        policy.max_buffer_entries = 3;
        let engine = h.engine(policy).await;

        for i in 0..5 {
            engine.error(format!("failure {}", i)).await;
        }

        let messages: Vec<String> = engine
            .recent_records()
            .await
            .iter()
            .map(|r| r.message().to_string())
            .collect();
        assert_eq!(messages, vec!["failure 2", "failure 3", "failure 4"]);
    }

    #[tokio::test]
    async fn test_file_failure_still_buffers() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;
        h.files.set_fail_writes(true);

        engine.error("disk is read-only").await;

        let recent = engine.recent_records().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message(), "disk is read-only");
    }

    #[tokio::test]
    async fn test_start_with_failing_file_store_is_degraded_not_fatal() {
        let h = Harness::new();
        h.files.set_fail_writes(true);
        let engine = h.engine(dev_policy()).await;

        engine.info("lost line").await;
        assert!(engine.current_log_file().await.is_none());

        let health = engine.check_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error.unwrap().contains("writes disabled"));

        h.files.set_fail_writes(false);
        engine.info("recovered").await;
        assert!(h.active_file_contents(&engine).await.contains("recovered"));
        assert!(engine.check_health().await.is_healthy());
    }

    #[tokio::test]
    async fn test_health_reports_utilization() {
        let h = Harness::new();
        let mut policy = dev_policy();
        policy.max_file_bytes = 1000;
        let engine = h.engine(policy).await;

        let health = engine.check_health().await;
        let file = health.current_file.unwrap();
        assert_eq!(file.created_at, start_time());
        let expected = file.size_bytes as f64 / 1000.0 * 100.0;
        assert!((file.utilization_percent - expected).abs() < f64::EPSILON);
        assert_eq!(health.configuration.max_file_bytes, 1000);
    }

    #[tokio::test]
    async fn test_health_window_is_last_24_hours() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.error("yesterday").await;
        h.clock.advance(chrono::Duration::hours(25));
        engine.error("today").await;

        let health = engine.check_health().await;
        assert_eq!(health.last_24h.unwrap().total, 1);
        assert_eq!(engine.statistics(None).await.total, 2);
    }

    #[tokio::test]
    async fn test_health_check_does_not_open_a_file() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;
        engine.archive_and_clear().await;

        let health = engine.check_health().await;
        assert!(health.is_healthy());
        assert!(health.current_file.is_none());

        let paths = h.files.paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with(archive_dir()));
    }

    #[tokio::test]
    async fn test_health_after_external_delete() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;
        let active = engine.current_log_file().await.unwrap().path;
        h.files.delete(&active).await.unwrap();

        let health = engine.check_health().await;
        assert!(health.is_healthy());
        assert!(health.current_file.is_none());

        engine.info("back again").await;
        assert!(h.active_file_contents(&engine).await.contains("back again"));
    }

    #[tokio::test]
    async fn test_current_user_is_stamped_and_persisted() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.update_current_user(Some("u1".to_string())).await;
        engine.update_device_info(Some("Pixel 8".to_string()));
        engine.update_app_version(Some("3.2.0".to_string()));
        engine.error("payment declined").await;

        let record = &engine.recent_records().await[0];
        assert_eq!(record.user_context(), Some("u1"));
        assert_eq!(record.device_info(), Some("Pixel 8"));
        assert_eq!(record.app_version(), Some("3.2.0"));
        assert!(h
            .active_file_contents(&engine)
            .await
            .contains("[ERROR] [u1] [3.2.0] payment declined\n  Device: Pixel 8\n"));

        // A new engine over the same stores picks the user back up
        drop(engine);
        let restarted = h.engine(dev_policy()).await;
        assert_eq!(restarted.context().current_user().as_deref(), Some("u1"));

        restarted.update_current_user(None).await;
        assert_eq!(h.kv.get(CURRENT_USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_options_reach_every_tier() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "ftp timed out");
        let options = LogOptions::default()
            .with_error(&io)
            .with_stack_trace("at sync::upload")
            .with_metadata("file", "report.pdf");
        engine.log("upload failed", LogLevel::Error, options).await;

        let record = &engine.recent_records().await[0];
        assert_eq!(record.error_summary(), Some("ftp timed out"));
        assert_eq!(record.stack_trace(), Some("at sync::upload"));
        assert_eq!(
            record.metadata().unwrap().get("file"),
            Some(&serde_json::json!("report.pdf"))
        );

        let contents = h.active_file_contents(&engine).await;
        assert!(contents.contains("  Error: ftp timed out\n"));
        assert!(contents.contains("  StackTrace: at sync::upload\n"));
        assert!(contents.contains("  Metadata: {\"file\":\"report.pdf\"}\n"));
    }

    #[tokio::test]
    async fn test_filtered_records_and_exports() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.update_current_user(Some("u1".to_string())).await;
        engine.error("checkout failed, retrying").await;
        engine.update_current_user(Some("u2".to_string())).await;
        engine.critical("crash").await;

        let u1 = engine.filtered_records(&RecordFilter::all().user("u1")).await;
        assert_eq!(u1.len(), 1);

        let csv = engine.export_csv(&RecordFilter::all().user("u1")).await;
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",ERROR,u1,\"checkout failed, retrying\","));

        let json = engine
            .export_json(&RecordFilter::all().time_range(TimeRange::since(start_time())))
            .await;
        let parsed: JsonExport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_records, 2);
        assert_eq!(parsed.environment, Environment::Development);
        assert_eq!(parsed.time_range, Some(TimeRange::since(start_time())));
    }

    #[tokio::test]
    async fn test_statistics_with_range() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.error("first").await;
        h.clock.advance(chrono::Duration::minutes(10));
        engine.error("second").await;

        let range = TimeRange::since(start_time() + chrono::Duration::minutes(5));
        let report = engine.statistics(Some(range)).await;
        assert_eq!(report.total, 1);
        assert_eq!(report.error_count, 1);
    }

    #[tokio::test]
    async fn test_archive_and_clear() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.error("before archive").await;
        let original = engine.current_log_file().await.unwrap().path;

        engine.archive_and_clear().await;

        assert!(engine.recent_records().await.is_empty());
        assert!(engine.current_log_file().await.is_none());
        let archived = h.files.list_directory(archive_dir()).await.unwrap();
        assert_eq!(archived, vec![archive_dir().join(original.file_name().unwrap())]);

        h.clock.advance(chrono::Duration::seconds(1));
        engine.info("after archive").await;
        assert!(h.active_file_contents(&engine).await.contains("after archive"));
    }

    #[tokio::test]
    async fn test_clear_all() {
        let h = Harness::new();
        let engine = h.engine(dev_policy()).await;

        engine.error("one").await;
        engine.archive_and_clear().await;
        h.clock.advance(chrono::Duration::seconds(1));
        engine.error("two").await;

        engine.clear_all().await;

        assert!(engine.recent_records().await.is_empty());
        assert!(h.files.paths().is_empty());
        assert_eq!(h.kv.get(BUFFER_KEY).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_start_prunes_expired_archives() {
        let h = Harness::new();
        let stale = archive_dir().join("dev_app_log_stale.log");
        let fresh = archive_dir().join("dev_app_log_fresh.log");
        h.files.create_file(&stale, b"stale").await.unwrap();
        h.files.create_file(&fresh, b"fresh").await.unwrap();
        h.files
            .set_modified(&stale, start_time() - chrono::Duration::days(8));

        let _engine = h.engine(dev_policy()).await;

        assert!(!h.files.exists(&stale).await.unwrap());
        assert!(h.files.exists(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_buffer_does_not_break_queries() {
        let h = Harness::new();
        h.kv.set(BUFFER_KEY, "{{{").await.unwrap();
        let engine = h.engine(dev_policy()).await;

        assert!(engine.recent_records().await.is_empty());
        engine.error("after corruption").await;
        assert_eq!(engine.recent_records().await.len(), 1);
        assert!(engine.check_health().await.is_healthy());
    }

    #[tokio::test]
    async fn test_concurrent_errors_are_all_buffered() {
        let h = Harness::new();
        let engine = Arc::new(h.engine(dev_policy()).await);

        let mut handles = Vec::new();
        for i in 0..25 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.error(format!("concurrent {}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(engine.recent_records().await.len(), 25);
        let contents = h.active_file_contents(&engine).await;
        assert_eq!(contents.matches("concurrent").count(), 25);
    }
}
