//! Console sink and internal failure reporting
//!
//! Records are forwarded to `tracing`; whatever subscriber the host installed
//! decides where they end up. [`init_console_logging`] installs a stderr
//! subscriber for binaries that have none.

use anyhow::{Context as _, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::record::{LogLevel, LogRecord};
use crate::error::LogError;

const CONSOLE_TARGET: &str = "devicelog::console";
const ENGINE_TARGET: &str = "devicelog::engine";

/// Forward a record to `tracing` at the matching level
///
/// `tracing` has no verbose or critical level: verbose maps to TRACE and critical
/// to ERROR with `critical = true`.
pub fn emit(record: &LogRecord) {
    let user = record.user_context().unwrap_or("anonymous");
    let version = record.app_version().unwrap_or("unknown");
    let message = record.message();

    match record.level() {
        LogLevel::Verbose => {
            tracing::trace!(target: CONSOLE_TARGET, user, version, "{}", message)
        }
        LogLevel::Debug => {
            tracing::debug!(target: CONSOLE_TARGET, user, version, "{}", message)
        }
        LogLevel::Info => {
            tracing::info!(target: CONSOLE_TARGET, user, version, "{}", message)
        }
        LogLevel::Warning => {
            tracing::warn!(target: CONSOLE_TARGET, user, version, "{}", message)
        }
        LogLevel::Error => tracing::error!(
            target: CONSOLE_TARGET,
            user,
            version,
            error = record.error_summary(),
            "{}",
            message
        ),
        LogLevel::Critical => tracing::error!(
            target: CONSOLE_TARGET,
            critical = true,
            user,
            version,
            error = record.error_summary(),
            "{}",
            message
        ),
    }
}

/// Report an internal failure on the console only
pub fn report_failure(error: &LogError, context: &str) {
    tracing::warn!(target: ENGINE_TARGET, "{}", error.describe(context));
}

/// Install a stderr subscriber filtered by `RUST_LOG`, or `default_filter` when unset
pub fn init_console_logging(default_filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .context("Failed to install console logging")?;

    Ok(())
}
