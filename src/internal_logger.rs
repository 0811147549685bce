use crate::app_config::Settings;
use crate::errors::TrackerError;
use std::str::FromStr;
use std::sync::Arc;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Initializes the diagnostics logger: rolling daily file always, stderr
/// layer in debug builds. Tracking itself must keep working if this fails,
/// so callers treat the error as non-fatal.
pub fn init_logging(settings: &Arc<Settings>) -> Result<(), TrackerError> {
    let file_log_level_filter = EnvFilter::from_str(&settings.internal_log_level).map_err(|e| {
        TrackerError::Config(format!(
            "Invalid internal_log_level '{}': {}",
            settings.internal_log_level, e
        ))
    })?;

    let log_dir = &settings.internal_log_file_dir;
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            TrackerError::Initialization(format!(
                "Failed to create log directory {:?}: {}",
                log_dir, e
            ))
        })?;
    }

    let file_appender = rolling::daily(log_dir, &settings.internal_log_file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_filter(file_log_level_filter);

    let subscriber = tracing_subscriber::registry().with(file_layer);

    #[cfg(debug_assertions)]
    let subscriber = {
        let console_log_level_filter =
            EnvFilter::from_str(&settings.internal_log_level).map_err(|e| {
                TrackerError::Config(format!(
                    "Invalid internal_log_level '{}': {}",
                    settings.internal_log_level, e
                ))
            })?;
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_log_level_filter);
        subscriber.with(console_layer)
    };

    subscriber.try_init().map_err(|e| {
        TrackerError::Initialization(format!("Failed to set global tracing subscriber: {}", e))
    })?;

    // The guard must outlive the process for the non-blocking writer to keep
    // draining; the tracker has no natural owner for it.
    std::mem::forget(guard);

    tracing::info!(
        "View tracker diagnostics logger initialized. Level: {}, Directory: {:?}",
        settings.internal_log_level,
        settings.internal_log_file_dir
    );

    Ok(())
}
