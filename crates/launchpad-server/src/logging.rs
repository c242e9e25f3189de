//! Tracing subscriber setup.
//!
//! Logs always go to stdout. When the file sink is enabled they are also
//! written, without ANSI colours, to a rolling file through a non-blocking
//! writer whose guard must outlive the server.

use std::path::Path;

use launchpad_control::config::{LogRotation, LoggingConfig};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Returns the file writer's guard; dropping it flushes and stops the writer.
pub fn init(
    verbose: bool,
    logging: &LoggingConfig,
    dir: &Path,
) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "debug,hyper=info,tower=info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = if logging.file_enabled {
        let (writer, guard) = file_writer(logging, dir)?;
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// Non-blocking writer over a rolling log file in `dir`.
pub fn file_writer(
    logging: &LoggingConfig,
    dir: &Path,
) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let rotation = match logging.rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&logging.file_name)
        .max_log_files(logging.max_files.max(1))
        .build(dir)?;

    Ok(tracing_appender::non_blocking(appender))
}
