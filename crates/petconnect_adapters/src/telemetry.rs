use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use petconnect_core::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

pub fn log_dir() -> PathBuf {
    ProjectDirs::from("com", "petconnect", "petconnect")
        .map(|d| d.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Console lines go to stderr so command output on stdout stays clean; the
/// daily file in `dir` gets one JSON object per event.
pub fn build_subscriber(
    name: &str,
    filter: EnvFilter,
    dir: &Path,
) -> (impl Subscriber + Send + Sync + 'static, WorkerGuard) {
    let file_appender = tracing_appender::rolling::daily(dir, format!("{}.log", name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().json().with_ansi(false).with_writer(file_writer));

    (subscriber, guard)
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_subscriber(name: &str, default_filter: &str) -> Result<WorkerGuard, Error> {
    LogTracer::init().map_err(|e| Error::Other(format!("failed to bridge log records: {}", e)))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (subscriber, guard) = build_subscriber(name, filter, &log_dir());

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("failed to set global tracing subscriber: {}", e)))?;

    Ok(guard)
}
