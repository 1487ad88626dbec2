use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::paths;

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_NAME: &str = "portico.log";

pub struct LoggingHandle {
    pub run_id: String,
    pub log_path: PathBuf,
    /// Dropping the guard flushes buffered lines; handoff takes it right
    /// before exec.
    pub guard: Option<WorkerGuard>,
}

/// Install the global subscriber writing to `<log_dir>/portico.log`.
///
/// Filter priority: `cli_filter` > `PORTICO_LOG_FILTER` > `logging.filter` >
/// `RUST_LOG` > `info`.
pub fn init_logging(
    config: &LoggingConfig,
    cli_filter: Option<&str>,
) -> anyhow::Result<LoggingHandle> {
    let log_dir = paths::resolve_log_dir(config.dir.as_deref());
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(LOG_FILE_NAME);

    let filter_source = cli_filter
        .map(str::to_string)
        .or_else(|| std::env::var("PORTICO_LOG_FILTER").ok())
        .or_else(|| config.filter.clone());
    let filter = filter_source
        .as_deref()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("PORTICO_LOG_FORMAT")
        .ok()
        .or_else(|| config.format.clone())
        .unwrap_or_else(|| "json".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let run_id = format!("pid-{}-{}", std::process::id(), now);

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_path.display(),
        format = %format,
        filter = %filter_source.unwrap_or_else(|| DEFAULT_FILTER.to_string()),
    );

    Ok(LoggingHandle {
        run_id,
        log_path,
        guard: Some(guard),
    })
}
