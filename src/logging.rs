use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Invalid log file path: {0}")]
    InvalidLogFile(String),

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Initialize logging to stderr and, when `log_file` is given, to that file.
///
/// `RUST_LOG` takes precedence over `log_level`. The returned guard must be
/// kept alive for buffered file output to be flushed.
pub fn init_logging_with_options(
    log_level: Option<&str>,
    log_file: Option<&Path>,
    debug: bool,
) -> Result<Option<WorkerGuard>, LoggingError> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or(default_level)))
        .map_err(|e| LoggingError::InvalidLevel(e.to_string()))?;

    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidLogFile(path.display().to_string()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    info!("Logging initialized with level: {}", log_level.unwrap_or(default_level));
    Ok(guard)
}

/// Log what the server is about to serve
pub fn log_startup_info(config: &AppConfig) {
    info!("=== Polyphon Server Starting ===");
    info!("Music root: {}", config.paths.music.display());
    match &config.paths.static_dir {
        Some(dir) => info!("Web client: {}", dir.display()),
        None => warn!("No static directory configured - only the API is served"),
    }
    info!(
        "Player: {} {}",
        config.player.program,
        config.player.args.join(" ")
    );
    info!("Status poll interval: {} ms", config.player.poll_interval_ms);

    let capacity = config.cache_capacity();
    if capacity == 0 {
        info!("Browse cache: disabled");
    } else {
        info!("Browse cache: {} entries per generation", capacity);
    }

    info!("Radios configured: {}", config.radios.len());
    for radio in &config.radios {
        info!("  - {} (http://{})", radio.name, radio.url);
    }
    if config.server.debug {
        warn!("Debug mode is on");
    }
}
