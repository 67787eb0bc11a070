use crate::domain::settings::LogSettings;
use anyhow::Context;
use std::fs;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LoggingGuard {
    // Dropping this flushes and stops the file writer
    _file: Option<WorkerGuard>,
}

/// Map the configured rotation name; anything unknown rotates daily
pub fn parse_rotation(rotation: &str) -> Rotation {
    match rotation.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// Filter used when RUST_LOG is unset. This crate logs at the configured
/// level, dependencies only at warn. An unknown level name means info.
pub fn default_directives(settings: &LogSettings) -> String {
    let level = Level::from_str(&settings.level).unwrap_or(Level::INFO);
    format!(
        "warn,{}={}",
        env!("CARGO_CRATE_NAME"),
        level.to_string().to_lowercase()
    )
}

/// Non-blocking writer over `<log_dir>/<prefix>.<date>.log`
fn file_writer(settings: &LogSettings) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&settings.log_dir)
        .with_context(|| format!("Could not create log directory {}", settings.log_dir))?;

    let appender = RollingFileAppender::builder()
        .rotation(parse_rotation(&settings.rotation))
        .filename_prefix(&settings.file_name_prefix)
        .filename_suffix("log")
        .build(&settings.log_dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&default_directives(settings)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target)
            .with_ansi(settings.ansi_colors)
    });

    let (file_layer, file_guard) = if settings.file_logging_enabled {
        let (writer, guard) = file_writer(settings)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        console = settings.console_logging_enabled,
        file = settings.file_logging_enabled,
        rotation = %settings.rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard { _file: file_guard })
}
