use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the file writer alive so buffered lines get flushed on exit.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

fn filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bluedeck={level},bluedeck_core={level}")))
}

/// The interactive screen owns the terminal, so everything goes to a file.
pub fn init_file(path: &Path, debug: bool) -> Result<LoggingGuard> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path.file_name().map_or_else(|| "bluedeck.log".into(), |n| n.to_owned());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Ok(LoggingGuard { _guard: Some(guard) })
}

pub fn init_stderr(debug: bool) -> LoggingGuard {
    tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    LoggingGuard { _guard: None }
}
