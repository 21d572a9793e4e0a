//! Diagnostics setup. Status lines printed for the user go to stdout, so all
//! tracing output is kept on stderr or in rolling files.

use crate::domain::settings::{LogRotation, LogSettings};
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Flushes the file writer when dropped
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if settings.console {
        let ansi = std::io::stderr().is_terminal();
        layers.push(format_layer(std::io::stderr, settings.verbose, ansi));
    }

    let file_guard = match &settings.file_dir {
        Some(dir) => {
            let (layer, guard) = file_layer(dir, settings)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    // RUST_LOG wins over the settings file
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    tracing::debug!(level = %settings.level, "Logging initialized");
    Ok(LoggingGuard { _file: file_guard })
}

fn format_layer<W>(writer: W, verbose: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_thread_ids(verbose)
        .boxed()
}

fn file_layer(dir: &Path, settings: &LogSettings) -> anyhow::Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(settings.rotation.into(), dir, &settings.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((format_layer(writer, settings.verbose, false), guard))
}
