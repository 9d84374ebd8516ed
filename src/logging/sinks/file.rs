use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::{FileRotation, LoggingConfig, LoggingError},
    formatter::{build_formatter, FormatOptions},
};

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Minutely => Rotation::MINUTELY,
            FileRotation::Hourly => Rotation::HOURLY,
            FileRotation::Daily => Rotation::DAILY,
            FileRotation::Never => Rotation::NEVER,
        }
    }
}

/// File layer: ротируемый файл в `config.log_dir`, запись через
/// неблокирующий writer.
///
/// Возвращённый `WorkerGuard` нужно держать до конца работы: при его drop
/// буфер сбрасывается на диск.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = RollingFileAppender::builder()
        .rotation(config.file.rotation.into())
        .filename_prefix(config.file.filename_prefix.trim())
        .build(&config.log_dir)?;
    let (writer, guard) = non_blocking(appender);

    let layer = build_formatter(
        FormatOptions {
            format: config.file.format,
            ansi: false,
            target: true,
            thread_ids: true,
            line_numbers: false,
        },
        writer,
    );
    Ok((layer, guard))
}
