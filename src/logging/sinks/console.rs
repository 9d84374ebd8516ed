use std::io::{self, Stdout};

use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::LoggingConfig,
    formatter::{build_formatter, FormatOptions},
};

/// Console layer (stdout) по настройкам `config.console`.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let console = &config.console;
    let writer: fn() -> Stdout = io::stdout;
    build_formatter(
        FormatOptions {
            format: console.format,
            ansi: console.with_ansi,
            target: console.with_target,
            thread_ids: console.with_thread_ids,
            line_numbers: console.with_line_numbers,
        },
        writer,
    )
}
