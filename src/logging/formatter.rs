use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use crate::logging::config::LogFormat;

/// Параметры форматирования одного sink-а.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormatOptions {
    pub format: LogFormat,
    pub ansi: bool,
    pub target: bool,
    pub thread_ids: bool,
    pub line_numbers: bool,
}

/// Собирает fmt-layer для заданного формата и writer-а.
///
/// Конкретный тип формата (json/pretty/compact) стирается в trait-объект.
pub(crate) fn build_formatter<S, W>(
    opts: FormatOptions,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match opts.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .with_ansi(false)
            .with_target(opts.target)
            .with_thread_ids(opts.thread_ids)
            .with_line_number(opts.line_numbers)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(writer)
            .with_ansi(opts.ansi)
            .with_target(opts.target)
            .with_thread_ids(opts.thread_ids)
            .with_line_number(opts.line_numbers)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(opts.ansi)
            .with_target(opts.target)
            .with_thread_ids(opts.thread_ids)
            .with_line_number(opts.line_numbers)
            .boxed(),
    }
}
