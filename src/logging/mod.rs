//! Логирование на основе `tracing`.
//!
//! Фильтр уровня (`EnvFilter`), вывод в консоль и/или ротируемый файл,
//! форматы compact/pretty/json.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, FileRotation, LogFormat, LoggingConfig, LoggingError};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Инициализирует глобальный subscriber по конфигурации.
///
/// Переменные окружения (`TOPIQ_LOG_*`, `RUST_LOG`) имеют приоритет.
/// Повторный вызов в том же процессе возвращает [`LoggingError::Init`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_format = %config.console.format,
        file_enabled = config.file.enabled,
        log_dir = %config.log_dir.display(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
