use std::path::Path;

use anyhow::Context;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{logging::LoggingConfig, mq::MqConfig};

/// Имя файла конфигурации, который ищется в текущем каталоге.
pub const DEFAULT_CONFIG_FILE: &str = "topiq";

/// Полная конфигурация процесса.
///
/// Источники по возрастанию приоритета: значения по умолчанию, файл
/// (`topiq.toml` или явно заданный), переменные окружения `TOPIQ_*`
/// (вложенность через `__`, например `TOPIQ_QUEUE__CAPACITY=64`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue: MqConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Загружает конфигурацию; `path` подключается как обязательный файл.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default("queue.capacity", defaults.queue.capacity as u64)?
            .set_default(
                "queue.idle_timeout_ms",
                defaults.queue.idle_timeout.as_millis() as u64,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            // Переменные окружения с префиксом TOPIQ_
            .add_source(
                Environment::with_prefix("TOPIQ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    /// Проверяет секцию очереди и секцию логирования.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.queue.validate().context("[queue]")?;
        self.logging.validate().context("[logging]")?;
        Ok(())
    }
}
