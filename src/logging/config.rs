use std::{env, fmt, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Ошибки настройки логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("invalid log format '{0}' (expected compact, pretty or json)")]
    InvalidFormat(String),
    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
    #[error("file sink requires a non-empty filename prefix")]
    EmptyFilePrefix,
    #[error("log directory error: {0}")]
    Io(#[from] io::Error),
    #[error("file appender error: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("global subscriber already set: {0}")]
    Init(String),
}

/// Формат вывода событий.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

/// Частота ротации файла логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub filename_prefix: String,
    pub rotation: FileRotation,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: LogFormat::Json,
            filename_prefix: "topiq.log".to_string(),
            rotation: FileRotation::Daily,
        }
    }
}

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error` или `off`.
    pub level: String,
    /// Дополнительные директивы `EnvFilter`, например `topiq::mq=debug`.
    pub directives: Vec<String>,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl LoggingConfig {
    /// Переопределения из окружения: `TOPIQ_LOG_LEVEL`, `TOPIQ_LOG_FORMAT`,
    /// `TOPIQ_LOG_DIR`. Некорректный формат игнорируется с предупреждением.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("TOPIQ_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("TOPIQ_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.console.format = format,
                Err(e) => eprintln!("Ignoring TOPIQ_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = env::var("TOPIQ_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }

        for directive in &self.directives {
            EnvFilter::builder()
                .parse(directive)
                .map_err(|e| LoggingError::InvalidDirective {
                    directive: directive.clone(),
                    reason: e.to_string(),
                })?;
        }

        if self.file.enabled && self.file.filename_prefix.trim().is_empty() {
            return Err(LoggingError::EmptyFilePrefix);
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file.enabled {
            std::fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: базовый уровень плюс дополнительные.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![self.level.trim().to_ascii_lowercase()];
        parts.extend(
            self.directives
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        );
        parts.join(",")
    }
}
