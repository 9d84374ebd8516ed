use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use topiq_error::{MqError, MqResult};

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Верхняя граница ёмкости буфера (ограничение `tokio::sync::mpsc`).
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Что делать с буферизованными сообщениями при закрытии топика.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMode {
    /// Сообщения в буфере отбрасываются.
    #[default]
    Discard,
    /// Воркер доставляет оставшиеся сообщения перед выходом. Новые
    /// публикации при этом уже отклоняются.
    Drain,
}

/// Параметры очереди, общие для всех её топиков.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqConfig {
    /// Ёмкость буфера каждого топика.
    pub capacity: usize,
    /// Через сколько без публикаций топик считается простаивающим.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,
    pub close_mode: CloseMode,
    /// Отклонять публикацию в топик без подписчика (`NoSubscriber`) вместо
    /// ленивого создания топика.
    pub require_subscriber: bool,
}

impl MqConfig {
    pub fn new(
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            capacity,
            idle_timeout,
            ..Self::default()
        }
    }

    pub fn with_close_mode(
        mut self,
        mode: CloseMode,
    ) -> Self {
        self.close_mode = mode;
        self
    }

    pub fn with_require_subscriber(
        mut self,
        require: bool,
    ) -> Self {
        self.require_subscriber = require;
        self
    }

    /// Проверяет ёмкость и таймаут.
    pub fn validate(&self) -> MqResult<()> {
        if self.capacity == 0 {
            return Err(MqError::invalid_config("capacity must be >= 1"));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(MqError::invalid_config(format!(
                "capacity must be <= {MAX_CAPACITY}"
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(MqError::invalid_config("idle timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            close_mode: CloseMode::default(),
            require_subscriber: false,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
