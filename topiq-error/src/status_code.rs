use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок очереди.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Топики и подписки
/// - 4xxx: Управление потоком (backpressure)
/// - 6xxx: Жизненный цикл очереди и обработчиков
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    InvalidConfig = 1005,

    // === 2xxx: Топики и подписки ===
    NotFound = 2000,
    AlreadyExists = 2001,
    InvalidTopic = 2002,
    NoSubscriber = 2003,
    AlreadySubscribed = 2004,

    // === 4xxx: Управление потоком ===
    RateLimited = 4000,
    QueueFull = 4001,

    // === 6xxx: Жизненный цикл ===
    QueueClosed = 6000,
    Timeout = 6001,
    HandlerFailed = 6002,
    WorkerPanicked = 6003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Использует `TryFrom<u32>` из `num_enum`; возвращает `None`, если
    /// значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить.
    ///
    /// `QueueFull` освобождается, как только обработчик заберёт сообщение;
    /// `QueueClosed` окончателен для данной очереди.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::QueueFull)
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Является ли код ошибкой вызывающей стороны (диапазон `2xxx..4xxx`,
    /// а также `InvalidArgs` и `InvalidConfig`).
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs | Self::InvalidConfig)
    }

    /// Ошибки жизненного цикла очереди (диапазон 6xxx).
    pub fn is_lifecycle_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::WorkerPanicked)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists | Self::QueueClosed => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidConfig
            | Self::InvalidTopic
            | Self::NoSubscriber
            | Self::AlreadySubscribed => LogLevel::Info,
            Self::RateLimited | Self::QueueFull | Self::Timeout | Self::HandlerFailed => {
                LogLevel::Warn
            }
            Self::Internal | Self::WorkerPanicked => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
