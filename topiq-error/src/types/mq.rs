use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки очереди сообщений, видимые вызывающей стороне.
///
/// Ошибки обработчиков сюда не попадают: они логируются воркером топика
/// и никогда не возвращаются из `publish`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqError {
    /// Некорректные параметры при создании очереди.
    #[error("invalid queue config: {reason}")]
    InvalidConfig { reason: String },

    /// Очередь закрыта, либо топик умирает / умер.
    #[error("queue closed for topic '{topic}'")]
    QueueClosed { topic: String },

    /// На топик уже есть подписчик.
    #[error("topic '{topic}' already has a subscriber")]
    AlreadySubscribed { topic: String },

    /// Нет подписчика (только при `require_subscriber`).
    #[error("no subscriber for topic '{topic}'")]
    NoSubscriber { topic: String },

    /// Буфер топика заполнен (неблокирующая публикация).
    #[error("queue for topic '{topic}' is full (capacity {capacity})")]
    QueueFull { topic: String, capacity: usize },

    /// Пустое имя топика.
    #[error("topic name must not be empty")]
    InvalidTopic,
}

pub type MqResult<T> = Result<T, MqError>;

impl MqError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn closed(topic: impl Into<String>) -> Self {
        Self::QueueClosed {
            topic: topic.into(),
        }
    }
}

impl ErrorExt for MqError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig { .. } => StatusCode::InvalidConfig,
            Self::QueueClosed { .. } => StatusCode::QueueClosed,
            Self::AlreadySubscribed { .. } => StatusCode::AlreadySubscribed,
            Self::NoSubscriber { .. } => StatusCode::NoSubscriber,
            Self::QueueFull { .. } => StatusCode::QueueFull,
            Self::InvalidTopic => StatusCode::InvalidTopic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет маппинг вариантов на коды статуса.
    #[test]
    fn test_status_codes() {
        let cases = [
            (MqError::invalid_config("x"), StatusCode::InvalidConfig),
            (MqError::closed("t"), StatusCode::QueueClosed),
            (
                MqError::AlreadySubscribed {
                    topic: "t".into(),
                },
                StatusCode::AlreadySubscribed,
            ),
            (
                MqError::NoSubscriber { topic: "t".into() },
                StatusCode::NoSubscriber,
            ),
            (
                MqError::QueueFull {
                    topic: "t".into(),
                    capacity: 1,
                },
                StatusCode::QueueFull,
            ),
            (MqError::InvalidTopic, StatusCode::InvalidTopic),
        ];

        for (err, code) in cases {
            assert_eq!(err.status_code(), code, "err={err:?}");
        }
    }

    /// Тест проверяет текст ошибок.
    #[test]
    fn test_display() {
        assert_eq!(
            MqError::closed("a").to_string(),
            "queue closed for topic 'a'"
        );
        assert_eq!(
            MqError::invalid_config("capacity must be >= 1").to_string(),
            "invalid queue config: capacity must be >= 1"
        );
    }
}
