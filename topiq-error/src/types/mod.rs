pub mod mq;

pub use mq::*;

use crate::{ErrorExt, StatusCode};

/// Универсальная ошибка с кодом и сообщением.
///
/// Удобна для обработчиков, которым не нужен собственный тип ошибки.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Ошибка обработчика с кодом [`StatusCode::HandlerFailed`].
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(StatusCode::HandlerFailed, message)
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет базовое поведение GenericError: статус код и вывод в
    /// строку.
    #[test]
    fn test_generic_error_basic() {
        let err = GenericError::new(StatusCode::InvalidArgs, "test message");
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert_eq!(err.to_string(), "test message");
    }

    /// Тест проверяет конструктор ошибок обработчика.
    #[test]
    fn test_handler_error_code() {
        let err = GenericError::handler("payment gateway down");
        assert_eq!(err.status_code(), StatusCode::HandlerFailed);
        assert_eq!(err.to_string(), "payment gateway down");
    }
}
