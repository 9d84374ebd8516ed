use std::error::Error;

use crate::StatusCode;

/// Ошибка с кодом статуса. Её реализуют `MqError`, `GenericError` и
/// собственные ошибки обработчиков, которые затем оборачиваются в
/// [`StackError`](crate::StackError).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }
}
