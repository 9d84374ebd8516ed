/// Возвращает `Err(StackError)` из текущей функции.
///
/// - `bail!(err)`: готовая ошибка, реализующая `ErrorExt`;
/// - `bail!(code, "msg")`: `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)`: то же с форматированием.
///
/// ```ignore
/// use topiq_error::{bail, StatusCode, TopiqResult};
///
/// fn on_order(order: &Order) -> TopiqResult<()> {
///     if order.items.is_empty() {
///         bail!(StatusCode::HandlerFailed, "order {} has no items", order.id);
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}
