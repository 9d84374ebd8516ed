use async_trait::async_trait;
use topiq_error::TopiqResult;

/// Результат обработки сообщения. Ошибка логируется воркером и дальше не
/// распространяется.
pub type HandlerResult = TopiqResult<()>;

/// Потребитель сообщений топика.
///
/// Вызывается ровно одной задачей (воркером топика), поэтому методы
/// принимают `&mut self` и могут держать состояние без синхронизации.
#[async_trait]
pub trait Handler<M: Send + 'static>: Send + 'static {
    /// Вызывается для каждого сообщения в порядке постановки в буфер.
    async fn on_message(
        &mut self,
        msg: M,
    ) -> HandlerResult;

    /// Вызывается не более одного раза, когда топик простаивал дольше
    /// таймаута. После него воркер завершается.
    async fn on_timeout(&mut self) -> HandlerResult {
        Ok(())
    }
}

/// Обработчик из синхронных замыканий, см. [`handler_fn`].
///
/// Реакция на таймаут задаётся через [`FnHandler::with_timeout`].
pub struct FnHandler<F, T> {
    on_message: F,
    on_timeout: T,
}

fn no_timeout() -> HandlerResult {
    Ok(())
}

/// Оборачивает синхронное замыкание в [`Handler`].
///
/// ```
/// use topiq::{handler_fn, MessageQueue};
///
/// # async fn run() -> topiq::MqResult<()> {
/// let mq = MessageQueue::<String>::new(16, std::time::Duration::from_secs(5))?;
/// mq.subscribe("greetings", handler_fn(|msg: String| {
///     println!("{msg}");
///     Ok(())
/// }))?;
/// # Ok(())
/// # }
/// ```
pub fn handler_fn<M, F>(on_message: F) -> FnHandler<F, fn() -> HandlerResult>
where
    F: FnMut(M) -> HandlerResult + Send + 'static,
{
    FnHandler {
        on_message,
        on_timeout: no_timeout,
    }
}

impl<F, T> FnHandler<F, T> {
    /// Задаёт реакцию на таймаут простоя.
    pub fn with_timeout<T2>(
        self,
        on_timeout: T2,
    ) -> FnHandler<F, T2>
    where
        T2: FnMut() -> HandlerResult + Send + 'static,
    {
        FnHandler {
            on_message: self.on_message,
            on_timeout,
        }
    }
}

#[async_trait]
impl<M, F, T> Handler<M> for FnHandler<F, T>
where
    M: Send + 'static,
    F: FnMut(M) -> HandlerResult + Send + 'static,
    T: FnMut() -> HandlerResult + Send + 'static,
{
    async fn on_message(
        &mut self,
        msg: M,
    ) -> HandlerResult {
        (self.on_message)(msg)
    }

    async fn on_timeout(&mut self) -> HandlerResult {
        (self.on_timeout)()
    }
}
