use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use topiq_error::{LogLevel, MqError, MqResult, StackError};
use tracing::{debug, error, info, trace, warn, Instrument, Span};

use super::{
    state::{wait_until, StateCell},
    stats::PubsubCounters,
    CloseMode, Handler, MqConfig, PubsubState, TopicStats,
};

/// Состояние, общее для топика и его воркера.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    /// Момент последней успешной публикации; отсюда считается дедлайн
    /// простоя.
    last_publish: Mutex<Instant>,
    counters: PubsubCounters,
}

/// Актор одного топика: ограниченный буфер, один воркер, таймер простоя.
pub(crate) struct Pubsub<M> {
    topic: Arc<str>,
    idle_timeout: Duration,
    close_mode: CloseMode,
    tx: mpsc::Sender<M>,
    /// Приёмник до запуска воркера. Забирается ровно один раз.
    rx: Mutex<Option<mpsc::Receiver<M>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
    span: Span,
}

impl<M: Send + 'static> Pubsub<M> {
    pub(crate) fn new(
        topic: Arc<str>,
        config: &MqConfig,
        span: Span,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity);
        Self {
            topic,
            idle_timeout: config.idle_timeout,
            close_mode: config.close_mode,
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            shared: Arc::new(Shared {
                state: StateCell::new(),
                last_publish: Mutex::new(Instant::now()),
                counters: PubsubCounters::default(),
            }),
            span,
        }
    }

    pub(crate) fn state(&self) -> PubsubState {
        self.shared.state.get()
    }

    pub(crate) fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub(crate) fn stats(&self) -> TopicStats {
        self.shared.counters.snapshot(
            &self.topic,
            self.state(),
            self.tx.max_capacity(),
            self.queued(),
        )
    }

    /// Устанавливает обработчик и запускает воркер (`Latent → Running`).
    pub(crate) fn start<H>(
        &self,
        handler: H,
    ) -> MqResult<()>
    where
        H: Handler<M>,
    {
        if !self
            .shared
            .state
            .transition(PubsubState::Latent, PubsubState::Running)
        {
            return Err(match self.state() {
                PubsubState::Running => MqError::AlreadySubscribed {
                    topic: self.topic.to_string(),
                },
                _ => self.closed(),
            });
        }

        let Some(rx) = self.rx.lock().take() else {
            self.shared.state.mark_dead();
            return Err(self.closed());
        };

        *self.shared.last_publish.lock() = Instant::now();

        let worker = Worker {
            topic: self.topic.clone(),
            rx,
            handler,
            shared: self.shared.clone(),
            idle_timeout: self.idle_timeout,
            close_mode: self.close_mode,
        };
        let handle = tokio::spawn(worker.run().instrument(self.span.clone()));
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Ставит сообщение в буфер, ожидая свободного места.
    pub(crate) async fn publish(
        &self,
        msg: M,
    ) -> MqResult<()> {
        if self.state().is_terminal() {
            return Err(self.closed());
        }
        self.tx.send(msg).await.map_err(|_| self.closed())?;
        self.on_enqueued();
        Ok(())
    }

    /// Неблокирующая публикация.
    pub(crate) fn try_publish(
        &self,
        msg: M,
    ) -> MqResult<()> {
        if self.state().is_terminal() {
            return Err(self.closed());
        }
        match self.tx.try_send(msg) {
            Ok(()) => {
                self.on_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(MqError::QueueFull {
                topic: self.topic.to_string(),
                capacity: self.tx.max_capacity(),
            }),
            Err(TrySendError::Closed(_)) => Err(self.closed()),
        }
    }

    /// Переводит топик в `Dying` и ждёт `Dead`.
    pub(crate) async fn close(&self) {
        match self.shared.state.begin_dying() {
            PubsubState::Latent => {
                // Воркера нет: буфер уходит вместе с приёмником.
                let dropped = self.rx.lock().take().map(|rx| rx.len()).unwrap_or(0);
                self.shared.counters.record_dropped(dropped as u64);
                self.shared.state.mark_dead();
                debug!(parent: &self.span, dropped, "Latent pubsub closed");
            }
            PubsubState::Running | PubsubState::Dying => {
                let handle = self.worker.lock().take();
                if let Some(handle) = handle {
                    if let Err(err) = handle.await {
                        error!(parent: &self.span, "Pubsub worker terminated abnormally: {err}");
                    }
                }
                self.shared.state.wait_dead().await;
            }
            PubsubState::Dead => {}
        }
    }

    fn on_enqueued(&self) {
        *self.shared.last_publish.lock() = Instant::now();
        self.shared.counters.record_publish(self.queued());
    }

    fn closed(&self) -> MqError {
        MqError::closed(self.topic.as_ref())
    }
}

impl<M> Drop for Pubsub<M> {
    fn drop(&mut self) {
        trace!(parent: &self.span, "Pubsub dropped");
    }
}

/// Почему воркер вышел из основного цикла.
enum Exit {
    Closed,
    IdleTimeout,
    Disconnected,
}

/// Переводит топик в `Dead` при любом выходе воркера, включая панику
/// обработчика.
struct DeadOnExit(Arc<Shared>);

impl Drop for DeadOnExit {
    fn drop(&mut self) {
        self.0.state.mark_dead();
    }
}

struct Worker<M, H> {
    topic: Arc<str>,
    rx: mpsc::Receiver<M>,
    handler: H,
    shared: Arc<Shared>,
    idle_timeout: Duration,
    close_mode: CloseMode,
}

impl<M, H> Worker<M, H>
where
    M: Send + 'static,
    H: Handler<M>,
{
    async fn run(mut self) {
        let _dead = DeadOnExit(self.shared.clone());
        let mut state_rx = self.shared.state.subscribe();
        let idle = sleep_until(self.deadline());
        tokio::pin!(idle);

        debug!(
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            "Pubsub worker started"
        );

        let exit = loop {
            tokio::select! {
                biased;

                _ = wait_until(&mut state_rx, PubsubState::is_terminal) => break Exit::Closed,

                msg = self.rx.recv() => match msg {
                    Some(msg) => self.deliver(msg).await,
                    None => break Exit::Disconnected,
                },

                _ = &mut idle => {
                    let deadline = self.deadline();
                    if Instant::now() < deadline {
                        // Была публикация: таймер перевзводится.
                        idle.as_mut().reset(deadline);
                        continue;
                    }
                    break Exit::IdleTimeout;
                }
            }
        };

        match exit {
            Exit::Closed => self.shutdown().await,
            Exit::IdleTimeout => self.expire().await,
            Exit::Disconnected => debug!("All publishers gone, pubsub worker exits"),
        }
        debug!("Pubsub worker stopped");
    }

    fn deadline(&self) -> Instant {
        *self.shared.last_publish.lock() + self.idle_timeout
    }

    async fn deliver(
        &mut self,
        msg: M,
    ) {
        let result = self.handler.on_message(msg).await;
        self.shared.counters.record_delivery(result.is_ok());
        if let Err(err) = result {
            log_handler_error(&self.topic, "on_message", err);
        }
    }

    /// Выход по сигналу закрытия.
    async fn shutdown(&mut self) {
        self.rx.close();
        match self.close_mode {
            CloseMode::Discard => {
                let dropped = self.discard_buffered();
                if dropped > 0 {
                    debug!(dropped, "Discarded buffered messages on close");
                }
            }
            CloseMode::Drain => {
                while let Some(msg) = self.rx.recv().await {
                    self.deliver(msg).await;
                }
            }
        }
    }

    /// Выход по таймеру простоя.
    async fn expire(&mut self) {
        if !self
            .shared
            .state
            .transition(PubsubState::Running, PubsubState::Dying)
        {
            // Закрытие опередило таймер.
            return self.shutdown().await;
        }

        self.shared.counters.record_timeout();
        self.rx.close();
        let dropped = self.discard_buffered();
        warn!(
            topic = %self.topic,
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            dropped,
            "Pubsub idle timeout"
        );

        if let Err(err) = self.handler.on_timeout().await {
            log_handler_error(&self.topic, "on_timeout", err);
        }
    }

    fn discard_buffered(&mut self) -> u64 {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.shared.counters.record_dropped(dropped);
        dropped
    }
}

/// Логирует ошибку обработчика на уровне её кода статуса, дописав топик и
/// хук в цепочку контекстов.
fn log_handler_error(
    topic: &str,
    hook: &'static str,
    err: StackError,
) {
    let err = err.context(format!("topic '{topic}' {hook}"));
    let status = err.status_code();
    match err.log_level() {
        LogLevel::Error => error!(topic, hook, %status, "Handler failed: {err}"),
        LogLevel::Warn => warn!(topic, hook, %status, "Handler failed: {err}"),
        LogLevel::Info => info!(topic, hook, %status, "Handler failed: {err}"),
        LogLevel::Debug => debug!(topic, hook, %status, "Handler failed: {err}"),
        LogLevel::Trace => trace!(topic, hook, %status, "Handler failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use topiq_error::GenericError;

    use super::*;
    use crate::mq::{handler_fn, HandlerResult};

    fn pubsub(
        capacity: usize,
        timeout: Duration,
    ) -> Pubsub<u32> {
        Pubsub::new(
            Arc::from("t"),
            &MqConfig::new(capacity, timeout),
            Span::none(),
        )
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl Handler<u32> {
        handler_fn(move |_msg: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Тест проверяет, что сообщения, накопленные до старта, доставляются
    /// после запуска воркера.
    #[tokio::test]
    async fn test_latent_buffers_until_start() {
        let ps = pubsub(4, Duration::from_secs(10));
        ps.publish(1).await.unwrap();
        ps.publish(2).await.unwrap();
        assert_eq!(ps.state(), PubsubState::Latent);
        assert_eq!(ps.queued(), 2);

        let counter = Arc::new(AtomicUsize::new(0));
        ps.start(counting(counter.clone())).unwrap();
        assert_eq!(ps.state(), PubsubState::Running);

        tokio::time::timeout(Duration::from_secs(1), async {
            while counter.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        ps.close().await;
        assert_eq!(ps.state(), PubsubState::Dead);
    }

    /// Тест проверяет, что второй `start` отклоняется.
    #[tokio::test]
    async fn test_second_start_rejected() {
        let ps = pubsub(1, Duration::from_secs(10));
        ps.start(counting(Arc::default())).unwrap();
        let err = ps.start(counting(Arc::default())).unwrap_err();
        assert!(matches!(err, MqError::AlreadySubscribed { .. }));
        ps.close().await;

        let err = ps.start(counting(Arc::default())).unwrap_err();
        assert!(matches!(err, MqError::QueueClosed { .. }));
    }

    /// Тест проверяет закрытие латентного топика: буфер отбрасывается,
    /// публикации после закрытия отклоняются.
    #[tokio::test]
    async fn test_close_latent_drops_buffer() {
        let ps = pubsub(4, Duration::from_secs(10));
        ps.publish(1).await.unwrap();
        ps.publish(2).await.unwrap();
        ps.close().await;

        assert_eq!(ps.state(), PubsubState::Dead);
        assert_eq!(ps.stats().dropped, 2);
        assert!(matches!(
            ps.publish(3).await,
            Err(MqError::QueueClosed { .. })
        ));
    }

    /// Тест проверяет `try_publish` на полном буфере.
    #[tokio::test]
    async fn test_try_publish_full() {
        let ps = pubsub(1, Duration::from_secs(10));
        ps.try_publish(1).unwrap();
        let err = ps.try_publish(2).unwrap_err();
        assert_eq!(
            err,
            MqError::QueueFull {
                topic: "t".into(),
                capacity: 1
            }
        );
        ps.close().await;
    }

    /// Тест проверяет, что таймаут срабатывает один раз и переводит топик в
    /// `Dead`.
    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_fires_once() {
        struct TimeoutCounter(Arc<AtomicUsize>);

        #[async_trait]
        impl Handler<u32> for TimeoutCounter {
            async fn on_message(
                &mut self,
                _msg: u32,
            ) -> HandlerResult {
                Ok(())
            }

            async fn on_timeout(&mut self) -> HandlerResult {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let fired = Arc::new(AtomicUsize::new(0));
        let ps = pubsub(2, Duration::from_millis(100));
        ps.start(TimeoutCounter(fired.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        ps.shared.state.wait_dead().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(ps.stats().timed_out);
        assert!(matches!(
            ps.publish(1).await,
            Err(MqError::QueueClosed { .. })
        ));

        ps.close().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что публикации перевзводят таймер простоя.
    #[tokio::test(start_paused = true)]
    async fn test_publish_rearms_idle_timer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ps = pubsub(4, Duration::from_millis(100));
        ps.start(counting(counter.clone())).unwrap();

        for i in 0..5 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            ps.publish(i).await.unwrap();
        }
        assert_eq!(ps.state(), PubsubState::Running);

        tokio::time::sleep(Duration::from_millis(150)).await;
        ps.shared.state.wait_dead().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(ps.stats().timed_out);
    }

    /// Тест проверяет, что ошибка обработчика не останавливает доставку.
    #[tokio::test]
    async fn test_handler_error_does_not_stop_delivery() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = {
            let counter = counter.clone();
            handler_fn(move |msg: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                if msg % 2 == 0 {
                    Err(GenericError::handler("even").into())
                } else {
                    Ok(())
                }
            })
        };

        let ps = pubsub(8, Duration::from_secs(10));
        ps.start(handler).unwrap();
        for i in 0..4 {
            ps.publish(i).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while counter.load(Ordering::SeqCst) < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let stats = ps.stats();
        assert_eq!(stats.delivered, 4);
        assert_eq!(stats.handler_errors, 2);
        ps.close().await;
    }

    /// Тест проверяет, что паника обработчика всё равно приводит к `Dead`.
    #[tokio::test]
    async fn test_panicking_handler_reaches_dead() {
        let ps = pubsub(2, Duration::from_secs(10));
        ps.start(handler_fn(|_msg: u32| -> HandlerResult {
            panic!("handler exploded")
        }))
        .unwrap();
        ps.publish(1).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), ps.shared.state.wait_dead())
            .await
            .unwrap();
        ps.close().await;
        assert_eq!(ps.state(), PubsubState::Dead);
    }
}
