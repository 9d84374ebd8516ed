use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use topiq_error::{MqError, MqResult};
use tracing::{debug, info, info_span, Span};

use super::{pubsub::Pubsub, Handler, MqConfig, PubsubState, QueueSnapshot, TopicStats};

type TopicKey = Arc<str>;

/// Зачем нужен топик: от этого зависит, можно ли заменить «мёртвый».
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Subscribe,
    Publish,
}

/// Очередь сообщений: реестр топиков `topic → Pubsub`.
///
/// Топик создаётся при первом `subscribe` или `publish`, живёт, пока его
/// не закроют через `unsubscribe`/`close` или пока не истечёт таймаут
/// простоя. Каждый топик обслуживается своим воркером, сообщения одного
/// топика доставляются строго по порядку.
///
/// Реестр сам не сжимается. Топик, умерший по таймауту, остаётся
/// надгробием (публикация в него даёт `QueueClosed`) до `unsubscribe`,
/// `close` или [`MessageQueue::purge_dead`]. Топик, созданный публикацией
/// без подписчика, не имеет воркера и таймера простоя и живёт до
/// `unsubscribe`/`close`. При большом числе короткоживущих топиков
/// `purge_dead` стоит вызывать периодически.
///
/// Для доступа из нескольких задач очередь оборачивается в `Arc`.
pub struct MessageQueue<M> {
    pubsubs: DashMap<TopicKey, Arc<Pubsub<M>>>,
    config: MqConfig,
    closed: AtomicBool,
    span: Span,
    /// Общее количество вызовов `publish`/`try_publish`
    publish_count: AtomicU64,
    /// Публикации, завершившиеся ошибкой
    rejected_count: AtomicU64,
}

impl<M: Send + 'static> MessageQueue<M> {
    /// Создаёт очередь с заданной ёмкостью буфера и таймаутом простоя.
    pub fn new(
        capacity: usize,
        idle_timeout: Duration,
    ) -> MqResult<Self> {
        Self::with_config(MqConfig::new(capacity, idle_timeout))
    }

    pub fn with_config(config: MqConfig) -> MqResult<Self> {
        config.validate()?;
        Ok(Self {
            pubsubs: DashMap::new(),
            config,
            closed: AtomicBool::new(false),
            span: Span::current(),
            publish_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        })
    }

    /// Родительский span для событий очереди и её воркеров.
    pub fn with_span(
        mut self,
        span: Span,
    ) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &MqConfig {
        &self.config
    }

    /// Подписывает обработчик на топик и запускает воркер.
    ///
    /// Сообщения, опубликованные до подписки, будут доставлены первыми.
    /// Топик, умерший по таймауту, заменяется новым.
    pub fn subscribe<H>(
        &self,
        topic: &str,
        handler: H,
    ) -> MqResult<()>
    where
        H: Handler<M>,
    {
        if self.is_closed() {
            return Err(MqError::closed(topic));
        }
        let pubsub = self.load_or_create(topic, Intent::Subscribe)?;
        pubsub.start(handler)?;
        debug!(parent: &self.span, topic, "Subscribed");
        Ok(())
    }

    /// Останавливает топик, дожидается выхода его воркера и удаляет топик
    /// из реестра.
    ///
    /// Пока воркер не вышел, топик остаётся в реестре в состоянии `Dying`:
    /// конкурентный `close` или `unsubscribe` найдёт его и тоже дождётся
    /// `Dead`. Возвращает `false`, если топика не было.
    pub async fn unsubscribe(
        &self,
        topic: &str,
    ) -> bool {
        let Some(pubsub) = self.pubsubs.get(topic).map(|e| e.value().clone()) else {
            return false;
        };
        pubsub.close().await;
        // Топик мог быть заменён новой подпиской, пока старый умирал.
        self.pubsubs
            .remove_if(topic, |_, current| Arc::ptr_eq(current, &pubsub));
        debug!(parent: &self.span, topic, "Unsubscribed");
        true
    }

    /// Публикует сообщение, ожидая места в буфере топика.
    ///
    /// Ошибки обработчика сюда не попадают.
    pub async fn publish(
        &self,
        topic: &str,
        msg: M,
    ) -> MqResult<()> {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        let result = match self.route(topic) {
            Ok(pubsub) => pubsub.publish(msg).await,
            Err(err) => Err(err),
        };
        self.track(result)
    }

    /// Публикует без ожидания; `QueueFull`, если буфер заполнен.
    pub fn try_publish(
        &self,
        topic: &str,
        msg: M,
    ) -> MqResult<()> {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        let result = self
            .route(topic)
            .and_then(|pubsub| pubsub.try_publish(msg));
        self.track(result)
    }

    /// Закрывает очередь: новые топики больше не создаются, все
    /// существующие останавливаются. Повторный вызов ничего не делает.
    pub async fn close(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);

        let topics: Vec<TopicKey> = self.pubsubs.iter().map(|e| e.key().clone()).collect();
        let count = topics.len();
        for topic in topics {
            self.unsubscribe(&topic).await;
        }

        if first {
            info!(parent: &self.span, topics = count, "Message queue closed");
        }
    }

    /// Удаляет из реестра топики в состоянии `Dead` (надгробия после
    /// таймаута простоя). Возвращает число удалённых.
    ///
    /// Следующая публикация в такой топик снова создаст его лениво.
    pub fn purge_dead(&self) -> usize {
        let mut purged = 0;
        self.pubsubs.retain(|_, pubsub| {
            let dead = pubsub.state() == PubsubState::Dead;
            purged += usize::from(dead);
            !dead
        });
        if purged > 0 {
            debug!(parent: &self.span, purged, "Purged dead topics");
        }
        purged
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Количество зарегистрированных топиков.
    pub fn len(&self) -> usize {
        self.pubsubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pubsubs.is_empty()
    }

    pub fn contains(
        &self,
        topic: &str,
    ) -> bool {
        self.pubsubs.contains_key(topic)
    }

    /// Имена топиков в лексикографическом порядке.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.pubsubs.iter().map(|e| e.key().to_string()).collect();
        topics.sort_unstable();
        topics
    }

    pub fn stats(
        &self,
        topic: &str,
    ) -> Option<TopicStats> {
        self.pubsubs.get(topic).map(|e| e.value().stats())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut topics: Vec<TopicStats> = self.pubsubs.iter().map(|e| e.value().stats()).collect();
        topics.sort_unstable_by(|a, b| a.topic.cmp(&b.topic));
        QueueSnapshot {
            topics,
            publish_count: self.publish_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }

    fn route(
        &self,
        topic: &str,
    ) -> MqResult<Arc<Pubsub<M>>> {
        if self.is_closed() {
            return Err(MqError::closed(topic));
        }
        self.load_or_create(topic, Intent::Publish)
    }

    fn track(
        &self,
        result: MqResult<()>,
    ) -> MqResult<()> {
        if result.is_err() {
            self.rejected_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Находит живой топик или атомарно создаёт новый.
    ///
    /// Флаг `closed` проверяется под блокировкой шарда, поэтому после
    /// того как `close` прошёл по шарду, новый топик в нём не появится.
    fn load_or_create(
        &self,
        topic: &str,
        intent: Intent,
    ) -> MqResult<Arc<Pubsub<M>>> {
        if topic.is_empty() {
            return Err(MqError::InvalidTopic);
        }

        if let Some(existing) = self.pubsubs.get(topic) {
            if !existing.state().is_terminal() {
                return Ok(existing.value().clone());
            }
        }

        match self.pubsubs.entry(Arc::from(topic)) {
            Entry::Occupied(mut entry) => {
                if !entry.get().state().is_terminal() {
                    return Ok(entry.get().clone());
                }
                // Топик-надгробие: публикация в него отклоняется,
                // подписка заменяет его новым.
                if intent == Intent::Publish || self.is_closed() {
                    return Err(MqError::closed(topic));
                }
                let fresh = self.spawn_pubsub(entry.key().clone());
                entry.insert(fresh.clone());
                Ok(fresh)
            }
            Entry::Vacant(entry) => {
                if self.is_closed() {
                    return Err(MqError::closed(topic));
                }
                if intent == Intent::Publish && self.config.require_subscriber {
                    return Err(MqError::NoSubscriber {
                        topic: topic.to_string(),
                    });
                }
                let fresh = self.spawn_pubsub(entry.key().clone());
                entry.insert(fresh.clone());
                Ok(fresh)
            }
        }
    }

    fn spawn_pubsub(
        &self,
        topic: TopicKey,
    ) -> Arc<Pubsub<M>> {
        let span = info_span!(parent: &self.span, "pubsub", topic = %topic);
        debug!(parent: &span, "Pubsub created");
        Arc::new(Pubsub::new(topic, &self.config, span))
    }
}

impl<M> std::fmt::Debug for MessageQueue<M> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("topics", &self.pubsubs.len())
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
