use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::PubsubState;

/// Счётчики одного топика. Пишутся продюсерами и воркером без блокировок.
#[derive(Debug, Default)]
pub(crate) struct PubsubCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    handler_errors: AtomicU64,
    dropped: AtomicU64,
    timed_out: AtomicBool,
    peak_queued: AtomicUsize,
}

impl PubsubCounters {
    pub(crate) fn record_publish(
        &self,
        queued: usize,
    ) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.peak_queued.fetch_max(queued, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(
        &self,
        ok: bool,
    ) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.handler_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dropped(
        &self,
        n: u64,
    ) {
        if n > 0 {
            self.dropped.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_timeout(&self) {
        self.timed_out.store(true, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        topic: &str,
        state: PubsubState,
        capacity: usize,
        queued: usize,
    ) -> TopicStats {
        TopicStats {
            topic: topic.to_string(),
            state,
            capacity,
            queued,
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            peak_queued: self.peak_queued.load(Ordering::Relaxed),
        }
    }
}

/// Снимок статистики топика.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStats {
    pub topic: String,
    pub state: PubsubState,
    pub capacity: usize,
    /// Сообщений в буфере на момент снимка.
    pub queued: usize,
    /// Успешно поставлено в буфер.
    pub published: u64,
    /// Передано обработчику (включая завершившиеся ошибкой).
    pub delivered: u64,
    pub handler_errors: u64,
    /// Отброшено при закрытии или по таймауту.
    pub dropped: u64,
    pub timed_out: bool,
    /// Максимальная наблюдавшаяся заполненность буфера.
    pub peak_queued: usize,
}

/// Снимок статистики всей очереди.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Топики, отсортированные по имени.
    pub topics: Vec<TopicStats>,
    pub publish_count: u64,
    /// Публикации, отклонённые с ошибкой.
    pub rejected_count: u64,
    pub closed: bool,
}

impl QueueSnapshot {
    pub fn total_published(&self) -> u64 {
        self.topics.iter().map(|t| t.published).sum()
    }

    pub fn total_delivered(&self) -> u64 {
        self.topics.iter().map(|t| t.delivered).sum()
    }

    pub fn total_queued(&self) -> usize {
        self.topics.iter().map(|t| t.queued).sum()
    }

    pub fn topic(
        &self,
        name: &str,
    ) -> Option<&TopicStats> {
        self.topics.iter().find(|t| t.topic == name)
    }
}
