//! Property-based тесты очереди.
//!
//! Генерируют случайные последовательности сообщений, ёмкости и число
//! продюсеров и проверяют порядок и полноту доставки.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use tokio::sync::mpsc;
use topiq::{handler_fn, MessageQueue, MqError};

const PROPTEST_CASES: u32 = 64;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build runtime")
}

async fn collect<M>(
    rx: &mut mpsc::UnboundedReceiver<M>,
    n: usize,
) -> Vec<M> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(msg)) => out.push(msg),
            _ => break,
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: PROPTEST_CASES,
        ..ProptestConfig::default()
    })]

    /// Один продюсер: обработчик видит сообщения ровно в порядке
    /// публикации, без потерь и дублей, при любой ёмкости буфера.
    #[test]
    fn fifo_single_producer(
        messages in prop::collection::vec(any::<u32>(), 0..200),
        capacity in 1usize..8,
        subscribe_first in any::<bool>(),
    ) {
        let delivered = runtime().block_on(async {
            let mq = MessageQueue::<u32>::new(capacity, Duration::from_secs(60)).unwrap();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let handler = handler_fn(move |msg: u32| {
                let _ = tx.send(msg);
                Ok(())
            });

            let mut handler = Some(handler);
            if subscribe_first {
                mq.subscribe("fifo", handler.take().unwrap()).unwrap();
            }
            for (i, msg) in messages.iter().enumerate() {
                // Без подписчика буфер не должен переполниться.
                if i == capacity {
                    if let Some(h) = handler.take() {
                        mq.subscribe("fifo", h).unwrap();
                    }
                }
                mq.publish("fifo", *msg).await.unwrap();
            }
            if let Some(h) = handler.take() {
                mq.subscribe("fifo", h).unwrap();
            }

            let delivered = collect(&mut rx, messages.len()).await;
            mq.close().await;
            delivered
        });

        prop_assert_eq!(delivered, messages);
    }

    /// Несколько продюсеров: порядок сообщений каждого продюсера
    /// сохраняется, суммарно доставлено всё опубликованное.
    #[test]
    fn per_producer_order(
        producers in 1usize..5,
        per_producer in 0usize..50,
        capacity in 1usize..4,
    ) {
        let delivered = runtime().block_on(async {
            let mq = Arc::new(MessageQueue::<(usize, usize)>::new(capacity, Duration::from_secs(60)).unwrap());
            let (tx, mut rx) = mpsc::unbounded_channel();
            mq.subscribe("mixed", handler_fn(move |msg: (usize, usize)| {
                let _ = tx.send(msg);
                Ok(())
            }))
            .unwrap();

            let tasks: Vec<_> = (0..producers)
                .map(|p| {
                    let mq = mq.clone();
                    tokio::spawn(async move {
                        for i in 0..per_producer {
                            mq.publish("mixed", (p, i)).await?;
                        }
                        Ok::<_, MqError>(())
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let delivered = collect(&mut rx, producers * per_producer).await;
            mq.close().await;
            delivered
        });

        prop_assert_eq!(delivered.len(), producers * per_producer);
        for p in 0..producers {
            let seq: Vec<usize> = delivered.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            prop_assert_eq!(seq, (0..per_producer).collect::<Vec<_>>());
        }
    }

    /// Пиковая заполненность буфера никогда не превышает ёмкость.
    #[test]
    fn peak_queued_bounded_by_capacity(
        capacity in 1usize..6,
        burst in 0usize..40,
    ) {
        let (peak, published) = runtime().block_on(async {
            let mq = MessageQueue::<usize>::new(capacity, Duration::from_secs(60)).unwrap();
            for i in 0..burst {
                // Без подписчика лишние публикации отклоняются как QueueFull.
                let _ = mq.try_publish("bounded", i);
            }
            let stats = mq.stats("bounded");
            mq.close().await;
            stats.map(|s| (s.peak_queued, s.published)).unwrap_or((0, 0))
        });

        prop_assert!(peak <= capacity);
        prop_assert_eq!(published as usize, burst.min(capacity));
    }
}
