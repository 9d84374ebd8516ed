use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use topiq::{
    bail, init_logging, CloseMode, Handler, HandlerResult, MessageQueue, MqConfig, QueueSnapshot,
    Settings, StatusCode,
};
use tracing::{info, info_span, warn};

/// Демонстрация очереди: N топиков, по продюсеру на топик.
#[derive(Debug, Parser)]
#[command(name = "topiq-demo", version, about)]
struct Cli {
    /// Путь к TOML-файлу конфигурации
    #[arg(short, long, env = "TOPIQ_CONFIG")]
    config: Option<PathBuf>,
    /// Количество топиков
    #[arg(short, long, default_value_t = 4)]
    topics: usize,
    /// Сообщений на топик
    #[arg(short, long, default_value_t = 1_000)]
    messages: u64,
    /// Ёмкость буфера (перекрывает конфигурацию)
    #[arg(long)]
    capacity: Option<usize>,
    /// Таймаут простоя в миллисекундах (перекрывает конфигурацию)
    #[arg(long)]
    idle_timeout_ms: Option<u64>,
    /// Доставить буфер при закрытии вместо отбрасывания
    #[arg(long)]
    drain: bool,
    /// Искусственная задержка обработчика, мс
    #[arg(long, default_value_t = 0)]
    handler_delay_ms: u64,
    /// Каждое N-е сообщение обработчик отклоняет (0: никогда)
    #[arg(long, default_value_t = 0)]
    fail_every: u64,
}

impl Cli {
    fn apply(
        &self,
        queue: &mut MqConfig,
    ) {
        if let Some(capacity) = self.capacity {
            queue.capacity = capacity;
        }
        if let Some(ms) = self.idle_timeout_ms {
            queue.idle_timeout = Duration::from_millis(ms);
        }
        if self.drain {
            queue.close_mode = CloseMode::Drain;
        }
    }
}

#[derive(Debug)]
struct Event {
    seq: u64,
    payload: String,
}

struct DemoHandler {
    received: Arc<AtomicU64>,
    delay: Duration,
    fail_every: u64,
}

#[async_trait]
impl Handler<Event> for DemoHandler {
    async fn on_message(
        &mut self,
        msg: Event,
    ) -> HandlerResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        if self.fail_every > 0 && (msg.seq + 1) % self.fail_every == 0 {
            bail!(
                StatusCode::HandlerFailed,
                "event {} rejected ({} bytes)",
                msg.seq,
                msg.payload.len()
            );
        }
        Ok(())
    }

    async fn on_timeout(&mut self) -> HandlerResult {
        info!(
            received = self.received.load(Ordering::Relaxed),
            "Topic went idle"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("failed to load settings")?;
    cli.apply(&mut settings.queue);
    settings.validate()?;

    let logging = init_logging(settings.logging.clone()).context("failed to init logging")?;
    info!(
        git_commit = env!("GIT_COMMIT"),
        build_time = env!("BUILD_TIME"),
        capacity = settings.queue.capacity,
        idle_timeout_ms = settings.queue.idle_timeout.as_millis() as u64,
        "topiq-demo starting"
    );

    let mq = Arc::new(
        MessageQueue::<Event>::with_config(settings.queue.clone())?.with_span(info_span!("mq")),
    );

    let received = Arc::new(AtomicU64::new(0));
    let topics: Vec<String> = (0..cli.topics).map(|i| format!("topic-{i}")).collect();
    for topic in &topics {
        mq.subscribe(
            topic,
            DemoHandler {
                received: received.clone(),
                delay: Duration::from_millis(cli.handler_delay_ms),
                fail_every: cli.fail_every,
            },
        )?;
    }

    let mut producers = Vec::with_capacity(topics.len());
    for topic in topics {
        let mq = mq.clone();
        let messages = cli.messages;
        producers.push(tokio::spawn(async move {
            for seq in 0..messages {
                let payload = format!("{topic}#{seq}");
                mq.publish(&topic, Event { seq, payload }).await?;
            }
            Ok::<_, topiq::MqError>(())
        }));
    }
    for producer in producers {
        producer.await.context("producer task failed")??;
    }

    let expected = cli.messages * cli.topics as u64;
    let settled = tokio::time::timeout(Duration::from_secs(10), async {
        while received.load(Ordering::Relaxed) < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if settled.is_err() {
        warn!(
            expected,
            received = received.load(Ordering::Relaxed),
            "Handlers did not catch up before close"
        );
    }

    let snapshot = mq.snapshot();
    mq.close().await;
    print_snapshot(&snapshot);

    logging.shutdown_async().await;
    Ok(())
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    println!(
        "publish_count={} rejected={} closed={}",
        snapshot.publish_count, snapshot.rejected_count, snapshot.closed
    );
    println!(
        "{:<12} {:>10} {:>10} {:>8} {:>8} {:>6}",
        "topic", "published", "delivered", "errors", "dropped", "peak"
    );
    for t in &snapshot.topics {
        println!(
            "{:<12} {:>10} {:>10} {:>8} {:>8} {:>6}",
            t.topic, t.published, t.delivered, t.handler_errors, t.dropped, t.peak_queued
        );
    }
}
