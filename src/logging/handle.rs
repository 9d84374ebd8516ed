use std::time::{Duration, Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления жизненным циклом логирования.
///
/// Держит guard файлового writer-а: пока handle жив, события из
/// неблокирующего буфера дописываются на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    /// Сколько допустимо ждать сброса буфера при shutdown
    flush_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает файловый буфер и освобождает writer.
    pub fn shutdown(mut self) {
        let Some(guard) = self.file_guard.take() else {
            return;
        };

        tracing::info!(
            timeout_ms = self.flush_timeout.as_millis() as u64,
            "Initiating logging shutdown"
        );

        let start = Instant::now();
        drop(guard);
        let elapsed = start.elapsed();

        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// То же, что [`shutdown`](Self::shutdown), но сброс выполняется в
    /// блокирующем потоке и ограничен `flush_timeout`.
    pub async fn shutdown_async(mut self) {
        let Some(guard) = self.file_guard.take() else {
            return;
        };
        let timeout = self.flush_timeout;

        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || drop(guard))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task failed: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                timeout.as_millis()
            ),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Buffered file logs are flushed on a best-effort basis."
            );
        }
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}
