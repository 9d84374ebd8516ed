use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Глобальный фильтр событий.
///
/// `RUST_LOG`, если задан, имеет приоритет над конфигурацией.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = config.build_filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!(
                "Invalid log filter directive from config ('{directive}'): {e}; falling back to 'info'"
            );
            EnvFilter::new("info")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env, io,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(
        filter: EnvFilter,
        emit: impl FnOnce(),
    ) -> String {
        let buf = Buffer::default();
        let writer = buf.clone();
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || writer.clone());
        let subscriber = Registry::default().with(layer).with(filter);
        tracing::subscriber::with_default(subscriber, emit);

        let out = buf.0.lock().unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Тест проверяет, что фильтр из конфигурации отсекает события ниже
    /// уровня, а директивы по target-у поднимают детализацию.
    #[test]
    #[serial]
    fn test_filter_from_config_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".into(),
            directives: vec!["topiq_filter_check=debug".into()],
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&cfg), || {
            tracing::info!("plain info should be filtered out");
            tracing::warn!("plain warn passes");
            tracing::debug!(target: "topiq_filter_check", "targeted debug passes");
        });

        assert!(out.contains("plain warn passes"));
        assert!(out.contains("targeted debug passes"));
        assert!(!out.contains("plain info should be filtered out"));
    }

    /// Тест проверяет приоритет RUST_LOG над конфигурацией.
    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "trace".into(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);
        env::remove_var("RUST_LOG");

        let out = capture(filter, || {
            tracing::warn!("warn is below error");
            tracing::error!("error passes");
        });
        assert!(out.contains("error passes"));
        assert!(!out.contains("warn is below error"));
    }

    /// Тест проверяет откат на `info` при некорректной директиве.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            directives: vec!["topiq=[[".into()],
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&cfg), || {
            tracing::debug!("debug dropped");
            tracing::info!("info kept");
        });
        assert!(out.contains("info kept"));
        assert!(!out.contains("debug dropped"));
    }
}
