use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка обработчика: корневая причина и цепочка контекстов над ней.
///
/// Обработчик возвращает её из `on_message`/`on_timeout`, воркер топика
/// дописывает свой контекст (топик и хук) и логирует результат на уровне
/// [`StatusCode::log_level`].
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    /// От внутреннего к внешнему: последний добавленный контекст в конце.
    frames: Vec<Frame>,
}

/// Один уровень контекста и место, где он был добавлен.
#[derive(Debug, Clone)]
pub struct Frame {
    pub message: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            frames: Vec::new(),
        }
    }

    /// Оборачивает ошибку ещё одним уровнем контекста.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.frames.push(Frame {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    /// Код статуса корневой ошибки; контекст его не меняет.
    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let frames: Vec<String> = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                format!(
                    "{} ({}:{})",
                    frame.message,
                    frame.location.file(),
                    frame.location.line()
                )
            })
            .collect();

        f.debug_struct("StackError")
            .field("root", &self.root.to_string())
            .field("status_code", &self.status_code())
            .field("frames", &frames)
            .finish()
    }
}

/// Внешний контекст первым: `topic 'a' on_message: charge card: timeout`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
