use std::fmt;

use tokio::sync::watch;

/// Состояние топика (Pubsub).
///
/// Переходы только вперёд: `Latent → Running → Dying → Dead`.
/// `Latent` может сразу перейти в `Dying` (закрытие без подписчика).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PubsubState {
    /// Создан, воркер ещё не запущен; сообщения копятся в буфере.
    Latent,
    /// Воркер запущен и доставляет сообщения обработчику.
    Running,
    /// Получен сигнал завершения; воркер выходит.
    Dying,
    /// Воркер завершён, обработчик больше не вызывается.
    Dead,
}

impl PubsubState {
    /// `true` для `Dying` и `Dead`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dying | Self::Dead)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latent => "latent",
            Self::Running => "running",
            Self::Dying => "dying",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for PubsubState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ячейка состояния поверх `watch`-канала.
///
/// Одновременно служит однократным широковещательным сигналом завершения
/// для воркера и примитивом ожидания `Dead` для закрывающей стороны.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<PubsubState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(PubsubState::Latent);
        Self { tx }
    }

    pub(crate) fn get(&self) -> PubsubState {
        *self.tx.borrow()
    }

    /// Атомарный переход `from → to`. Возвращает `true`, если он случился.
    pub(crate) fn transition(
        &self,
        from: PubsubState,
        to: PubsubState,
    ) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Переводит `Latent`/`Running` в `Dying`, возвращая прежнее состояние.
    pub(crate) fn begin_dying(&self) -> PubsubState {
        let mut previous = PubsubState::Dead;
        self.tx.send_if_modified(|state| {
            previous = *state;
            match *state {
                PubsubState::Latent | PubsubState::Running => {
                    *state = PubsubState::Dying;
                    true
                }
                PubsubState::Dying | PubsubState::Dead => false,
            }
        });
        previous
    }

    pub(crate) fn mark_dead(&self) {
        self.tx.send_if_modified(|state| {
            let changed = *state != PubsubState::Dead;
            *state = PubsubState::Dead;
            changed
        });
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PubsubState> {
        self.tx.subscribe()
    }

    pub(crate) async fn wait_dead(&self) {
        let mut rx = self.subscribe();
        wait_until(&mut rx, |state| state == PubsubState::Dead).await;
    }
}

/// Ждёт, пока состояние не удовлетворит предикату.
///
/// `Ref` из `borrow_and_update` не переживает `await`, поэтому future
/// остаётся `Send`.
pub(crate) async fn wait_until<F>(
    rx: &mut watch::Receiver<PubsubState>,
    pred: F,
) where
    F: Fn(PubsubState) -> bool,
{
    loop {
        if pred(*rx.borrow_and_update()) {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Тест проверяет, что переход срабатывает только из ожидаемого
    /// состояния.
    #[test]
    fn test_transition_requires_expected_state() {
        let cell = StateCell::new();
        assert!(!cell.transition(PubsubState::Running, PubsubState::Dying));
        assert!(cell.transition(PubsubState::Latent, PubsubState::Running));
        assert!(!cell.transition(PubsubState::Latent, PubsubState::Running));
        assert_eq!(cell.get(), PubsubState::Running);
    }

    /// Тест проверяет, что `begin_dying` возвращает прежнее состояние и не
    /// откатывает терминальные.
    #[test]
    fn test_begin_dying_reports_previous() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_dying(), PubsubState::Latent);
        assert_eq!(cell.get(), PubsubState::Dying);
        assert_eq!(cell.begin_dying(), PubsubState::Dying);

        cell.mark_dead();
        assert_eq!(cell.begin_dying(), PubsubState::Dead);
        assert_eq!(cell.get(), PubsubState::Dead);
    }

    /// Тест проверяет, что `wait_dead` просыпается после `mark_dead` из
    /// другой задачи.
    #[tokio::test]
    async fn test_wait_dead_wakes_up() {
        let cell = std::sync::Arc::new(StateCell::new());
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait_dead().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        cell.mark_dead();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake up")
            .unwrap();
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PubsubState::Latent.is_terminal());
        assert!(!PubsubState::Running.is_terminal());
        assert!(PubsubState::Dying.is_terminal());
        assert!(PubsubState::Dead.is_terminal());
        assert_eq!(PubsubState::Dying.to_string(), "dying");
    }
}
