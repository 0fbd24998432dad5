use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Однократная отложенная задача с семантикой arm/cancel.
///
/// Повторный `arm` отменяет ещё не сработавшую задачу, поэтому из серии
/// взведений выполняется только последнее. Drop отменяет задачу.
pub struct ScopedTimer {
    delay: Duration,
    task: Option<JoinHandle<()>>,
}

impl ScopedTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, task: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn arm<F>(&mut self, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.task = Some(tokio::spawn(async move {
            sleep(delay).await;
            fire.await;
        }));
    }

    /// Возвращает true, если была отменена ожидающая задача
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
