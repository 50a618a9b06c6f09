//! Per-handler rate limiting: leading-edge throttle and trailing-edge debounce.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub(crate) struct Coalescer {
    pending: Mutex<Option<JoinHandle<()>>>,
    last_fired: Mutex<Option<Instant>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coalescer {
    /// `true` when no run was admitted during the last `window`; admitting
    /// a run starts a new window.
    pub(crate) fn throttle_permits(&self, window: Duration) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_fired);
        match *last {
            Some(fired) if now.duration_since(fired) < window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Schedules `run` after `window` of quiet, replacing any run still
    /// waiting. Once the window elapses the run is detached, so a later
    /// trigger cannot cut it short.
    pub(crate) fn debounce<F>(&self, window: Duration, run: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(run);
        }));
    }

    /// Drops a waiting debounced run, if any.
    pub(crate) fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.abort();
        }
    }
}
