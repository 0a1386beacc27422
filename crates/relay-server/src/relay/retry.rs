use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct PendingRetry {
    ticket: u64,
    cancel: CancellationToken,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingRetry>>>;

/// Delayed, cancellable replays. At most one retry is pending per source;
/// scheduling another replaces it.
pub struct RetryScheduler {
    delay: Duration,
    tracker: TaskTracker,
    pending: PendingMap,
    next_ticket: AtomicU64,
}

impl RetryScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            tracker: TaskTracker::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `fire` for `source_url` after the delay unless cancelled first
    pub fn schedule<F, Fut>(&self, source_url: &str, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let replaced = lock(&self.pending).insert(
            source_url.to_string(),
            PendingRetry {
                ticket,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.cancel.cancel();
        }

        let pending = self.pending.clone();
        let source_url = source_url.to_string();
        let delay = self.delay;
        tracing::debug!(source = %source_url, "Replay scheduled in {:?}", delay);

        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if claim(&pending, &source_url, ticket) {
                fire().await;
            }
        });
    }

    /// Cancel the pending retry for `source_url`. Returns whether one was pending.
    pub fn cancel(&self, source_url: &str) -> bool {
        let removed = lock(&self.pending).remove(source_url);
        match removed {
            Some(retry) => {
                retry.cancel.cancel();
                tracing::debug!(source = %source_url, "Pending replay cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().map(|(_, retry)| retry).collect();
        for retry in &drained {
            retry.cancel.cancel();
        }
        drained.len()
    }

    pub fn is_pending(&self, source_url: &str) -> bool {
        lock(&self.pending).contains_key(source_url)
    }

    /// Cancel everything and wait for retries already firing to finish
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Take the pending slot if it still holds `ticket`
fn claim(pending: &Mutex<HashMap<String, PendingRetry>>, source_url: &str, ticket: u64) -> bool {
    let mut pending = lock(pending);
    let current = pending.get(source_url).map(|retry| retry.ticket);
    if current == Some(ticket) {
        pending.remove(source_url);
        true
    } else {
        false
    }
}

fn lock(pending: &Mutex<HashMap<String, PendingRetry>>) -> MutexGuard<'_, HashMap<String, PendingRetry>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
