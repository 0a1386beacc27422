//! Dead-session reaper
//!
//! Workers report deaths from their own tasks; the reaper is the one place that
//! turns those reports into registry removals and scheduled replays. Reports are
//! handled strictly in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::outcome::{Attempt, OutcomeCallback, RelayOutcome};
use super::registry::{SessionRegistry, StartOutcome};
use super::retry::RetryScheduler;

/// A worker ended without being stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadNotification {
    pub source_url: String,
    /// Sink to replay into; `None` means just remove the session
    pub replay_sink_url: Option<String>,
    pub attempt: Attempt,
}

#[derive(Clone)]
pub struct ReaperHandle {
    tx: mpsc::UnboundedSender<DeadNotification>,
}

impl ReaperHandle {
    /// Queue a notification. Never blocks; returns false once the reaper is gone.
    pub fn notify(&self, notification: DeadNotification) -> bool {
        match self.tx.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(lost)) => {
                tracing::debug!(source = %lost.source_url, "Reaper stopped, dropping dead notification");
                false
            }
        }
    }
}

pub fn channel() -> (ReaperHandle, mpsc::UnboundedReceiver<DeadNotification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReaperHandle { tx }, rx)
}

/// Callback for workers started by a replay. Any failure asks for another
/// replay into the same sink.
pub fn replay_callback(reaper: ReaperHandle, source_url: String) -> OutcomeCallback {
    Arc::new(move |outcome| match outcome {
        RelayOutcome::Started { sink_url, .. } => {
            tracing::info!(source = %source_url, sink = %sink_url, "Replayed relay is streaming");
        }
        failed => {
            reaper.notify(DeadNotification {
                source_url: source_url.clone(),
                replay_sink_url: Some(failed.sink_url().to_string()),
                attempt: failed.attempt(),
            });
        }
    })
}

pub struct Reaper {
    registry: Arc<SessionRegistry>,
    retries: Arc<RetryScheduler>,
    handle: ReaperHandle,
    rx: mpsc::UnboundedReceiver<DeadNotification>,
}

impl Reaper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        retries: Arc<RetryScheduler>,
        handle: ReaperHandle,
        rx: mpsc::UnboundedReceiver<DeadNotification>,
    ) -> Self {
        Self {
            registry,
            retries,
            handle,
            rx,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::debug!("Reaper running");
        loop {
            let notification = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                notification = self.rx.recv() => notification,
            };
            match notification {
                Some(notification) => self.dispatch(notification).await,
                None => break,
            }
        }
        tracing::debug!("Reaper stopped");
    }

    async fn dispatch(&self, notification: DeadNotification) {
        let DeadNotification {
            source_url,
            replay_sink_url,
            attempt,
        } = notification;

        if self.registry.finalize(&source_url, attempt.generation).await.is_none() {
            return;
        }
        tracing::info!(source = %source_url, generation = attempt.generation, "Removed dead relay session");

        let Some(sink_url) = replay_sink_url else {
            return;
        };
        if self.registry.epoch(&source_url).await != attempt.epoch {
            tracing::debug!(source = %source_url, "Relay was stopped, not replaying");
            return;
        }

        let registry = self.registry.clone();
        let reaper = self.handle.clone();
        let source = source_url.clone();
        self.retries.schedule(&source_url, move || async move {
            let on_result = replay_callback(reaper, source.clone());
            match registry
                .start_at_epoch(&source, Some(sink_url), attempt.epoch, on_result)
                .await
            {
                StartOutcome::Spawned { sink_url, attempt } => {
                    tracing::info!(
                        source = %source,
                        sink = %sink_url,
                        generation = attempt.generation,
                        "Replaying relay"
                    );
                }
                StartOutcome::AlreadyRunning { sink_url } => {
                    tracing::debug!(source = %source, sink = %sink_url, "Relay already running, replay skipped");
                }
                StartOutcome::Superseded => {
                    tracing::debug!(source = %source, "Relay was stopped, replay skipped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::relay::testing::{collector, patient_config, Script, ScriptedTransport};

    struct Fixture {
        registry: Arc<SessionRegistry>,
        retries: Arc<RetryScheduler>,
        handle: ReaperHandle,
        shutdown: CancellationToken,
        transport: Arc<ScriptedTransport>,
    }

    fn fixture(transport: Arc<ScriptedTransport>) -> Fixture {
        let registry = Arc::new(SessionRegistry::new(transport.clone(), "host", patient_config()));
        let retries = Arc::new(RetryScheduler::new(Duration::from_secs(5)));
        let (handle, rx) = channel();
        let shutdown = CancellationToken::new();
        let reaper = Reaper::new(registry.clone(), retries.clone(), handle.clone(), rx);
        tokio::spawn(reaper.run(shutdown.clone()));
        Fixture {
            registry,
            retries,
            handle,
            shutdown,
            transport,
        }
    }

    fn ignore() -> OutcomeCallback {
        Arc::new(|_| {})
    }

    /// Start a session and wait until its worker is streaming
    async fn start_streaming(registry: &SessionRegistry, source: &str) -> Attempt {
        let (on_result, mut outcomes) = collector();
        let StartOutcome::Spawned { attempt, .. } = registry.start(source, None, on_result).await else {
            panic!("expected a new session");
        };
        let first = outcomes.recv().await.unwrap();
        assert_eq!(first.code(), RelayOutcome::CODE_STARTED);
        attempt
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn removes_session_and_schedules_replay() {
        let f = fixture(ScriptedTransport::new(Script::streaming()));
        let StartOutcome::Spawned { attempt, .. } = f.registry.start("rtsp://cam", None, ignore()).await else {
            panic!("expected a new session");
        };

        f.handle.notify(DeadNotification {
            source_url: "rtsp://cam".to_string(),
            replay_sink_url: Some("host/0".to_string()),
            attempt,
        });
        settle().await;

        assert!(f.registry.lookup("rtsp://cam").await.is_none());
        assert!(f.retries.is_pending("rtsp://cam"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        let replayed = f.registry.lookup("rtsp://cam").await.unwrap();
        assert_eq!(replayed.sink_url, "host/0");
        assert!(replayed.generation > attempt.generation);

        f.shutdown.cancel();
        f.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_notification_leaves_newer_session_alone() {
        let f = fixture(ScriptedTransport::new(Script::streaming()));
        let StartOutcome::Spawned { attempt, .. } = f.registry.start("rtsp://cam", None, ignore()).await else {
            panic!("expected a new session");
        };

        f.handle.notify(DeadNotification {
            source_url: "rtsp://cam".to_string(),
            replay_sink_url: Some("host/0".to_string()),
            attempt: Attempt {
                generation: attempt.generation + 1,
                epoch: attempt.epoch,
            },
        });
        settle().await;

        assert!(f.registry.lookup("rtsp://cam").await.is_some());
        assert!(!f.retries.is_pending("rtsp://cam"));

        f.shutdown.cancel();
        f.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removal_without_sink_does_not_replay() {
        let f = fixture(ScriptedTransport::new(Script::streaming()));
        let attempt = start_streaming(&f.registry, "rtsp://cam").await;
        assert_eq!(f.transport.probe.opens(), 1);

        f.handle.notify(DeadNotification {
            source_url: "rtsp://cam".to_string(),
            replay_sink_url: None,
            attempt,
        });
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(f.registry.is_empty().await);
        assert_eq!(f.transport.probe.opens(), 1);
        f.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn replay_fails_again_and_is_rescheduled() {
        let transport = ScriptedTransport::queued(
            vec![Script::streaming(), Script::fails_open("refused")],
            Script::streaming(),
        );
        let f = fixture(transport);
        let attempt = start_streaming(&f.registry, "rtsp://cam").await;

        f.handle.notify(DeadNotification {
            source_url: "rtsp://cam".to_string(),
            replay_sink_url: Some("host/0".to_string()),
            attempt,
        });
        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;

        let times = f.transport.probe.open_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[2] - times[1], Duration::from_secs(5));
        assert_eq!(f.registry.lookup("rtsp://cam").await.unwrap().sink_url, "host/0");

        f.shutdown.cancel();
        f.registry.shutdown().await;
    }
}
