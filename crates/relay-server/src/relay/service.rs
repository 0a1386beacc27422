//! The relay control surface used by the HTTP layer

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use relay_protocol::SessionData;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::outcome::{OutcomeCallback, RelayOutcome};
use super::reaper::{self, DeadNotification, Reaper, ReaperHandle};
use super::registry::{SessionRegistry, StartOutcome};
use super::retry::RetryScheduler;

/// Answer to a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartReply {
    /// The relay delivered its first unit
    Started { sink_url: String },
    /// The source was already being relayed
    AlreadyRunning { sink_url: String },
    /// The relay could not be established
    Failed { reason: String },
}

impl StartReply {
    pub fn code(&self) -> i32 {
        match self {
            StartReply::Started { .. } | StartReply::AlreadyRunning { .. } => RelayOutcome::CODE_STARTED,
            StartReply::Failed { .. } => RelayOutcome::CODE_FATAL_SETUP,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StartReply::Started { .. } => "successful",
            StartReply::AlreadyRunning { .. } => "relay already running",
            StartReply::Failed { reason } => reason,
        }
    }

    pub fn sink_url(&self) -> Option<&str> {
        match self {
            StartReply::Started { sink_url } | StartReply::AlreadyRunning { sink_url } => Some(sink_url),
            StartReply::Failed { .. } => None,
        }
    }
}

/// Answer to a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReply {
    Stopped(SessionData),
    /// Nothing was running but a pending replay was cancelled
    ReplayCancelled,
    NotFound,
}

impl StopReply {
    pub fn is_ok(&self) -> bool {
        !matches!(self, StopReply::NotFound)
    }
}

type FirstResult = Result<String, String>;

pub struct RelayService {
    registry: Arc<SessionRegistry>,
    retries: Arc<RetryScheduler>,
    reaper: ReaperHandle,
    shutdown: CancellationToken,
    reaper_task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayService {
    /// Build the service and spawn its reaper
    pub fn start(registry: Arc<SessionRegistry>, replay_delay: Duration) -> Arc<Self> {
        let retries = Arc::new(RetryScheduler::new(replay_delay));
        let (handle, rx) = reaper::channel();
        let shutdown = CancellationToken::new();

        let reaper = Reaper::new(registry.clone(), retries.clone(), handle.clone(), rx);
        let reaper_task = tokio::spawn(reaper.run(shutdown.clone()));

        Arc::new(Self {
            registry,
            retries,
            reaper: handle,
            shutdown,
            reaper_task: Mutex::new(Some(reaper_task)),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn replay_pending(&self, source_url: &str) -> bool {
        self.retries.is_pending(source_url)
    }

    /// Start relaying `source_url` and wait until it either streams or fails.
    ///
    /// With `auto_replay`, a relay that dies after streaming is restarted into
    /// the same sink after the replay delay, for as long as it keeps dying and
    /// nobody stops it. A relay that fails before streaming is never replayed.
    pub async fn start_session(&self, source_url: &str, auto_replay: bool, sink_hint: Option<String>) -> StartReply {
        let (tx, rx) = oneshot::channel();
        let on_result = self.first_start_callback(source_url, auto_replay, tx);

        let attempt = match self.registry.start(source_url, sink_hint, on_result).await {
            StartOutcome::Spawned { attempt, .. } => attempt,
            StartOutcome::AlreadyRunning { sink_url } => {
                tracing::info!(source = %source_url, sink = %sink_url, "Relay already running");
                return StartReply::AlreadyRunning { sink_url };
            }
            StartOutcome::Superseded => {
                return StartReply::Failed {
                    reason: "relay was stopped".to_string(),
                };
            }
        };

        match rx.await {
            Ok(Ok(sink_url)) => StartReply::Started { sink_url },
            Ok(Err(reason)) => {
                // Leave no trace before answering; the reaper's copy of this report becomes a no-op
                self.registry.finalize(source_url, attempt.generation).await;
                StartReply::Failed { reason }
            }
            Err(_) => StartReply::Failed {
                reason: "relay stopped before streaming".to_string(),
            },
        }
    }

    /// Stop the relay for `source_url` and cancel any replay waiting for it
    pub async fn stop_session(&self, source_url: &str) -> StopReply {
        let cancelled = self.retries.cancel(source_url);
        let stopped = self.registry.stop(source_url).await;

        match stopped {
            Ok(session) => StopReply::Stopped(session),
            Err(_) if cancelled => {
                tracing::info!(source = %source_url, "Cancelled pending relay replay");
                StopReply::ReplayCancelled
            }
            Err(e) => {
                tracing::debug!(source = %source_url, "Stop failed: {}", e);
                StopReply::NotFound
            }
        }
    }

    pub async fn sessions(&self) -> Vec<SessionData> {
        self.registry.list().await
    }

    /// Stop the reaper, every pending replay and every session
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let reaper_task = self
            .reaper_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = reaper_task {
            if let Err(e) = task.await {
                tracing::error!("Reaper task failed: {}", e);
            }
        }

        self.retries.shutdown().await;
        let stopped = self.registry.shutdown().await;
        tracing::info!("Relay service shut down ({} session(s) stopped)", stopped);
    }

    fn first_start_callback(
        &self,
        source_url: &str,
        auto_replay: bool,
        first: oneshot::Sender<FirstResult>,
    ) -> OutcomeCallback {
        let reaper = self.reaper.clone();
        let source_url = source_url.to_string();
        let first = Mutex::new(Some(first));

        Arc::new(move |outcome| {
            let answer = first.lock().unwrap_or_else(PoisonError::into_inner).take();
            match outcome {
                RelayOutcome::Started { sink_url, .. } => {
                    if let Some(answer) = answer {
                        let _ = answer.send(Ok(sink_url));
                    }
                }
                RelayOutcome::FatalSetup { reason, attempt, .. } => {
                    reaper.notify(DeadNotification {
                        source_url: source_url.clone(),
                        replay_sink_url: None,
                        attempt,
                    });
                    if let Some(answer) = answer {
                        let _ = answer.send(Err(reason));
                    }
                }
                RelayOutcome::DiedAfterStreaming { sink_url, attempt, .. } => {
                    reaper.notify(DeadNotification {
                        source_url: source_url.clone(),
                        replay_sink_url: auto_replay.then_some(sink_url),
                        attempt,
                    });
                }
            }
        })
    }
}
