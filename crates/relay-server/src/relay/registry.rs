//! Session registry: the single authority over which sources are being relayed
//!
//! At most one session exists per source URL. The table lock is only held for
//! short check-and-mutate sections; workers are spawned before it is taken and
//! joined after it is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use relay_media::MediaTransport;
use relay_protocol::SessionData;
use thiserror::Error;
use tokio::sync::Mutex;

use super::outcome::{Attempt, OutcomeCallback};
use super::session::Session;
use super::worker::{RelayWorker, WorkerConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("transform not exists")]
    NotFound { source_url: String },
}

/// Result of asking the registry to start a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was registered and released
    Spawned { sink_url: String, attempt: Attempt },
    /// The source already has a session; nothing was started
    AlreadyRunning { sink_url: String },
    /// The source was stopped since the caller read its epoch
    Superseded,
}

#[derive(Default)]
struct Table {
    sessions: HashMap<String, Session>,
    /// Stop counter per source, advanced by every explicit stop
    epochs: HashMap<String, u64>,
    next_index: u64,
    next_generation: u64,
}

impl Table {
    fn epoch(&self, source_url: &str) -> u64 {
        self.epochs.get(source_url).copied().unwrap_or(0)
    }

    /// Why a start for `source_url` must not proceed, if it must not
    fn refusal(&self, source_url: &str, expected_epoch: Option<u64>) -> Option<StartOutcome> {
        if let Some(existing) = self.sessions.get(source_url) {
            return Some(StartOutcome::AlreadyRunning {
                sink_url: existing.sink_url.clone(),
            });
        }
        match expected_epoch {
            Some(epoch) if epoch != self.epoch(source_url) => Some(StartOutcome::Superseded),
            _ => None,
        }
    }
}

pub struct SessionRegistry {
    transport: Arc<dyn MediaTransport>,
    media_host: String,
    config: Arc<WorkerConfig>,
    table: Mutex<Table>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn MediaTransport>, media_host: impl Into<String>, config: WorkerConfig) -> Self {
        let media_host: String = media_host.into();
        Self {
            transport,
            media_host: media_host.trim_end_matches('/').to_string(),
            config: Arc::new(config),
            table: Mutex::new(Table::default()),
        }
    }

    pub fn media_host(&self) -> &str {
        &self.media_host
    }

    /// Start relaying `source_url` unless it already has a session.
    ///
    /// Without `sink_hint` the sink is `<media_host>/<n>` with `n` drawn from a
    /// counter that only ever increases.
    pub async fn start(
        &self,
        source_url: &str,
        sink_hint: Option<String>,
        on_result: OutcomeCallback,
    ) -> StartOutcome {
        self.start_checked(source_url, sink_hint, None, on_result).await
    }

    /// Like [`start`](Self::start), but refuses when the source was stopped after
    /// `epoch` was read. Used by replays so a stop always wins.
    pub async fn start_at_epoch(
        &self,
        source_url: &str,
        sink_hint: Option<String>,
        epoch: u64,
        on_result: OutcomeCallback,
    ) -> StartOutcome {
        self.start_checked(source_url, sink_hint, Some(epoch), on_result)
            .await
    }

    async fn start_checked(
        &self,
        source_url: &str,
        sink_hint: Option<String>,
        expected_epoch: Option<u64>,
        on_result: OutcomeCallback,
    ) -> StartOutcome {
        if let Some(refusal) = self.table.lock().await.refusal(source_url, expected_epoch) {
            return refusal;
        }

        let worker = RelayWorker::new(source_url, self.transport.clone(), self.config.clone(), on_result);
        let (handle, arm) = worker.spawn();

        let mut table = self.table.lock().await;
        if let Some(refusal) = table.refusal(source_url, expected_epoch) {
            // Lost the race; dropping the arm discards the idle worker
            return refusal;
        }

        let sink_url = match sink_hint {
            Some(hint) => hint,
            None => {
                let index = table.next_index;
                table.next_index += 1;
                format!("{}/{}", self.media_host, index)
            }
        };
        let attempt = Attempt {
            generation: table.next_generation,
            epoch: table.epoch(source_url),
        };
        table.next_generation += 1;

        table.sessions.insert(
            source_url.to_string(),
            Session {
                source_url: source_url.to_string(),
                sink_url: sink_url.clone(),
                attempt,
                started_at: Utc::now(),
                handle,
            },
        );
        arm.release(sink_url.clone(), attempt);
        drop(table);

        tracing::info!(
            source = %source_url,
            sink = %sink_url,
            generation = attempt.generation,
            "Relay session registered"
        );
        StartOutcome::Spawned { sink_url, attempt }
    }

    /// Stop the session for `source_url` and wait for its worker to release
    /// everything. Advances the source's epoch even when nothing is running.
    pub async fn stop(&self, source_url: &str) -> Result<SessionData, RegistryError> {
        let removed = {
            let mut table = self.table.lock().await;
            *table.epochs.entry(source_url.to_string()).or_insert(0) += 1;
            table.sessions.remove(source_url)
        };

        let Some(session) = removed else {
            tracing::debug!(source = %source_url, "Stop requested for unknown relay");
            return Err(RegistryError::NotFound {
                source_url: source_url.to_string(),
            });
        };

        let stopped = session.shut_down().await;
        tracing::info!(source = %source_url, sink = %stopped.sink_url, "Relay session stopped");
        Ok(stopped)
    }

    /// Remove the session for `source_url` if it still belongs to `generation`.
    /// A death report from an older worker leaves a newer session alone.
    pub async fn finalize(&self, source_url: &str, generation: u64) -> Option<SessionData> {
        let removed = {
            let mut table = self.table.lock().await;
            let current = table.sessions.get(source_url).map(|s| s.attempt.generation);
            if current == Some(generation) {
                table.sessions.remove(source_url)
            } else {
                None
            }
        };

        match removed {
            Some(session) => Some(session.shut_down().await),
            None => {
                tracing::debug!(source = %source_url, generation, "Ignoring stale relay report");
                None
            }
        }
    }

    pub async fn epoch(&self, source_url: &str) -> u64 {
        self.table.lock().await.epoch(source_url)
    }

    pub async fn lookup(&self, source_url: &str) -> Option<SessionData> {
        self.table
            .lock()
            .await
            .sessions
            .get(source_url)
            .map(Session::snapshot)
    }

    /// All sessions, ordered by source URL
    pub async fn list(&self) -> Vec<SessionData> {
        let mut sessions: Vec<_> = self
            .table
            .lock()
            .await
            .sessions
            .values()
            .map(Session::snapshot)
            .collect();
        sessions.sort_by(|a, b| a.source_url.cmp(&b.source_url));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every session and wait for all workers. Returns how many were stopped.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Session> = {
            let mut table = self.table.lock().await;
            let Table { sessions, epochs, .. } = &mut *table;
            sessions
                .drain()
                .map(|(source_url, session)| {
                    *epochs.entry(source_url).or_insert(0) += 1;
                    session
                })
                .collect()
        };

        let count = drained.len();
        join_all(drained.into_iter().map(Session::shut_down)).await;
        if count > 0 {
            tracing::info!("Stopped {} relay session(s)", count);
        }
        count
    }
}
