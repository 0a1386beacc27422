use chrono::{DateTime, Utc};
use relay_protocol::SessionData;

use super::outcome::Attempt;
use super::worker::WorkerHandle;

/// A registered relay: the source it pulls, the sink it pushes to, and its worker
pub struct Session {
    pub source_url: String,
    pub sink_url: String,
    pub attempt: Attempt,
    pub started_at: DateTime<Utc>,
    pub(crate) handle: WorkerHandle,
}

impl Session {
    pub fn snapshot(&self) -> SessionData {
        SessionData {
            source_url: self.source_url.clone(),
            sink_url: self.sink_url.clone(),
            state: self.handle.state(),
            generation: self.attempt.generation,
            started_at: self.started_at,
        }
    }

    /// Stop the worker and wait for it to release its resources
    pub(crate) async fn shut_down(self) -> SessionData {
        self.handle.stop();
        let snapshot = SessionData {
            source_url: self.source_url,
            sink_url: self.sink_url,
            state: relay_protocol::SessionState::Dead,
            generation: self.attempt.generation,
            started_at: self.started_at,
        };
        let exit = self.handle.join().await;
        tracing::debug!(source = %snapshot.source_url, "Relay worker exited: {:?}", exit);
        snapshot
    }
}
