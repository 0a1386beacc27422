//! Relay orchestration
//!
//! - `registry`: which sources are being relayed, and to which sink
//! - `worker`: the per-session task moving units from source to sink
//! - `reaper` and `retry`: removal of dead sessions and delayed replays
//! - `service`: the start/stop/list surface the HTTP layer talks to

pub mod outcome;
pub mod reaper;
pub mod registry;
pub mod retry;
pub mod service;
pub mod session;
pub mod state;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use outcome::{Attempt, OutcomeCallback, RelayOutcome};
pub use registry::{RegistryError, SessionRegistry, StartOutcome};
pub use service::{RelayService, StartReply, StopReply};
pub use state::SessionState;
pub use worker::{RelayWorker, WorkerConfig, WorkerExit};
