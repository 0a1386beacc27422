//! Result reporting from relay workers

use std::sync::Arc;

/// Identity of one relay attempt.
///
/// `generation` is unique per spawned worker. `epoch` is the source's stop
/// counter when the attempt started; only an explicit stop advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attempt {
    pub generation: u64,
    pub epoch: u64,
}

/// What a worker reports through its result callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// First unit arrived from the source (code `0`)
    Started { sink_url: String, attempt: Attempt },
    /// Failed before any unit was delivered (code `-1`)
    FatalSetup {
        sink_url: String,
        reason: String,
        attempt: Attempt,
    },
    /// Failed after the first unit was delivered (code `-2`)
    DiedAfterStreaming {
        sink_url: String,
        reason: String,
        attempt: Attempt,
    },
}

impl RelayOutcome {
    pub const CODE_STARTED: i32 = 0;
    pub const CODE_FATAL_SETUP: i32 = -1;
    pub const CODE_DIED: i32 = -2;

    pub fn code(&self) -> i32 {
        match self {
            RelayOutcome::Started { .. } => Self::CODE_STARTED,
            RelayOutcome::FatalSetup { .. } => Self::CODE_FATAL_SETUP,
            RelayOutcome::DiedAfterStreaming { .. } => Self::CODE_DIED,
        }
    }

    pub fn sink_url(&self) -> &str {
        match self {
            RelayOutcome::Started { sink_url, .. }
            | RelayOutcome::FatalSetup { sink_url, .. }
            | RelayOutcome::DiedAfterStreaming { sink_url, .. } => sink_url,
        }
    }

    pub fn attempt(&self) -> Attempt {
        match self {
            RelayOutcome::Started { attempt, .. }
            | RelayOutcome::FatalSetup { attempt, .. }
            | RelayOutcome::DiedAfterStreaming { attempt, .. } => *attempt,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            RelayOutcome::Started { .. } => None,
            RelayOutcome::FatalSetup { reason, .. } | RelayOutcome::DiedAfterStreaming { reason, .. } => {
                Some(reason)
            }
        }
    }
}

/// Callback a worker invokes with its outcomes. Called from the worker's task;
/// at most one `Started`, always before any failure outcome.
pub type OutcomeCallback = Arc<dyn Fn(RelayOutcome) + Send + Sync>;
