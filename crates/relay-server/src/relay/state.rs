use std::sync::atomic::{AtomicU8, Ordering};

pub use relay_protocol::SessionState;

/// Session state shared between a worker and the registry
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(encode(state)))
    }

    pub fn get(&self) -> SessionState {
        decode(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(encode(state), Ordering::Release);
    }

    /// Move to `to` only from `from`. Returns whether the transition happened.
    pub fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn encode(state: SessionState) -> u8 {
    match state {
        SessionState::Starting => 0,
        SessionState::Streaming => 1,
        SessionState::Stopping => 2,
        SessionState::Dead => 3,
    }
}

fn decode(raw: u8) -> SessionState {
    match raw {
        0 => SessionState::Starting,
        1 => SessionState::Streaming,
        2 => SessionState::Stopping,
        _ => SessionState::Dead,
    }
}
