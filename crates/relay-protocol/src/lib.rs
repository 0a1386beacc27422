//! Wire types for the stream relay control plane
//!
//! Shared between the relay server and anything that talks to its REST API.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
