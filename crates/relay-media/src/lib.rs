//! Media transport library for the stream relay
//!
//! This crate is the boundary between relay orchestration and the code that
//! actually moves media:
//! - capability traits a relay engine implements (`MediaTransport`,
//!   `MediaSource`, `MediaSink`)
//! - stream descriptors, data units and timebase rescaling
//! - a name-keyed factory so backends can be swapped by configuration
//! - the `flv` backend (files and raw TCP streams)

pub mod error;
pub mod factory;
pub mod flv;
pub mod timebase;
pub mod transport;
pub mod unit;

pub use error::TransportError;
pub use factory::TransportFactory;
pub use timebase::{rescale, TimeBase};
pub use transport::{MediaSink, MediaSource, MediaTransport};
pub use unit::{MediaKind, MediaUnit, StreamInfo};
