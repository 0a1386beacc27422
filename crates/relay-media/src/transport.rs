//! Capability traits implemented by a relay engine
//!
//! One relay attempt goes through these calls in order:
//!
//! ```text
//! MediaTransport::open(source)            -> MediaSource
//! MediaTransport::negotiate_output(...)   -> MediaSink
//! MediaSink::write_header()
//! loop { MediaSource::read_unit() -> MediaSink::write_unit() }
//! MediaSink::finish(); MediaSource::close()
//! ```
//!
//! Callers own the ordering and must call `finish`/`close` exactly once on
//! every exit path. Implementations never apply their own deadlines to
//! `read_unit`/`write_unit`; the caller races them against its own timers.

use async_trait::async_trait;

use crate::error::Result;
use crate::unit::{MediaUnit, StreamInfo};

/// A relay engine able to open sources and sinks
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Name under which the transport is registered
    fn name(&self) -> &str;

    /// Reject sink URLs this transport could never write to
    fn check_sink_url(&self, _sink_url: &str) -> Result<()> {
        Ok(())
    }

    /// Open a source and probe its streams
    async fn open(&self, source_url: &str) -> Result<Box<dyn MediaSource>>;

    /// Create a sink mirroring `streams`, muxed as `container_hint`
    async fn negotiate_output(
        &self,
        streams: &[StreamInfo],
        sink_url: &str,
        container_hint: &str,
    ) -> Result<Box<dyn MediaSink>>;
}

/// The pulling half of a relay
#[async_trait]
pub trait MediaSource: Send {
    fn streams(&self) -> &[StreamInfo];

    /// Next unit, or `None` at end of stream
    async fn read_unit(&mut self) -> Result<Option<MediaUnit>>;

    async fn close(&mut self) -> Result<()>;
}

/// The pushing half of a relay
#[async_trait]
pub trait MediaSink: Send {
    fn streams(&self) -> &[StreamInfo];

    async fn write_header(&mut self) -> Result<()>;

    /// Write a unit whose timestamps are already in the sink stream's timebase
    async fn write_unit(&mut self, unit: MediaUnit) -> Result<()>;

    /// Write the trailer, flush and close the output
    async fn finish(&mut self) -> Result<()>;
}
