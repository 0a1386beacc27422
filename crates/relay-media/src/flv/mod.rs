//! FLV relay backend
//!
//! Pulls FLV from a file or a raw TCP stream and pushes it, tag by tag, to
//! another file or TCP peer. Every stream uses the 1/1000 FLV tag clock:
//!
//! | index | kind  | tag type |
//! |-------|-------|----------|
//! | 0     | video | 9        |
//! | 1     | audio | 8        |
//! | 2     | data  | 18       |

mod endpoint;
mod sink;
mod source;
pub mod tag;

use async_trait::async_trait;

pub use endpoint::Endpoint;
pub use sink::FlvSink;
pub use source::FlvSource;

use crate::error::{Result, TransportError};
use crate::timebase::TimeBase;
use crate::transport::{MediaSink, MediaSource, MediaTransport};
use crate::unit::{MediaKind, StreamInfo};

pub const VIDEO_STREAM: usize = 0;
pub const AUDIO_STREAM: usize = 1;
pub const DATA_STREAM: usize = 2;

pub(crate) fn flv_streams() -> Vec<StreamInfo> {
    vec![
        StreamInfo::new(VIDEO_STREAM, MediaKind::Video, TimeBase::MILLISECONDS),
        StreamInfo::new(AUDIO_STREAM, MediaKind::Audio, TimeBase::MILLISECONDS),
        StreamInfo::new(DATA_STREAM, MediaKind::Data, TimeBase::MILLISECONDS),
    ]
}

pub(crate) fn stream_index_for(kind: MediaKind) -> usize {
    match kind {
        MediaKind::Video => VIDEO_STREAM,
        MediaKind::Audio => AUDIO_STREAM,
        MediaKind::Data => DATA_STREAM,
    }
}

#[derive(Debug, Default)]
pub struct FlvTransport;

impl FlvTransport {
    pub const NAME: &'static str = "flv";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaTransport for FlvTransport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check_sink_url(&self, sink_url: &str) -> Result<()> {
        Endpoint::parse(sink_url).map(|_| ())
    }

    async fn open(&self, source_url: &str) -> Result<Box<dyn MediaSource>> {
        Ok(Box::new(FlvSource::open(source_url).await?))
    }

    async fn negotiate_output(
        &self,
        streams: &[StreamInfo],
        sink_url: &str,
        container_hint: &str,
    ) -> Result<Box<dyn MediaSink>> {
        if !container_hint.eq_ignore_ascii_case(Self::NAME) {
            return Err(TransportError::Negotiate(format!(
                "flv transport cannot mux '{}'",
                container_hint
            )));
        }
        Ok(Box::new(FlvSink::create(streams, sink_url).await?))
    }
}
