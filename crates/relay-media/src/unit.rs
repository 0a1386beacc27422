//! Stream descriptors and the data units flowing through a relay

use bytes::Bytes;

use crate::timebase::{rescale, TimeBase};

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Data,
}

/// Description of one stream inside a source or sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: TimeBase,
    /// Codec name when the container exposes it
    pub codec: Option<String>,
}

impl StreamInfo {
    pub fn new(index: usize, kind: MediaKind, time_base: TimeBase) -> Self {
        Self {
            index,
            kind,
            time_base,
            codec: None,
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }
}

/// One demuxed packet travelling from a source to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUnit {
    pub stream_index: usize,
    /// Presentation timestamp in the owning stream's timebase
    pub pts: Option<i64>,
    /// Decode timestamp in the owning stream's timebase
    pub dts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
    pub data: Bytes,
}

impl MediaUnit {
    pub fn new(stream_index: usize, data: Bytes) -> Self {
        Self {
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            keyframe: false,
            data,
        }
    }

    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// Timestamp used for pacing: dts, or pts when the container has no dts
    pub fn clock(&self) -> Option<i64> {
        self.dts.or(self.pts)
    }

    /// Move every timestamp of this unit from one timebase to another.
    /// Missing timestamps stay missing.
    pub fn rescale(&mut self, from: TimeBase, to: TimeBase) {
        self.pts = self.pts.map(|ts| rescale(ts, from, to));
        self.dts = self.dts.map(|ts| rescale(ts, from, to));
        self.duration = rescale(self.duration, from, to);
    }
}
