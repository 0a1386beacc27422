//! FLV container framing
//!
//! ```text
//! File:  | Header(9) | PrevTagSize0(4) | Tag 1 | PrevTagSize1(4) | Tag 2 | ...
//! Tag:   | Type(1) | DataSize(3) | TS(3) | TSExt(1) | StreamID(3) | Data(N) |
//! ```
//!
//! Video tag data starts with `FrameType(4 bits) | CodecID(4 bits)`; AVC and
//! HEVC follow it with `PacketType(1) | CompositionTime(SI24)`.

use crate::error::{Result, TransportError};
use crate::unit::MediaKind;

pub const FLV_HEADER_LEN: usize = 9;
pub const TAG_HEADER_LEN: usize = 11;
pub const PREV_TAG_SIZE_LEN: usize = 4;

pub const TAG_AUDIO: u8 = 8;
pub const TAG_VIDEO: u8 = 9;
pub const TAG_SCRIPT: u8 = 18;

const FLAG_AUDIO: u8 = 0x04;
const FLAG_VIDEO: u8 = 0x01;

const CODEC_AVC: u8 = 7;
const CODEC_HEVC: u8 = 12;
const FRAME_KEY: u8 = 1;

/// The 9-byte file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub has_audio: bool,
    pub has_video: bool,
    /// Offset of the first PreviousTagSize field
    pub data_offset: u32,
}

impl FlvHeader {
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            has_audio,
            has_video,
            data_offset: FLV_HEADER_LEN as u32,
        }
    }

    pub fn parse(buf: &[u8; FLV_HEADER_LEN]) -> Result<Self> {
        if &buf[0..3] != b"FLV" {
            return Err(TransportError::Malformed("missing FLV signature".into()));
        }
        if buf[3] != 1 {
            return Err(TransportError::Malformed(format!("unsupported FLV version {}", buf[3])));
        }

        let data_offset = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        if (data_offset as usize) < FLV_HEADER_LEN {
            return Err(TransportError::Malformed(format!("header data offset {} too small", data_offset)));
        }

        Ok(Self {
            has_audio: buf[4] & FLAG_AUDIO != 0,
            has_video: buf[4] & FLAG_VIDEO != 0,
            data_offset,
        })
    }

    pub fn encode(&self) -> [u8; FLV_HEADER_LEN] {
        let mut flags = 0;
        if self.has_audio {
            flags |= FLAG_AUDIO;
        }
        if self.has_video {
            flags |= FLAG_VIDEO;
        }

        let offset = self.data_offset.to_be_bytes();
        [b'F', b'L', b'V', 1, flags, offset[0], offset[1], offset[2], offset[3]]
    }
}

/// The 11-byte header in front of every tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub tag_type: u8,
    pub data_size: u32,
    /// Milliseconds, including the extended upper byte
    pub timestamp: u32,
}

impl TagHeader {
    pub fn parse(buf: &[u8; TAG_HEADER_LEN]) -> Self {
        let data_size = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[7], buf[4], buf[5], buf[6]]);

        Self {
            // Bit 5 is the encryption filter flag, not part of the type
            tag_type: buf[0] & 0x1F,
            data_size,
            timestamp,
        }
    }

    pub fn encode(&self) -> [u8; TAG_HEADER_LEN] {
        let size = self.data_size.to_be_bytes();
        let ts = self.timestamp.to_be_bytes();
        [
            self.tag_type,
            size[1],
            size[2],
            size[3],
            ts[1],
            ts[2],
            ts[3],
            ts[0],
            0,
            0,
            0,
        ]
    }

    /// Size of the tag as recorded in the PreviousTagSize trailer
    pub fn tag_size(&self) -> u32 {
        TAG_HEADER_LEN as u32 + self.data_size
    }
}

pub fn kind_for_tag(tag_type: u8) -> Option<MediaKind> {
    match tag_type {
        TAG_VIDEO => Some(MediaKind::Video),
        TAG_AUDIO => Some(MediaKind::Audio),
        TAG_SCRIPT => Some(MediaKind::Data),
        _ => None,
    }
}

pub fn tag_for_kind(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Video => TAG_VIDEO,
        MediaKind::Audio => TAG_AUDIO,
        MediaKind::Data => TAG_SCRIPT,
    }
}

pub fn is_video_keyframe(data: &[u8]) -> bool {
    data.first().is_some_and(|b| (b >> 4) & 0x0F == FRAME_KEY)
}

/// Composition time offset (pts - dts) of an AVC/HEVC NALU tag
pub fn composition_time(data: &[u8]) -> Option<i32> {
    let codec = data.first()? & 0x0F;
    if codec != CODEC_AVC && codec != CODEC_HEVC {
        return None;
    }
    if *data.get(1)? != 1 {
        return None;
    }

    let raw = u32::from_be_bytes([0, *data.get(2)?, *data.get(3)?, *data.get(4)?]);
    // Sign-extend the 24-bit value
    Some(((raw << 8) as i32) >> 8)
}

pub fn video_codec_name(data: &[u8]) -> Option<&'static str> {
    match data.first()? & 0x0F {
        2 => Some("h263"),
        4 | 5 => Some("vp6"),
        CODEC_AVC => Some("h264"),
        CODEC_HEVC => Some("hevc"),
        13 => Some("av1"),
        _ => None,
    }
}

pub fn audio_codec_name(data: &[u8]) -> Option<&'static str> {
    match (data.first()? >> 4) & 0x0F {
        2 | 14 => Some("mp3"),
        7 => Some("pcm_alaw"),
        8 => Some("pcm_mulaw"),
        10 => Some("aac"),
        11 => Some("speex"),
        _ => None,
    }
}
