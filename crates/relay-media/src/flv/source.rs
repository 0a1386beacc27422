use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, BufReader};

use super::endpoint::{ByteReader, Endpoint};
use super::tag::{self, FlvHeader, TagHeader, FLV_HEADER_LEN, PREV_TAG_SIZE_LEN, TAG_HEADER_LEN};
use super::{flv_streams, stream_index_for};
use crate::error::{Result, TransportError};
use crate::transport::MediaSource;
use crate::unit::{MediaKind, MediaUnit, StreamInfo};

/// Demuxes FLV tags from a file or a TCP peer
pub struct FlvSource {
    url: String,
    reader: Option<BufReader<ByteReader>>,
    header: FlvHeader,
    streams: Vec<StreamInfo>,
}

impl FlvSource {
    pub async fn open(url: &str) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        let mut reader = BufReader::new(endpoint.open_reader().await?);

        let mut buf = [0u8; FLV_HEADER_LEN];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| TransportError::Open(format!("{}: reading FLV header: {}", url, e)))?;
        let header = FlvHeader::parse(&buf)?;

        // Skip any header extension, then PreviousTagSize0
        let skip = (header.data_offset as u64) - FLV_HEADER_LEN as u64 + PREV_TAG_SIZE_LEN as u64;
        let skipped = tokio::io::copy(&mut (&mut reader).take(skip), &mut tokio::io::sink())
            .await
            .map_err(|e| TransportError::Open(format!("{}: truncated FLV header: {}", url, e)))?;
        if skipped < skip {
            return Err(TransportError::Open(format!(
                "{}: truncated FLV header: {} of {} bytes",
                url, skipped, skip
            )));
        }

        tracing::debug!(
            "Opened FLV source {} (audio: {}, video: {})",
            url,
            header.has_audio,
            header.has_video
        );

        Ok(Self {
            url: url.to_string(),
            reader: Some(reader),
            header,
            streams: flv_streams(),
        })
    }

    pub fn header(&self) -> &FlvHeader {
        &self.header
    }

    /// Read one tag. `None` only when the stream ends on a tag boundary.
    async fn read_tag(&mut self) -> Result<Option<(TagHeader, Bytes)>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| TransportError::Malformed(format!("{} already closed", self.url)))?;

        let mut buf = [0u8; TAG_HEADER_LEN];
        let mut filled = 0;
        while filled < TAG_HEADER_LEN {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            filled += n;
        }

        let header = TagHeader::parse(&buf);
        let mut data = BytesMut::zeroed(header.data_size as usize);
        reader.read_exact(&mut data).await?;

        let prev_size = reader.read_u32().await?;
        if prev_size != header.tag_size() {
            tracing::trace!(
                "{}: previous tag size {} does not match tag size {}",
                self.url,
                prev_size,
                header.tag_size()
            );
        }

        Ok(Some((header, data.freeze())))
    }
}

#[async_trait]
impl MediaSource for FlvSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    async fn read_unit(&mut self) -> Result<Option<MediaUnit>> {
        loop {
            let Some((header, data)) = self.read_tag().await? else {
                return Ok(None);
            };

            let Some(kind) = tag::kind_for_tag(header.tag_type) else {
                tracing::trace!("{}: skipping tag type {}", self.url, header.tag_type);
                continue;
            };

            match kind {
                MediaKind::Video if self.streams[0].codec.is_none() => {
                    if let Some(name) = tag::video_codec_name(&data) {
                        self.streams[0].codec = Some(name.to_string());
                    }
                }
                MediaKind::Audio if self.streams[1].codec.is_none() => {
                    if let Some(name) = tag::audio_codec_name(&data) {
                        self.streams[1].codec = Some(name.to_string());
                    }
                }
                _ => {}
            }

            let dts = header.timestamp as i64;
            let (pts, keyframe) = match kind {
                MediaKind::Video => (
                    dts + tag::composition_time(&data).unwrap_or(0) as i64,
                    tag::is_video_keyframe(&data),
                ),
                _ => (dts, true),
            };

            let unit = MediaUnit {
                stream_index: stream_index_for(kind),
                pts: Some(pts),
                dts: Some(dts),
                duration: 0,
                keyframe,
                data,
            };
            return Ok(Some(unit));
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            tracing::debug!("Closed FLV source {}", self.url);
        }
        Ok(())
    }
}
