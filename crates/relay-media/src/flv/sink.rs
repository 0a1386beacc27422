use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::endpoint::{ByteWriter, Endpoint};
use super::tag::{self, FlvHeader, TagHeader};
use crate::error::{Result, TransportError};
use crate::timebase::TimeBase;
use crate::transport::MediaSink;
use crate::unit::{MediaKind, MediaUnit, StreamInfo};

const MAX_TAG_DATA: usize = 0x00FF_FFFF;

/// Muxes units into FLV tags towards a file or a TCP peer
pub struct FlvSink {
    url: String,
    writer: Option<BufWriter<ByteWriter>>,
    header: FlvHeader,
    streams: Vec<StreamInfo>,
    tag_types: HashMap<usize, u8>,
    header_written: bool,
}

impl FlvSink {
    /// Mirror `input` streams into an FLV output at `url`.
    ///
    /// FLV carries at most one video and one audio stream; script data
    /// streams are unrestricted.
    pub async fn create(input: &[StreamInfo], url: &str) -> Result<Self> {
        let mut tag_types = HashMap::new();
        let mut streams = Vec::with_capacity(input.len());
        let mut has_audio = false;
        let mut has_video = false;

        for stream in input {
            let seen = match stream.kind {
                MediaKind::Video => std::mem::replace(&mut has_video, true),
                MediaKind::Audio => std::mem::replace(&mut has_audio, true),
                MediaKind::Data => false,
            };
            if seen {
                return Err(TransportError::Negotiate(format!(
                    "flv output holds a single {:?} stream, source has more",
                    stream.kind
                )));
            }

            tag_types.insert(stream.index, tag::tag_for_kind(stream.kind));
            streams.push(StreamInfo {
                index: stream.index,
                kind: stream.kind,
                time_base: TimeBase::MILLISECONDS,
                codec: stream.codec.clone(),
            });
        }

        let writer = Endpoint::parse(url)?.open_writer().await?;

        Ok(Self {
            url: url.to_string(),
            writer: Some(BufWriter::new(writer)),
            header: FlvHeader::new(has_audio, has_video),
            streams,
            tag_types,
            header_written: false,
        })
    }

    fn writer(&mut self) -> Result<&mut BufWriter<ByteWriter>> {
        self.writer
            .as_mut()
            .ok_or_else(|| TransportError::Malformed(format!("{} already finished", self.url)))
    }
}

#[async_trait]
impl MediaSink for FlvSink {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    async fn write_header(&mut self) -> Result<()> {
        let header = self.header.encode();
        let writer = self.writer()?;
        writer.write_all(&header).await?;
        writer.write_u32(0).await?;
        self.header_written = true;
        Ok(())
    }

    async fn write_unit(&mut self, unit: MediaUnit) -> Result<()> {
        if !self.header_written {
            return Err(TransportError::Malformed(format!("{}: header not written", self.url)));
        }
        let tag_type = *self
            .tag_types
            .get(&unit.stream_index)
            .ok_or(TransportError::UnknownStream(unit.stream_index))?;

        if unit.data.len() > MAX_TAG_DATA {
            return Err(TransportError::Malformed(format!(
                "{}: unit of {} bytes exceeds the FLV tag limit",
                self.url,
                unit.data.len()
            )));
        }

        let timestamp = unit.clock().unwrap_or(0).clamp(0, u32::MAX as i64) as u32;
        let header = TagHeader {
            tag_type,
            data_size: unit.data.len() as u32,
            timestamp,
        };

        let writer = self.writer()?;
        writer.write_all(&header.encode()).await?;
        writer.write_all(&unit.data).await?;
        writer.write_u32(header.tag_size()).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.shutdown().await?;
            tracing::debug!("Finished FLV sink {}", self.url);
        }
        Ok(())
    }
}
