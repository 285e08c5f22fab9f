//! # Stream Codec
//!
//! `tokio_util` framing for the packet wire format, for use with
//! `Framed`, `FramedRead` and `FramedWrite` over async transports.
//!
//! The decoder is incremental: the header is parsed once, then the codec
//! waits for the declared blob bytes without re-parsing.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::header::Header;
use crate::core::packet::{parse_header, parse_prefix, Packet, PacketCodec, PREFIX_SIZE};
use crate::error::{FramingFault, ProtocolError, Result};
use crate::utils::trace::{Trace, TracingSink};

/// Cap on buffer growth requested ahead of blob bytes arriving
const RESERVE_LIMIT: usize = 64 * 1024;

#[derive(Debug)]
enum State {
    Prefix,
    Blob { header: Header, blob_len: usize },
}

/// Frame codec for `tokio_util::codec`
#[derive(Debug)]
pub struct StreamCodec<T = TracingSink> {
    inner: PacketCodec<T>,
    state: State,
}

impl Default for StreamCodec<TracingSink> {
    fn default() -> Self {
        Self::new(PacketCodec::default())
    }
}

impl<T: Trace> StreamCodec<T> {
    pub fn new(inner: PacketCodec<T>) -> Self {
        Self {
            inner,
            state: State::Prefix,
        }
    }
}

impl<T: Trace> Decoder for StreamCodec<T> {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let (header, blob_len) = match std::mem::replace(&mut self.state, State::Prefix) {
            State::Blob { header, blob_len } => (header, blob_len),
            State::Prefix => {
                if src.len() < PREFIX_SIZE {
                    src.reserve(PREFIX_SIZE - src.len());
                    return Ok(None);
                }
                let mut prefix = [0u8; PREFIX_SIZE];
                prefix.copy_from_slice(&src[..PREFIX_SIZE]);
                let header_len = parse_prefix(&prefix, self.inner.tracer())?;

                let header_end = PREFIX_SIZE + header_len;
                if src.len() < header_end {
                    src.reserve(header_end - src.len());
                    return Ok(None);
                }

                let parsed = if header_len == 0 {
                    (Header::new(), 0)
                } else {
                    parse_header(&src[PREFIX_SIZE..header_end], self.inner.tracer())?
                };
                src.advance(header_end);
                parsed
            }
        };

        if src.len() < blob_len {
            src.reserve((blob_len - src.len()).min(RESERVE_LIMIT));
            self.state = State::Blob { header, blob_len };
            return Ok(None);
        }

        let blob = src.split_to(blob_len).to_vec();
        Ok(Some(Packet { header, blob }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }

        match &self.state {
            State::Prefix if src.is_empty() => Ok(None),
            State::Prefix => {
                let expected = if src.len() < PREFIX_SIZE {
                    PREFIX_SIZE
                } else {
                    PREFIX_SIZE + i16::from_be_bytes([src[4], src[5]]).max(0) as usize
                };
                Err(ProtocolError::ShortRead {
                    expected,
                    actual: src.len(),
                })
            }
            State::Blob { blob_len, .. } => Err(ProtocolError::framing(FramingFault::Blob {
                expected: *blob_len,
                cause: format!("stream ended after {} bytes", src.len()),
            })),
        }
    }
}

impl<T: Trace> Encoder<Packet> for StreamCodec<T> {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let Packet { mut header, blob } = item;
        header.set_blob_size(blob.len());
        dst.reserve(PREFIX_SIZE + blob.len());
        self.inner.encode_into(&header, &blob, dst)
    }
}
