//! # Packet Framing
//!
//! Encodes a header plus an opaque blob into one self-describing frame and
//! reads it back from a blocking byte stream.
//!
//! ## Wire Format
//! ```text
//! [Signature(4) "wsbt"] [HeaderLen(2, i16)] [Header(HeaderLen, JSON)] [Blob(header["blob.size"])]
//! ```
//!
//! All integers are big-endian. The blob carries no length prefix of its own;
//! the decoder takes it from the `blob.size` header entry.
//!
//! ## Security
//! - Header length is validated against [`MAX_HEADER_SIZE`] before allocation
//! - Blob buffers grow with the bytes actually received, not the declared size

use bytes::BufMut;
use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::TransportConfig;
use crate::core::header::{Header, LookupError, BLOB_SIZE_KEY};
use crate::error::{FramingFault, ProtocolError, Result};
use crate::stream::{read_full, write_all, WriteDeadline};
use crate::utils::trace::{Trace, TracingSink};

/// Protocol magic, ASCII "wsbt"
pub const SIGNATURE: u32 = 0x7773_6274;

/// Signature plus header length
pub const PREFIX_SIZE: usize = 4 + 2;

/// Upper bound for the serialized header
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

/// Write deadline applied when enabled in configuration
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Initial blob allocation cap; larger blobs grow as bytes arrive
const BLOB_PREALLOC_LIMIT: usize = 64 * 1024;

/// A decoded frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub blob: Vec<u8>,
}

impl Packet {
    pub fn new(header: Header, blob: Vec<u8>) -> Self {
        Self { header, blob }
    }
}

/// Blocking encoder/decoder for frames.
///
/// Non-fatal anomalies are reported through the `T` sink.
#[derive(Debug, Clone)]
pub struct PacketCodec<T = TracingSink> {
    trace: T,
    write_deadline: Option<Duration>,
}

impl Default for PacketCodec<TracingSink> {
    fn default() -> Self {
        Self::with_trace(TracingSink)
    }
}

impl PacketCodec<TracingSink> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Trace> PacketCodec<T> {
    pub fn with_trace(trace: T) -> Self {
        Self {
            trace,
            write_deadline: None,
        }
    }

    /// Build a codec honouring the `write_deadline` settings of `config`
    pub fn from_config(config: &TransportConfig, trace: T) -> Self {
        Self::with_trace(trace).with_write_deadline(
            config.write_deadline.then_some(config.write_timeout),
        )
    }

    pub(crate) fn tracer(&self) -> &T {
        &self.trace
    }

    /// Deadline applied by [`PacketCodec::write_with_deadline`]; `None` disables it
    pub fn with_write_deadline(mut self, timeout: Option<Duration>) -> Self {
        self.write_deadline = timeout;
        self
    }

    /// Encode `header` and `blob` into a single frame
    pub fn encode(&self, header: &Header, blob: &[u8]) -> Result<Vec<u8>> {
        let mut frame = Vec::new();
        self.encode_into(header, blob, &mut frame)?;
        Ok(frame)
    }

    /// Encode into an existing buffer. Nothing is written on error.
    pub fn encode_into<B: BufMut>(&self, header: &Header, blob: &[u8], dst: &mut B) -> Result<()> {
        let header_data = serialize_header(header, blob, &self.trace)?;
        let header_len = i16::try_from(header_data.len())
            .map_err(|_| ProtocolError::HeaderTooLarge(header_data.len()))?;

        dst.put_u32(SIGNATURE);
        dst.put_i16(header_len);
        dst.put_slice(&header_data);
        dst.put_slice(blob);
        Ok(())
    }

    /// Read one frame from `from`.
    ///
    /// Any error leaves the stream at an unknown position.
    pub fn decode<R: Read + ?Sized>(&self, from: &mut R) -> Result<Packet> {
        let mut prefix = [0u8; PREFIX_SIZE];
        let got = read_full(from, &mut prefix)?;
        if got != PREFIX_SIZE {
            return Err(ProtocolError::ShortRead {
                expected: PREFIX_SIZE,
                actual: got,
            });
        }
        let header_len = parse_prefix(&prefix, &self.trace)?;

        if header_len == 0 {
            return Ok(Packet::default());
        }

        let mut raw = vec![0u8; header_len];
        let got = read_full(from, &mut raw)?;
        if got != header_len {
            self.trace.trace(format_args!(
                "invalid header size: {got} vs {header_len}"
            ));
            return Err(ProtocolError::ShortRead {
                expected: header_len,
                actual: got,
            });
        }

        let (header, blob_len) = parse_header(&raw, &self.trace)?;
        let blob = if blob_len > 0 {
            read_blob(from, blob_len).map_err(|e| {
                self.trace.trace(format_args!("failed to read blob: {e}"));
                ProtocolError::framing(FramingFault::Blob {
                    expected: blob_len,
                    cause: e.to_string(),
                })
            })?
        } else {
            Vec::new()
        };

        debug!(header_len, blob_len, "decoded packet");
        Ok(Packet { header, blob })
    }

    /// Stamp `blob.size` into `header`, encode, and write the whole frame.
    ///
    /// Partial writes are retried; any write error aborts the frame.
    #[instrument(level = "debug", skip_all, fields(blob_len = blob.len()))]
    pub fn write<W: Write + ?Sized>(&self, to: &mut W, header: &mut Header, blob: &[u8]) -> Result<()> {
        header.set_blob_size(blob.len());

        let frame = self.encode(header, blob).inspect_err(|e| {
            self.trace
                .trace(format_args!("failed to create binary packet: {e}"));
        })?;

        write_all(to, &frame)?;
        Ok(())
    }

    /// Like [`PacketCodec::write`], first applying the configured write deadline
    pub fn write_with_deadline<W>(&self, to: &mut W, header: &mut Header, blob: &[u8]) -> Result<()>
    where
        W: Write + WriteDeadline + ?Sized,
    {
        if let Some(timeout) = self.write_deadline {
            debug!(?timeout, "setting write deadline");
            if let Err(e) = to.set_write_deadline(timeout) {
                warn!(error = %e, "failed to set write deadline");
            }
        }
        self.write(to, header, blob)
    }
}

/// Serialize the header, correcting `blob.size` when it disagrees with `blob`.
///
/// With an empty blob only a positive stale size is corrected; a missing,
/// non-numeric or non-positive entry already decodes as no blob.
pub(crate) fn serialize_header<T: Trace + ?Sized>(
    header: &Header,
    blob: &[u8],
    trace: &T,
) -> Result<Vec<u8>> {
    let mut header = Cow::Borrowed(header);
    let stored = header.get_int(BLOB_SIZE_KEY);
    let stale = if blob.is_empty() {
        matches!(stored, Ok(size) if size > 0)
    } else {
        !matches!(stored, Ok(size) if usize::try_from(size) == Ok(blob.len()))
    };
    if stale {
        match stored {
            Ok(size) => trace.trace(format_args!(
                "wrong blob size. {size} instead of {}",
                blob.len()
            )),
            Err(e) => trace.trace(format_args!(
                "wrong blob size. {BLOB_SIZE_KEY} {e} instead of {}",
                blob.len()
            )),
        }
        header.to_mut().set_blob_size(blob.len());
    }

    if header.is_empty() {
        return Ok(Vec::new());
    }

    let data = header.to_json().map_err(|e| {
        trace.trace(format_args!("failed to marshal header: {e}"));
        ProtocolError::HeaderSerialize(e)
    })?;
    if data.len() > MAX_HEADER_SIZE {
        trace.trace(format_args!(
            "header too big: maximum allowed header size exceeded: {}",
            data.len()
        ));
        return Err(ProtocolError::HeaderTooLarge(data.len()));
    }
    Ok(data)
}

/// Validate signature and header length, returning the header length
pub(crate) fn parse_prefix<T: Trace + ?Sized>(prefix: &[u8; PREFIX_SIZE], trace: &T) -> Result<usize> {
    let signature = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if signature != SIGNATURE {
        trace.trace(format_args!("invalid signature: {signature:#x}"));
        return Err(ProtocolError::framing(FramingFault::Magic(signature)));
    }

    let header_len = i16::from_be_bytes([prefix[4], prefix[5]]);
    match usize::try_from(header_len) {
        Ok(len) if len <= MAX_HEADER_SIZE => Ok(len),
        _ => {
            trace.trace(format_args!("invalid header size: {header_len}"));
            Err(ProtocolError::framing(FramingFault::HeaderLength(header_len)))
        }
    }
}

/// Parse header bytes and work out the blob length they declare
pub(crate) fn parse_header<T: Trace + ?Sized>(raw: &[u8], trace: &T) -> Result<(Header, usize)> {
    let header = Header::from_json(raw).map_err(|e| {
        trace.trace(format_args!("failed to unmarshal header: {e}"));
        ProtocolError::HeaderParse(e)
    })?;

    let blob_len = match header.blob_size() {
        Ok(size) => size,
        Err(LookupError::NotFound) => {
            trace.trace(format_args!("{BLOB_SIZE_KEY} is not found"));
            0
        }
        Err(LookupError::WrongType) => {
            trace.trace(format_args!("{BLOB_SIZE_KEY} is not a number"));
            0
        }
        Err(LookupError::OutOfRange) => {
            // only numbers get this far
            let size = header.get_int(BLOB_SIZE_KEY).unwrap_or_default();
            if size > 0 {
                trace.trace(format_args!("{BLOB_SIZE_KEY} is too large: {size}"));
                return Err(ProtocolError::framing(FramingFault::BlobSize(size)));
            }
            trace.trace(format_args!("{BLOB_SIZE_KEY} is negative: {size}"));
            0
        }
    };
    Ok((header, blob_len))
}

fn read_blob<R: Read + ?Sized>(from: &mut R, expected: usize) -> io::Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(expected.min(BLOB_PREALLOC_LIMIT));
    let got = from.take(expected as u64).read_to_end(&mut blob)?;
    if got != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended after {got} bytes"),
        ));
    }
    Ok(blob)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::stream::testing::{Choppy, Trickle};
    use serde_json::json;
    use std::cell::RefCell;
    use std::fmt;

    fn codec_with_log() -> (PacketCodec<impl Trace>, std::rc::Rc<RefCell<Vec<String>>>) {
        let log = std::rc::Rc::new(RefCell::new(Vec::new()));
        let sink = {
            let log = log.clone();
            move |args: fmt::Arguments<'_>| log.borrow_mut().push(args.to_string())
        };
        (PacketCodec::with_trace(sink), log)
    }

    #[test]
    fn test_hello_frame_layout() {
        let codec = PacketCodec::new();
        let header: Header = [(BLOB_SIZE_KEY, json!(5))].into_iter().collect();
        let frame = codec.encode(&header, b"hello").unwrap();

        assert_eq!(&frame[..4], &[0x77, 0x73, 0x62, 0x74]);
        // compact JSON: {"blob.size":5} is 15 bytes
        assert_eq!(&frame[4..6], &[0x00, 0x0f]);
        assert_eq!(&frame[6..21], br#"{"blob.size":5}"#.as_slice());
        assert_eq!(&frame[21..], b"hello");
        assert_eq!(frame.len(), PREFIX_SIZE + 15 + 5);

        let packet = codec.decode(&mut frame.as_slice()).unwrap();
        assert_eq!(packet.header.get_int(BLOB_SIZE_KEY), Ok(5));
        assert_eq!(packet.blob, b"hello");
    }

    #[test]
    fn test_encode_corrects_wrong_blob_size() {
        let (codec, log) = codec_with_log();
        let header: Header = [(BLOB_SIZE_KEY, json!(3))].into_iter().collect();
        let frame = codec.encode(&header, b"hello").unwrap();

        assert_eq!(log.borrow().as_slice(), ["wrong blob size. 3 instead of 5"]);
        let packet = codec.decode(&mut frame.as_slice()).unwrap();
        assert_eq!(packet.blob, b"hello");
        // caller's header is untouched
        assert_eq!(header.get_int(BLOB_SIZE_KEY), Ok(3));
    }

    #[test]
    fn test_encode_clears_stale_size_for_empty_blob() {
        let (codec, log) = codec_with_log();
        let header: Header = [("kind", json!("ack")), (BLOB_SIZE_KEY, json!(5))]
            .into_iter()
            .collect();
        let mut frame = codec.encode(&header, &[]).unwrap();
        frame.extend_from_slice(b"next");

        assert_eq!(log.borrow().as_slice(), ["wrong blob size. 5 instead of 0"]);
        let mut cursor = frame.as_slice();
        let packet = codec.decode(&mut cursor).unwrap();
        assert!(packet.blob.is_empty());
        assert_eq!(packet.header.get_int(BLOB_SIZE_KEY), Ok(0));
        assert_eq!(packet.header.get_text("kind"), Ok("ack"));
        assert_eq!(cursor, b"next");
        assert_eq!(header.get_int(BLOB_SIZE_KEY), Ok(5));
    }

    #[test]
    fn test_empty_blob_keeps_harmless_sizes() {
        let (codec, log) = codec_with_log();
        for size in [json!(0), json!(-3), json!("5")] {
            let header: Header = [(BLOB_SIZE_KEY, size.clone())].into_iter().collect();
            let frame = codec.encode(&header, &[]).unwrap();
            let packet = codec.decode(&mut frame.as_slice()).unwrap();
            assert!(packet.blob.is_empty());
            assert_eq!(packet.header.get(BLOB_SIZE_KEY), Some(&size));
        }
        assert!(!log.borrow().iter().any(|line| line.starts_with("wrong blob size")));
    }

    #[test]
    fn test_negative_blob_size_is_reported() {
        let (codec, log) = codec_with_log();
        let raw = br#"{"blob.size":-7}"#;
        let mut frame = Vec::new();
        frame.extend_from_slice(&SIGNATURE.to_be_bytes());
        frame.extend_from_slice(&(raw.len() as i16).to_be_bytes());
        frame.extend_from_slice(raw);

        let packet = codec.decode(&mut frame.as_slice()).unwrap();
        assert!(packet.blob.is_empty());
        assert_eq!(log.borrow().as_slice(), ["blob.size is negative: -7"]);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_oversized_blob_size_is_framing_error() {
        let (codec, log) = codec_with_log();
        let raw = br#"{"blob.size":8589934592}"#;
        let mut frame = Vec::new();
        frame.extend_from_slice(&SIGNATURE.to_be_bytes());
        frame.extend_from_slice(&(raw.len() as i16).to_be_bytes());
        frame.extend_from_slice(raw);

        match codec.decode(&mut frame.as_slice()) {
            Err(ProtocolError::InvalidSignature {
                fault: FramingFault::BlobSize(8_589_934_592),
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(log.borrow().as_slice(), ["blob.size is too large: 8589934592"]);
    }

    #[test]
    fn test_empty_header_and_blob() {
        let codec = PacketCodec::new();
        let frame = codec.encode(&Header::new(), &[]).unwrap();
        assert_eq!(frame, [0x77, 0x73, 0x62, 0x74, 0x00, 0x00]);

        let packet = codec.decode(&mut frame.as_slice()).unwrap();
        assert!(packet.header.is_empty());
        assert!(packet.blob.is_empty());
    }

    #[test]
    fn test_missing_blob_size_is_soft() {
        let (codec, log) = codec_with_log();
        let header: Header = [("kind", json!("ping"))].into_iter().collect();
        let mut frame = codec.encode(&header, &[]).unwrap();
        frame.extend_from_slice(b"trailing");

        let mut cursor = frame.as_slice();
        let packet = codec.decode(&mut cursor).unwrap();
        assert_eq!(packet.header.get_text("kind"), Ok("ping"));
        assert!(packet.blob.is_empty());
        assert_eq!(cursor, b"trailing");
        assert_eq!(log.borrow().as_slice(), ["blob.size is not found"]);
    }

    #[test]
    fn test_decode_across_partial_reads() {
        let codec = PacketCodec::new();
        let mut header = Header::new();
        header.insert("name", "chunked");
        let blob: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        header.set_blob_size(blob.len());
        let frame = codec.encode(&header, &blob).unwrap();

        let mut src = Trickle {
            data: &frame,
            chunk: 5,
        };
        let packet = codec.decode(&mut src).unwrap();
        assert_eq!(packet.blob, blob);
    }

    #[test]
    fn test_negative_header_length() {
        let codec = PacketCodec::new();
        let frame = [0x77, 0x73, 0x62, 0x74, 0xff, 0xfe];
        match codec.decode(&mut frame.as_slice()) {
            Err(ProtocolError::InvalidSignature {
                fault: FramingFault::HeaderLength(-2),
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_write_stamps_blob_size_and_survives_short_writes() {
        let codec = PacketCodec::new();
        let mut header: Header = [(BLOB_SIZE_KEY, json!(99))].into_iter().collect();
        let mut sink = Choppy {
            out: Vec::new(),
            chunk: 3,
            limit: usize::MAX,
        };
        codec.write(&mut sink, &mut header, b"abc").unwrap();
        assert_eq!(header.get_int(BLOB_SIZE_KEY), Ok(3));

        let packet = codec.decode(&mut sink.out.as_slice()).unwrap();
        assert_eq!(packet.blob, b"abc");
    }

    #[test]
    fn test_write_error_is_fatal() {
        let codec = PacketCodec::new();
        let mut sink = Choppy {
            out: Vec::new(),
            chunk: 64,
            limit: 10,
        };
        let err = codec
            .write(&mut sink, &mut Header::new(), b"0123456789abcdef")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    struct Deadlined {
        out: Vec<u8>,
        deadline: Option<Duration>,
    }

    impl Write for Deadlined {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteDeadline for Deadlined {
        fn set_write_deadline(&mut self, timeout: Duration) -> io::Result<()> {
            self.deadline = Some(timeout);
            Ok(())
        }
    }

    #[test]
    fn test_write_deadline_follows_config() {
        let mut stream = Deadlined {
            out: Vec::new(),
            deadline: None,
        };

        let disabled = PacketCodec::from_config(&TransportConfig::default(), TracingSink);
        disabled
            .write_with_deadline(&mut stream, &mut Header::new(), b"x")
            .unwrap();
        assert_eq!(stream.deadline, None);

        let config = TransportConfig {
            write_deadline: true,
            ..TransportConfig::default()
        };
        let enabled = PacketCodec::from_config(&config, TracingSink);
        enabled
            .write_with_deadline(&mut stream, &mut Header::new(), b"y")
            .unwrap();
        assert_eq!(stream.deadline, Some(DEFAULT_WRITE_TIMEOUT));
    }
}
