//! # Core Protocol Components
//!
//! Packet headers, blocking frame encoding/decoding, and `tokio_util` framing.
//!
//! ## Components
//! - **Header**: JSON key/value map with strict and lenient lookups
//! - **Packet**: frame constants and the blocking [`PacketCodec`](packet::PacketCodec)
//! - **Codec**: [`StreamCodec`](codec::StreamCodec) for `Framed` async transports
//!
//! ## Wire Format
//! ```text
//! [Signature(4)] [HeaderLen(2)] [Header(HeaderLen)] [Blob(blob.size)]
//! ```
//!
//! ## Security
//! - Maximum header size: 16KB, checked before allocation
//! - Magic bytes reject foreign or misaligned streams

pub mod codec;
pub mod header;
pub mod packet;
