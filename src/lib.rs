//! # wsbt
//!
//! Self-describing binary packet framing over byte streams, plus a reader
//! that can roll back a bounded window of delivered bytes.
//!
//! ## Modules
//! - [`core`]: headers, the blocking [`PacketCodec`], and the `tokio_util` [`StreamCodec`]
//! - [`stream`]: full-transfer helpers, [`RollbackReader`], write deadlines, progress reporting
//! - [`config`]: TOML/env configuration
//! - [`error`]: [`ProtocolError`]
//! - [`utils`]: diagnostic sinks and logging setup
//!
//! ## Example
//! ```rust
//! use wsbt::{Header, PacketCodec};
//!
//! let codec = PacketCodec::new();
//! let mut header = Header::new();
//! header.insert("name", "greeting.txt");
//!
//! let mut wire = Vec::new();
//! codec.write(&mut wire, &mut header, b"hello").unwrap();
//!
//! let packet = codec.decode(&mut wire.as_slice()).unwrap();
//! assert_eq!(packet.header.get_text("name"), Ok("greeting.txt"));
//! assert_eq!(packet.blob, b"hello");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod stream;
pub mod utils;

pub use crate::core::codec::StreamCodec;
pub use crate::core::header::{Header, LookupError, BLOB_SIZE_KEY};
pub use crate::core::packet::{Packet, PacketCodec};
pub use crate::error::{ProtocolError, Result};
pub use crate::stream::RollbackReader;
