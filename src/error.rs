//! # Error Types
//!
//! Error handling for packet framing and rollback reading.
//!
//! ## Error Categories
//! - **I/O Errors**: failures reported by the underlying byte stream
//! - **Framing Errors**: bad signature, bad header length, truncated blob
//! - **Header Errors**: oversized or unparseable headers
//! - **Rollback Errors**: negative or too-deep rollback requests
//!
//! Any framing error leaves the stream at an unknown position. Callers must
//! drop the stream instead of trying to resynchronize.
//!
//! ## Example Usage
//! ```rust
//! use wsbt::core::packet::PacketCodec;
//! use wsbt::error::ProtocolError;
//!
//! let codec = PacketCodec::default();
//! let mut garbage: &[u8] = b"nope, not a frame";
//! match codec.decode(&mut garbage) {
//!     Err(ProtocolError::InvalidSignature { .. }) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

/// Why a frame was rejected as [`ProtocolError::InvalidSignature`].
///
/// Kept for diagnostics only; all of these surface as the same error kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingFault {
    /// The leading four bytes were not the protocol magic
    Magic(u32),
    /// The header-length prefix was negative or above the ceiling
    HeaderLength(i16),
    /// The declared blob length does not fit in memory on this target
    BlobSize(i64),
    /// The blob could not be read in full
    Blob { expected: usize, cause: String },
}

impl fmt::Display for FramingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingFault::Magic(found) => write!(f, "unexpected magic {found:#010x}"),
            FramingFault::HeaderLength(len) => write!(f, "header length {len} out of range"),
            FramingFault::BlobSize(size) => write!(f, "blob size {size} out of range"),
            FramingFault::Blob { expected, cause } => {
                write!(f, "failed to read {expected} blob bytes: {cause}")
            }
        }
    }
}

// ProtocolError is the primary error type for all framing operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid signature ({fault})")]
    InvalidSignature { fault: FramingFault },

    #[error("Header too large: {0} bytes")]
    HeaderTooLarge(usize),

    #[error("Failed to serialize header: {0}")]
    HeaderSerialize(#[source] serde_json::Error),

    #[error("Failed to parse header: {0}")]
    HeaderParse(#[source] serde_json::Error),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Negative rollback value: {0}")]
    NegativeRollback(isize),

    #[error("Rollback is too big: requested {requested}, {available} available")]
    InsufficientHistory { requested: usize, available: usize },

    #[error("Impossible state: {0}")]
    ImpossibleState(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    pub(crate) fn framing(fault: FramingFault) -> Self {
        ProtocolError::InvalidSignature { fault }
    }

    /// Whether the stream position can no longer be trusted after this error
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::InvalidSignature { .. }
                | ProtocolError::HeaderParse(_)
                | ProtocolError::ShortRead { .. }
        )
    }
}

impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(inner) => inner,
            ProtocolError::ShortRead { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            ProtocolError::InvalidSignature { .. }
            | ProtocolError::HeaderParse(_)
            | ProtocolError::HeaderTooLarge(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            ProtocolError::NegativeRollback(_) | ProtocolError::InsufficientHistory { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::other(other),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
