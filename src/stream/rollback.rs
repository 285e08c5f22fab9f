//! # Rollback Reader
//!
//! Wraps a byte source and remembers the tail of what it last delivered, so a
//! parser can peek at upcoming bytes and then push them back for the real parse.
//!
//! ```rust
//! use std::io::Read;
//! use wsbt::stream::RollbackReader;
//!
//! let mut reader = RollbackReader::new(&b"[5|meta]hello"[..]);
//! let mut peek = [0u8; 10];
//! reader.read_into(&mut peek).unwrap();
//! let close = peek.iter().position(|b| *b == b']').unwrap();
//! reader.rollback((peek.len() - close - 1) as isize).unwrap();
//!
//! let mut body = [0u8; 5];
//! reader.read_exact(&mut body).unwrap();
//! assert_eq!(&body, b"hello");
//! ```
//!
//! The window is bounded, so rolling back further than the retained tail fails
//! with [`ProtocolError::InsufficientHistory`]. A reader owns its source
//! exclusively and is neither `Clone` nor internally synchronized; pass
//! `&mut stream` to keep ownership of the stream with the caller.

use std::io::{self, Read};
use tracing::error;

use super::read_full;
use crate::config::TransportConfig;
use crate::error::{ProtocolError, Result};

/// Most recently delivered bytes kept for replay
pub const DEFAULT_ROLLBACK_WINDOW: usize = 1024;

#[derive(Debug)]
pub struct RollbackReader<R> {
    source: R,
    retained: Vec<u8>,
    pending: usize,
    window: usize,
}

impl<R: Read> RollbackReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_window(source, DEFAULT_ROLLBACK_WINDOW)
    }

    /// Build a reader whose window is `config.rollback_window`
    pub fn from_config(source: R, config: &TransportConfig) -> Self {
        Self::with_window(source, config.rollback_window)
    }

    pub fn with_window(source: R, window: usize) -> Self {
        Self {
            source,
            retained: Vec::with_capacity(window),
            pending: 0,
            window,
        }
    }

    /// Fill `buf`, replaying rolled-back bytes first.
    ///
    /// Reads from the source block until `buf` is full or the source is
    /// exhausted. If the source fails, rolled-back bytes stay pending.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending > self.retained.len() {
            error!(
                pending = self.pending,
                retained = self.retained.len(),
                "rollback exceeds retained bytes"
            );
            return Err(ProtocolError::ImpossibleState(
                "pending rollback exceeds retained bytes",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending == 0 {
            let read = read_full(&mut self.source, buf)?;
            self.retain(&buf[..read]);
            return Ok(read);
        }

        let start = self.retained.len() - self.pending;
        if buf.len() <= self.pending {
            let n = buf.len();
            buf.copy_from_slice(&self.retained[start..start + n]);
            self.pending -= n;
            return Ok(n);
        }

        let replayed = self.pending;
        buf[..replayed].copy_from_slice(&self.retained[start..]);
        let fresh = read_full(&mut self.source, &mut buf[replayed..])?;
        self.pending = 0;
        self.retain(&buf[..replayed + fresh]);
        Ok(replayed + fresh)
    }

    /// Arrange for the last `count` delivered bytes to be delivered again
    pub fn rollback(&mut self, count: isize) -> Result<()> {
        let back = usize::try_from(count).map_err(|_| ProtocolError::NegativeRollback(count))?;
        let available = self.available();
        if back > available {
            return Err(ProtocolError::InsufficientHistory {
                requested: back,
                available,
            });
        }
        self.pending += back;
        Ok(())
    }

    /// How many more bytes can currently be rolled back
    pub fn available(&self) -> usize {
        self.retained.len().saturating_sub(self.pending)
    }

    /// Bytes waiting to be replayed
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Unwrap the source. Pending rolled-back bytes are lost.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn retain(&mut self, delivered: &[u8]) {
        if delivered.is_empty() {
            return;
        }
        let keep = delivered.len().min(self.window);
        self.retained.clear();
        self.retained
            .extend_from_slice(&delivered[delivered.len() - keep..]);
    }
}

impl<R: Read> Read for RollbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(Into::into)
    }
}
