//! # Stream Primitives
//!
//! Blocking helpers over `std::io` byte streams.
//!
//! ## Components
//! - **read_full / write_all**: retry partial transfers until done or a real error
//! - **WriteDeadline**: optional capability to bound a blocking write
//! - **RollbackReader**: reader that can replay a bounded window of delivered bytes
//! - **ProgressWriter**: writer reporting whole-percent progress against a known total

pub mod progress;
pub mod rollback;

pub use progress::ProgressWriter;
pub use rollback::{RollbackReader, DEFAULT_ROLLBACK_WINDOW};

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, trace};

/// Streams that can bound how long a blocking write may take
pub trait WriteDeadline {
    fn set_write_deadline(&mut self, timeout: Duration) -> io::Result<()>;
}

impl WriteDeadline for TcpStream {
    fn set_write_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_write_timeout(Some(timeout))
    }
}

impl<T: WriteDeadline + ?Sized> WriteDeadline for &mut T {
    fn set_write_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_write_deadline(timeout)
    }
}

/// Read until `buf` is full or the source reports end of data.
///
/// Returns the number of bytes placed in `buf`; less than `buf.len()` only at EOF.
pub fn read_full<R: Read + ?Sized>(from: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match from.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, filled, wanted = buf.len(), "read error");
                return Err(e);
            }
        }
    }
    Ok(filled)
}

/// Write every byte of `buf`, retrying partial writes.
///
/// A zero-length write is reported as `WriteZero`; any other error aborts.
pub fn write_all<W: Write + ?Sized>(to: &mut W, mut buf: &[u8]) -> io::Result<()> {
    trace!(len = buf.len(), "writing bytes");
    while !buf.is_empty() {
        match to.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                trace!(wrote = n, left = buf.len() - n, "partial write");
                buf = &buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, left = buf.len(), "write error");
                return Err(e);
            }
        }
    }
    to.flush()
}
