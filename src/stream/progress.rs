//! Writer that reports progress against a known total.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Calls `monitor(bytes_written, percent, elapsed)` whenever the whole
/// percentage of `total` written goes up. A total of zero disables reporting.
pub struct ProgressWriter<W, F> {
    inner: W,
    total: u64,
    written: u64,
    last_percent: Option<u64>,
    started_at: Instant,
    monitor: F,
}

impl<W, F> ProgressWriter<W, F>
where
    W: Write,
    F: FnMut(u64, u64, Duration),
{
    pub fn new(inner: W, total: u64, monitor: F) -> Self {
        Self {
            inner,
            total,
            written: 0,
            last_percent: None,
            started_at: Instant::now(),
            monitor,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W, F> Write for ProgressWriter<W, F>
where
    W: Write,
    F: FnMut(u64, u64, Duration),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;

        if self.total != 0 {
            let percent = self.written.saturating_mul(100) / self.total;
            if self.last_percent.map_or(true, |last| percent > last) {
                self.last_percent = Some(percent);
                (self.monitor)(self.written, percent, self.started_at.elapsed());
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
