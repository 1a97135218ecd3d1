//! Transport sessions
//!
//! A [`TransportSession`] wraps one live connection behind the [`Wire`] trait,
//! which is the seam between plain TCP and TLS. The session adds block-bounded
//! reads, single-byte reads, a one-block rewind window, and flushed writes,
//! all bounded by a per-operation timeout.

use super::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::Read;
use std::os::fd::RawFd;
use std::time::Duration;

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Byte-stream operations over an established connection
///
/// Implemented for plain TCP and TLS. `poll` reports readiness for the
/// requested operation within the timeout; `read` and `write` are only called
/// after a successful poll and may therefore block briefly at most.
pub trait Wire: Send {
    /// Wait until the wire is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read available bytes into `buf`, returning the count (0 = closed)
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes from `buf`, returning the count written
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered writes to the peer
    fn flush(&mut self) -> Result<()>;

    /// Shut the connection down
    fn close(&mut self) -> Result<()>;
}

/// Poll a file descriptor for readiness
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, poll_timeout_ms(timeout)) };

    if result < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }

    Ok(result > 0)
}

/// Poll timeout in milliseconds: -1 means wait forever; oversized durations
/// clamp rather than wrap into a negative value
fn poll_timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    }
}

/// One live connection with block-bounded, rewindable reads
pub struct TransportSession {
    wire: Box<dyn Wire>,
    timeout: Duration,
    block_size: usize,
    /// Most recent block handed out, bounds what `rewind` can re-expose
    last_read: Bytes,
    /// Pending rewind window; reads consume it before touching the wire
    replay: Bytes,
    closed: bool,
}

impl TransportSession {
    /// Create a session over an established wire
    pub fn new(wire: Box<dyn Wire>, timeout: Duration, block_size: usize) -> Self {
        TransportSession {
            wire,
            timeout,
            block_size,
            last_read: Bytes::new(),
            replay: Bytes::new(),
            closed: false,
        }
    }

    /// Set the per-operation timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Get the per-operation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the block size
    ///
    /// Invalidates any pending rewind window.
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
        self.last_read = Bytes::new();
        self.replay = Bytes::new();
    }

    /// Get the block size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Write all of `buf` and flush
    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            if !self.wire.poll(PollEvents::Write, Some(self.timeout))? {
                return Err(TransportError::Timeout(self.timeout));
            }
            let n = self.wire.write(&buf[written..])?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            written += n;
        }
        self.wire.flush()
    }

    /// Stream `length` bytes from a reader to the wire, then flush
    pub fn send_from(&mut self, source: &mut dyn Read, length: u64) -> Result<()> {
        let mut scratch = vec![0u8; self.block_size.max(1)];
        let mut remaining = length;
        while remaining > 0 {
            let want = (scratch.len() as u64).min(remaining) as usize;
            let n = source.read(&mut scratch[..want])?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            let mut written = 0;
            while written < n {
                if !self.wire.poll(PollEvents::Write, Some(self.timeout))? {
                    return Err(TransportError::Timeout(self.timeout));
                }
                let w = self.wire.write(&scratch[written..n])?;
                if w == 0 {
                    return Err(TransportError::Closed);
                }
                written += w;
            }
            remaining -= n as u64;
        }
        self.wire.flush()
    }

    /// Read up to one block
    ///
    /// Returns fewer than `block_size` bytes when the stream has fewer
    /// available; that is end-of-available-data, not an error. A peer that has
    /// closed the connection yields [`TransportError::Closed`].
    pub fn receive(&mut self) -> Result<Bytes> {
        if !self.replay.is_empty() {
            let chunk = std::mem::take(&mut self.replay);
            self.last_read = chunk.clone();
            return Ok(chunk);
        }

        if !self.wire.poll(PollEvents::Read, Some(self.timeout))? {
            return Err(TransportError::Timeout(self.timeout));
        }

        let mut buf = BytesMut::zeroed(self.block_size.max(1));
        let n = self.wire.read(&mut buf)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        buf.truncate(n);
        let chunk = buf.freeze();
        self.last_read = chunk.clone();
        Ok(chunk)
    }

    /// Read exactly one byte
    pub fn read_byte(&mut self) -> Result<u8> {
        if !self.replay.is_empty() {
            let byte = self.replay[0];
            self.last_read = self.replay.slice(0..1);
            self.replay = self.replay.slice(1..);
            return Ok(byte);
        }

        if !self.wire.poll(PollEvents::Read, Some(self.timeout))? {
            return Err(TransportError::Timeout(self.timeout));
        }

        let mut buf = [0u8; 1];
        let n = self.wire.read(&mut buf)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        self.last_read = Bytes::copy_from_slice(&buf);
        Ok(buf[0])
    }

    /// Re-expose the last `n` bytes of the most recent read
    ///
    /// At most one rewind window is retained; a new rewind replaces it and any
    /// read consumes it. `n` may not exceed the block size or the length of
    /// the last read.
    pub fn rewind(&mut self, n: usize) -> Result<()> {
        if n > self.block_size {
            return Err(TransportError::RewindTooLarge {
                requested: n,
                limit: self.block_size,
            });
        }
        if n > self.last_read.len() {
            return Err(TransportError::RewindTooLarge {
                requested: n,
                limit: self.last_read.len(),
            });
        }
        self.replay = self.last_read.slice(self.last_read.len() - n..);
        Ok(())
    }

    /// Close the session
    ///
    /// Idempotent; close errors are traced and swallowed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.wire.close() {
            tracing::trace!(error = %e, "error closing transport session");
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("timeout", &self.timeout)
            .field("block_size", &self.block_size)
            .field("replay", &self.replay.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared view of a mock wire, for inspecting writes after the session
    /// has consumed the wire itself.
    #[derive(Default)]
    pub struct WireLog {
        pub written: Vec<u8>,
        pub flushes: usize,
        pub closes: usize,
    }

    /// Scripted in-memory wire for unit tests
    pub struct MockWire {
        input: Vec<u8>,
        position: usize,
        pub log: Arc<Mutex<WireLog>>,
    }

    impl MockWire {
        pub fn new(input: &[u8]) -> (Self, Arc<Mutex<WireLog>>) {
            let log = Arc::new(Mutex::new(WireLog::default()));
            (
                MockWire {
                    input: input.to_vec(),
                    position: 0,
                    log: Arc::clone(&log),
                },
                log,
            )
        }
    }

    impl Wire for MockWire {
        fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> Result<bool> {
            Ok(true)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let remaining = &self.input[self.position..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.position += n;
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let mut log = self.log.lock().unwrap();
            log.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<()> {
            self.log.lock().unwrap().flushes += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }
}
