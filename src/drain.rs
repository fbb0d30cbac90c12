//! Reading a response until the server closes the connection.
//!
//! Directory listings carry no length prefix, so the only reliable end of
//! data is the peer closing the stream. Everything received is collected in
//! a [`ResponseBuffer`] which grows by doubling and refuses to grow past the
//! ceiling given by [`Limits::max_response`].

use std::io;
use std::ops::Deref;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::config::Limits;
use crate::net::{self, Connection};
use crate::{GopherError, Result};

/// All bytes received for one response.
///
/// The logical content is exactly the bytes appended so far; spare capacity
/// is never exposed.
#[derive(Debug)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    ceiling: usize,
}

impl ResponseBuffer {
    /// Create an empty buffer that may hold at most `ceiling` bytes
    pub fn new(initial_capacity: usize, ceiling: usize) -> ResponseBuffer {
        ResponseBuffer {
            bytes: Vec::with_capacity(initial_capacity.min(ceiling)),
            ceiling,
        }
    }

    /// Append a chunk, doubling the capacity as often as needed first. The
    /// capacity never grows past the ceiling.
    ///
    /// Fails without modifying the buffer when the new length would exceed
    /// the ceiling.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let len = self.bytes.len();
        let total = match len.checked_add(chunk.len()) {
            Some(total) if total <= self.ceiling => total,
            _ => return Err(GopherError::ResponseTooLarge { limit: self.ceiling }),
        };

        if self.bytes.capacity() < total {
            let mut capacity = self.bytes.capacity().max(1);
            while capacity < total {
                capacity = capacity.saturating_mul(2);
            }
            let capacity = capacity.min(self.ceiling);
            trace!("growing response buffer {} -> {}", self.bytes.capacity(), capacity);
            self.bytes.reserve_exact(capacity - len);
        }

        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl Deref for ResponseBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Map an I/O failure during an exchange onto the matching error
pub(crate) fn classify(e: io::Error) -> GopherError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => GopherError::Timeout,
        _ if net::is_cancelled(&e) => GopherError::Cancelled,
        _ => GopherError::Io(e),
    }
}

/// Read timeout for the next read: the connection's own deadline, cut
/// down to whatever is left of the whole-response deadline
fn next_read_timeout(limits: &Limits, deadline: Instant) -> Result<Option<Duration>> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(GopherError::Timeout);
    }
    Ok(Some(match limits.read_timeout {
        Some(per_read) => per_read.min(remaining),
        None => remaining,
    }))
}

/// Read from `conn` until it reports end of stream.
///
/// Interrupted reads are retried. An elapsed read deadline (`WouldBlock` or
/// `TimedOut`) or an elapsed [`Limits::response_timeout`] becomes
/// [`GopherError::Timeout`], a read on a cancelled connection becomes
/// [`GopherError::Cancelled`], and a response larger than the ceiling aborts
/// with [`GopherError::ResponseTooLarge`]. No partial buffer is returned on
/// failure.
pub fn drain<C: Connection + ?Sized>(conn: &mut C, limits: &Limits) -> Result<ResponseBuffer> {
    let deadline = limits.response_timeout.map(|timeout| Instant::now() + timeout);
    let mut buffer = ResponseBuffer::new(limits.initial_capacity, limits.max_response());
    let mut chunk = vec![0u8; limits.chunk_size.max(1)];

    loop {
        if let Some(deadline) = deadline {
            let timeout = next_read_timeout(limits, deadline).map_err(|e| {
                warn!("no complete response after {:?}, aborting", limits.response_timeout);
                e
            })?;
            conn.set_read_timeout(timeout).map_err(classify)?;
        }

        let read = match conn.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify(e)),
        };

        trace!("read {} bytes", read);
        if let Err(e) = buffer.append(&chunk[..read]) {
            warn!(
                "server sent more than {} bytes, aborting",
                buffer.ceiling()
            );
            return Err(e);
        }
    }

    debug!("drained {} bytes", buffer.len());
    Ok(buffer)
}
