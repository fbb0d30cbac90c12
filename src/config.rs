//! Tunable limits for a single request/response exchange.

use std::time::Duration;

/// The well-known Gopher port
pub const DEFAULT_PORT: u16 = 70;

/// Longest line we expect a server to send
pub const MAX_LINE: usize = 2048;

/// Most entries kept from one directory listing
pub const MAX_ENTRIES: usize = 256;

/// Selector strings are no longer than 255 bytes (RFC 1436, Appendix)
pub const FIELD_LEN: usize = 255;

/// Bytes requested from the connection per read
pub const CHUNK_SIZE: usize = 1024;

/// Port numbers never need more than five decimal digits
pub const PORT_DIGITS: usize = 5;

/// Treat a zero timeout as no timeout at all
pub(crate) fn non_zero(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// Limits applied while draining and decoding a response.
///
/// The defaults mirror the classic protocol conventions. The response
/// ceiling is derived rather than stored, see [`Limits::max_response`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_line: usize,
    pub max_entries: usize,
    pub field_len: usize,
    pub chunk_size: usize,
    pub initial_capacity: usize,
    pub default_port: u16,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Bound on the whole response, however steadily the server trickles
    pub response_timeout: Option<Duration>,
    pub keep_raw: bool,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_line: MAX_LINE,
            max_entries: MAX_ENTRIES,
            field_len: FIELD_LEN,
            chunk_size: CHUNK_SIZE,
            initial_capacity: CHUNK_SIZE,
            default_port: DEFAULT_PORT,
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
            response_timeout: Some(Duration::from_secs(30)),
            keep_raw: false,
        }
    }
}

impl Limits {
    /// Largest response, in bytes, the drainer will accept
    pub fn max_response(&self) -> usize {
        self.max_line.saturating_mul(self.max_entries)
    }

    pub fn with_max_line(mut self, max_line: usize) -> Limits {
        self.max_line = max_line;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Limits {
        self.max_entries = max_entries;
        self
    }

    pub fn with_field_len(mut self, field_len: usize) -> Limits {
        self.field_len = field_len;
        self
    }

    /// A zero chunk size would never make progress, so it is raised to one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Limits {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Limits {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Limits {
        self.default_port = port;
        self
    }

    /// Sets both the read and the write deadline. A zero duration means no
    /// deadline, since sockets reject it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Limits {
        self.read_timeout = non_zero(timeout);
        self.write_timeout = non_zero(timeout);
        self
    }

    /// Sets the deadline for receiving the complete response; zero means none
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Limits {
        self.response_timeout = non_zero(timeout);
        self
    }

    pub fn with_keep_raw(mut self, keep_raw: bool) -> Limits {
        self.keep_raw = keep_raw;
        self
    }
}
