//! Splitting a drained response into CRLF-terminated lines.

use log::trace;
use memchr::memmem;

/// Lines starting with this byte end a directory listing
pub const END_MARKER: u8 = b'.';

const CRLF: &[u8] = b"\r\n";

/// One line of a response, without its CRLF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawLine<'a> {
    offset: usize,
    bytes: &'a [u8],
}

impl<'a> RawLine<'a> {
    /// Position of the first byte within the response
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Single pass over the complete lines of a response.
///
/// Iteration stops at the first line beginning with [`END_MARKER`], or at the
/// end of the last CRLF-terminated line. Bytes after the final CRLF belong to
/// a line that was cut off and are never yielded.
#[derive(Debug)]
pub struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
    finder: memmem::Finder<'static>,
    terminated: bool,
    done: bool,
}

impl<'a> Lines<'a> {
    pub fn new(buf: &'a [u8]) -> Lines<'a> {
        Lines {
            buf,
            pos: 0,
            finder: memmem::Finder::new(CRLF),
            terminated: false,
            done: false,
        }
    }

    /// Whether iteration ended on an end marker line
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = RawLine<'a>;

    fn next(&mut self) -> Option<RawLine<'a>> {
        if self.done {
            return None;
        }

        let rest = &self.buf[self.pos..];
        let end = match self.finder.find(rest) {
            Some(end) => end,
            None => {
                if !rest.is_empty() {
                    trace!("dropping {} byte partial line", rest.len());
                }
                self.done = true;
                return None;
            }
        };

        if rest.first() == Some(&END_MARKER) {
            self.terminated = true;
            self.done = true;
            return None;
        }

        let line = RawLine {
            offset: self.pos,
            bytes: &rest[..end],
        };
        self.pos += end + CRLF.len();
        Some(line)
    }
}
