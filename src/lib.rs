//! A small library for fetching Gopher directory listings, as described
//! in [RFC 1436](https://tools.ietf.org/html/rfc1436)
//!
//! A request is a selector followed by CRLF. The server answers with
//! CRLF-terminated lines, one per directory item, optionally followed by a
//! line holding a single `.`, and then closes the connection. Fetching runs
//! in three steps:
//!
//! 1. [`drain()`] reads until the server closes the stream, refusing to grow
//!    past [`Limits::max_response`].
//! 2. [`Lines`] splits the response on CRLF and stops at the end marker.
//! 3. [`DirectoryItem::parse`] decodes each line, skipping lines whose type
//!    byte it does not recognise.
//!
//! # Usage
//!
//! ```
//! use gopher::*;
//!
//! let input = b"0About internet Gopher\tStuff:About us\trawBits.micro.umn.edu\t70\r
//! 1Around University of Minnesota\tZ,5692,AUM\tunderdog.micro.umn.edu\t70\r
//! 1Microcomputer News & Prices\tPrices/\tpserver.bookstore.umn.edu\t70\r
//! 1Courses, Schedules, Calendars\t\tevents.ais.umn.edu\t9120\r
//! 1Student-Staff Directories\t\tuinfo.ais.umn.edu\t70\r
//! 1Departmental Publications\tStuff:DP:\trawBits.micro.umn.edu\t70\r
//! .\r
//! ";
//!
//! let directory = Directory::parse(input, &Limits::default());
//! let items = directory.items();
//!
//! assert_eq!(items.len(), 6);
//! assert_eq!(items[0].item_type, Type::File);
//! assert_eq!(items[3].port, 9120);
//! assert!(directory.is_terminated());
//! ```
//!
//! Over the network, [`net::read_directory`] opens a connection, sends the
//! selector and decodes the reply:
//!
//! ```no_run
//! let directory = gopher::net::read_directory("gopher.floodgap.com", 70, "")?;
//! for item in &directory {
//!     println!("{}", item.display);
//! }
//! # Ok::<(), gopher::GopherError>(())
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

use log::{debug, trace};
use regex::bytes::Regex;

pub mod config;
pub mod drain;
pub mod lines;
pub mod net;

pub use config::{Limits, DEFAULT_PORT};
pub use drain::{drain, ResponseBuffer};
pub use lines::{Lines, RawLine};

pub type Result<T> = std::result::Result<T, GopherError>;

/// Failures that abort a whole exchange.
///
/// Malformed lines and bad port numbers are not errors; they are skipped or
/// defaulted while decoding.
#[derive(Debug, thiserror::Error)]
pub enum GopherError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Possible types of Gopher directory items
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Type {
    File,
    Directory,
    CSOPhoneBook,
    Error,
    BinHexed,
    BinArchive,
    UUEncoded,
    SearchServer,
    TelnetSession,
    Binary,
    RedundantServer,
    Tn3270Session,
    GIF,
    Image,
    /// A type byte outside the table; lines carrying one are never decoded
    Unknown(u8),
}

impl Type {
    pub fn is_directory(&self) -> bool {
        *self == Type::Directory
    }

    pub fn is_known(&self) -> bool {
        !matches!(*self, Type::Unknown(_))
    }

    /// Items the client must read until the server closes the connection,
    /// rather than until an end marker
    pub fn reads_until_close(&self) -> bool {
        matches!(*self, Type::BinArchive | Type::Binary)
    }

    /// Convert the leading byte of a line into a Gopher Type
    pub fn from_byte(b: u8) -> Type {
        match b {
            b'0' => Type::File,
            b'1' => Type::Directory,
            b'2' => Type::CSOPhoneBook,
            b'3' => Type::Error,
            b'4' => Type::BinHexed,
            b'5' => Type::BinArchive,
            b'6' => Type::UUEncoded,
            b'7' => Type::SearchServer,
            b'8' => Type::TelnetSession,
            b'9' => Type::Binary,
            b'+' => Type::RedundantServer,
            b'T' => Type::Tn3270Session,
            b'g' => Type::GIF,
            b'I' => Type::Image,
            other => Type::Unknown(other),
        }
    }

    /// Convert back into the wire byte
    pub fn as_byte(&self) -> u8 {
        match *self {
            Type::File => b'0',
            Type::Directory => b'1',
            Type::CSOPhoneBook => b'2',
            Type::Error => b'3',
            Type::BinHexed => b'4',
            Type::BinArchive => b'5',
            Type::UUEncoded => b'6',
            Type::SearchServer => b'7',
            Type::TelnetSession => b'8',
            Type::Binary => b'9',
            Type::RedundantServer => b'+',
            Type::Tn3270Session => b'T',
            Type::GIF => b'g',
            Type::Image => b'I',
            Type::Unknown(other) => other,
        }
    }
}

/// Fields after the type byte: display, selector, host and port, each
/// optional after the first. Anything past the port (Gopher+ markers) is
/// ignored.
fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?-u)\A(?P<display>[^\t]*)(?:\t(?P<selector>[^\t]*))?(?:\t(?P<host>[^\t]*))?(?:\t(?P<port>[^\t]*))?",
        )
        .expect("directory item pattern must compile")
    })
}

/// Copy a field out of the line, cut at `limit` bytes. A character that
/// straddles the limit is dropped whole.
fn text_field(bytes: Option<&[u8]>, limit: usize) -> String {
    let bytes = bytes.unwrap_or_default();
    let cut = &bytes[..bytes.len().min(limit)];
    match std::str::from_utf8(cut) {
        Ok(text) => text.to_owned(),
        Err(e) if e.error_len().is_none() && cut.len() < bytes.len() => {
            String::from_utf8_lossy(&cut[..e.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(cut).into_owned(),
    }
}

/// Anything but one to five decimal digits means "use the default"
fn port_field(bytes: Option<&[u8]>, default: u16) -> u16 {
    let digits = bytes.unwrap_or_default().trim_ascii();
    if digits.is_empty()
        || digits.len() > config::PORT_DIGITS
        || !digits.iter().all(u8::is_ascii_digit)
    {
        return default;
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(default)
}

/// An item in a Gopher Directory
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirectoryItem {
    pub item_type: Type,
    pub display: String,
    pub selector: String,
    pub host: String,
    pub port: u16,
    /// The undecoded line, kept only when [`Limits::keep_raw`] is set
    pub raw: Option<Vec<u8>>,
}

impl DirectoryItem {
    pub fn new(
        item_type: Type,
        display: impl Into<String>,
        selector: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> DirectoryItem {
        DirectoryItem {
            item_type,
            display: display.into(),
            selector: selector.into(),
            host: host.into(),
            port,
            raw: None,
        }
    }

    /// Decode one line (without its CRLF) into a DirectoryItem.
    ///
    /// Returns `None` for an empty line or one whose type byte is not in the
    /// table. Missing text fields are left empty, text fields longer than
    /// [`Limits::field_len`] are cut short, and a missing or unusable port
    /// becomes [`Limits::default_port`].
    pub fn parse(line: &[u8], limits: &Limits) -> Option<DirectoryItem> {
        let (&first, rest) = line.split_first()?;
        let item_type = Type::from_byte(first);
        if !item_type.is_known() {
            return None;
        }

        let captures = item_pattern().captures(rest)?;
        let field = |name: &str| captures.name(name).map(|m| m.as_bytes());

        Some(DirectoryItem {
            item_type,
            display: text_field(field("display"), limits.field_len),
            selector: text_field(field("selector"), limits.field_len),
            host: text_field(field("host"), limits.field_len),
            port: port_field(field("port"), limits.default_port),
            raw: limits.keep_raw.then(|| line.to_vec()),
        })
    }

    /// Write the wire form of this item, CRLF included
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{}\r\n", self)
    }
}

impl fmt::Display for DirectoryItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{sym}{display}\t{selector}\t{host}\t{port}",
                sym = char::from(self.item_type.as_byte()),
                display = self.display,
                selector = self.selector,
                host = self.host,
                port = self.port)
    }
}

/// A Gopher Directory
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Directory {
    items: Vec<DirectoryItem>,
    terminated: bool,
}

impl Directory {
    /// Decode a complete response.
    ///
    /// Lines are read in order until the end marker, the last complete line,
    /// or [`Limits::max_entries`] decoded items, whichever comes first.
    /// Lines with an unrecognised type are skipped.
    pub fn parse(buf: &[u8], limits: &Limits) -> Directory {
        let mut items = Vec::new();
        let mut lines = Lines::new(buf);

        while items.len() < limits.max_entries {
            let line = match lines.next() {
                Some(line) => line,
                None => break,
            };

            match DirectoryItem::parse(line.bytes(), limits) {
                Some(item) => items.push(item),
                None => trace!("skipping unrecognised line at offset {}", line.offset()),
            }
        }

        if items.len() >= limits.max_entries {
            debug!("stopped after {} entries", items.len());
        }
        debug!(
            "decoded {} entries{}",
            items.len(),
            if lines.is_terminated() { ", end marker seen" } else { "" }
        );

        Directory {
            items,
            terminated: lines.is_terminated(),
        }
    }

    /// Returns the list of DirectoryItems
    pub fn items(&self) -> &[DirectoryItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DirectoryItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the listing ended with an end marker line
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirectoryItem> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a Directory {
    type Item = &'a DirectoryItem;
    type IntoIter = std::slice::Iter<'a, DirectoryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for Directory {
    type Item = DirectoryItem;
    type IntoIter = std::vec::IntoIter<DirectoryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for item in &self.items {
            write!(f, "{}\r\n", item)?;
        }
        write!(f, ".\r\n")
    }
}
