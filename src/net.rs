//! Network Utilities
//!
//! This module defines the connection seam used by [`fetch`], a TCP
//! implementation of it with read/write deadlines and cancellation, and a
//! couple of helpers that open a connection, run one exchange and close it.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::config::{self, Limits};
use crate::drain::{self, ResponseBuffer};
use crate::{Directory, GopherError, Result};

/// A reliable, ordered byte stream to a Gopher server.
///
/// Reads return `Ok(0)` once the server has closed its side.
pub trait Connection: Read + Write {
    /// Close the connection; the default leaves it to `Drop`
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Bound how long the next read may block. Called before every read
    /// while a whole-response deadline is running; the default ignores it.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("connection cancelled")]
struct CancelledRead;

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Other, CancelledRead)
}

/// Whether `e` was produced by a connection after [`CancelHandle::cancel`]
pub(crate) fn is_cancelled(e: &io::Error) -> bool {
    e.get_ref().map_or(false, |inner| inner.is::<CancelledRead>())
}

fn shutdown(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// A TCP connection with the deadlines from [`Limits`] applied.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    cancelled: Arc<AtomicBool>,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, limits: &Limits) -> io::Result<TcpConnection> {
        stream.set_read_timeout(config::non_zero(limits.read_timeout))?;
        stream.set_write_timeout(config::non_zero(limits.write_timeout))?;
        Ok(TcpConnection {
            stream,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A handle that can abort this connection from another thread
    pub fn cancel_handle(&self) -> io::Result<CancelHandle> {
        Ok(CancelHandle {
            stream: Arc::new(self.stream.try_clone()?),
            cancelled: Arc::clone(&self.cancelled),
        })
    }

    fn check_cancelled(&self) -> io::Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(cancelled())
        } else {
            Ok(())
        }
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let result = self.stream.read(buf);
        // shutting the socket down wakes a blocked read with Ok(0), which
        // must not look like a clean end of response
        self.check_cancelled()?;
        result
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Connection for TcpConnection {
    fn close(&mut self) -> io::Result<()> {
        shutdown(&self.stream)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(config::non_zero(timeout))
    }
}

/// Aborts an in-flight exchange on a [`TcpConnection`].
///
/// Cancelling shuts the socket down, which unblocks a pending read; the
/// exchange then fails with [`GopherError::Cancelled`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    stream: Arc<TcpStream>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Err(e) = shutdown(&self.stream) {
            debug!("shutdown after cancel failed: {}", e);
        }
    }
}

/// Resolve `host` and connect to the first address that accepts.
///
/// The read deadline from `limits`, if any, also bounds each connection
/// attempt.
pub fn open(host: &str, port: u16, limits: &Limits) -> Result<TcpConnection> {
    let addr = format!("{}:{}", host, port);
    let connect_error = |source| GopherError::Connect {
        addr: addr.clone(),
        source,
    };

    debug!("connecting to {}", addr);
    let mut last_error = None;
    for candidate in (host, port).to_socket_addrs().map_err(connect_error)? {
        let attempt = match config::non_zero(limits.read_timeout) {
            Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => {
                debug!("connected to {}", candidate);
                return TcpConnection::new(stream, limits).map_err(connect_error);
            }
            Err(e) => {
                debug!("connecting to {} failed: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    Err(connect_error(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host has no addresses")
    })))
}

/// Send `selector` followed by CRLF
fn send_selector<C: Connection + ?Sized>(conn: &mut C, selector: &str) -> Result<()> {
    let mut request = Vec::with_capacity(selector.len() + 2);
    request.extend_from_slice(selector.as_bytes());
    request.extend_from_slice(b"\r\n");

    conn.write_all(&request)
        .and_then(|()| conn.flush())
        .map_err(drain::classify)?;
    debug!("sent selector {:?}", selector);
    Ok(())
}

/// Request `selector` and return the undecoded response
pub fn fetch_raw<C: Connection + ?Sized>(
    conn: &mut C,
    selector: &str,
    limits: &Limits,
) -> Result<ResponseBuffer> {
    send_selector(conn, selector)?;
    drain::drain(conn, limits)
}

/// Request `selector` and decode the response as a directory listing.
///
/// The connection stays open; closing it is up to the caller.
pub fn fetch<C: Connection + ?Sized>(
    conn: &mut C,
    selector: &str,
    limits: &Limits,
) -> Result<Directory> {
    let response = fetch_raw(conn, selector, limits)?;
    Ok(Directory::parse(&response, limits))
}

fn finish<C: Connection + ?Sized>(conn: &mut C) {
    if let Err(e) = conn.close() {
        debug!("closing connection failed: {}", e);
    }
}

/// Connect to a Gopher server and read the specified directory
pub fn read_directory(host: &str, port: u16, selector: &str) -> Result<Directory> {
    read_directory_with(host, port, selector, &Limits::default())
}

pub fn read_directory_with(
    host: &str,
    port: u16,
    selector: &str,
    limits: &Limits,
) -> Result<Directory> {
    let mut conn = open(host, port, limits)?;
    let result = fetch(&mut conn, selector, limits);
    finish(&mut conn);
    result
}

/// Connect to a Gopher server and read the specified resource as raw bytes
pub fn read_resource(host: &str, port: u16, selector: &str, limits: &Limits) -> Result<Vec<u8>> {
    let mut conn = open(host, port, limits)?;
    let result = fetch_raw(&mut conn, selector, limits);
    finish(&mut conn);
    result.map(ResponseBuffer::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted chunks and records what was written
    #[derive(Default)]
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        closed: bool,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(chunk.split_off(n));
                    }
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for Scripted {
        fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn sends_selector_with_crlf() {
        let mut conn = Scripted::default();
        fetch(&mut conn, "/software", &Limits::default()).unwrap();
        assert_eq!(conn.written, b"/software\r\n");
        assert!(!conn.closed);
    }

    #[test]
    fn empty_selector() {
        let mut conn = Scripted::default();
        fetch(&mut conn, "", &Limits::default()).unwrap();
        assert_eq!(conn.written, b"\r\n");
    }

    #[test]
    fn fetch_decodes_listing() {
        let mut conn = Scripted::default();
        conn.chunks.push_back(b"0Display Text\t/sel\tho".to_vec());
        conn.chunks.push_back(b"st.example\t70\r\n.\r\n".to_vec());
        let directory = fetch(&mut conn, "", &Limits::default()).unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.items()[0].host, "host.example");
        assert!(directory.is_terminated());
    }

    #[test]
    fn fetch_raw_keeps_bytes() {
        let mut conn = Scripted::default();
        conn.chunks.push_back(vec![0, 1, 2, 0xff]);
        let response = fetch_raw(&mut conn, "/bin", &Limits::default()).unwrap();
        assert_eq!(response.as_bytes(), &[0u8, 1, 2, 0xff]);
    }

    #[test]
    fn cancelled_errors_are_recognised() {
        assert!(is_cancelled(&cancelled()));
        assert!(!is_cancelled(&io::Error::new(io::ErrorKind::Other, "other")));
    }
}
