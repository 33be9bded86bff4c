//! Byte-oriented buffered reader over a stream socket.
//!
//! `StreamReader` is the only thing in this crate that touches raw bytes off
//! the wire before `MessageParser` gets a structured view of them. It knows
//! nothing about HTTP grammar beyond where a header block ends.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Header blocks larger than this are rejected outright; a client (or a
/// misbehaving origin) that sends more than 64 KiB of headers without a
/// terminator is sent `400 Bad Request`.
pub const MAX_HEADER_BYTES: usize = 65_536;

/// The read timeout installed while waiting for a close-delimited body is
/// much shorter than the idle timeout: a quiet origin that intends to keep
/// the TCP connection open (but has nothing left to send) should not make a
/// `Connection: close` request hang for the full idle window.
const CLOSE_BODY_READ_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// Why [`StreamReader::read_header_block`] failed.
#[derive(Debug)]
pub enum HeaderReadError {
    /// The peer closed the connection (cleanly or mid-request) before a
    /// complete header block arrived. Callers distinguish "no bytes at all"
    /// (a quiet keep-alive connection ending normally) from "some bytes,
    /// then EOF" (a client that started a request and vanished) by checking
    /// whether anything had been read.
    Eof {
        /// True if at least one byte of a request had already arrived.
        partial: bool,
    },
    /// No terminator was found within [`MAX_HEADER_BYTES`].
    TooLarge,
    /// The configured read timeout elapsed with no terminator found. This is
    /// the normal way a persistent connection's idle period ends.
    Timeout,
    /// Any other I/O error.
    Io(io::Error),
}

impl From<io::Error> for HeaderReadError {
    fn from(e: io::Error) -> Self {
        HeaderReadError::Io(e)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Finds the earliest header-block terminator in `buf`: a strict `CRLF CRLF`
/// or, leniently, a bare `LF LF`. Returns the offset one past the end of the
/// terminator.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    let crlf = memchr::memmem::find(buf, b"\r\n\r\n").map(|p| p + 4);
    let lf = memchr::memmem::find(buf, b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(c), Some(l)) => Some(c.min(l)),
        (Some(c), None) => Some(c),
        (None, Some(l)) => Some(l),
        (None, None) => None,
    }
}

/// A buffered reader over one TCP connection. Holds any bytes read past the
/// logical boundary it was asked for (header terminator, exact body count)
/// so a subsequent call — or the next pipelined request on the same
/// connection — picks up exactly where the last one left off.
pub struct StreamReader {
    stream: TcpStream,
    buf: Vec<u8>,
    pos: usize,
}

impl StreamReader {
    /// Wraps an already-connected stream. Does not touch its timeouts;
    /// callers install those explicitly.
    pub fn new(stream: TcpStream) -> Self {
        StreamReader { stream, buf: Vec::new(), pos: 0 }
    }

    /// Drops already-consumed bytes from the front of the internal buffer.
    /// Called between requests on a persistent connection so the buffer
    /// doesn't grow across the connection's whole lifetime.
    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }

    fn unread_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads up to and including the first header-block terminator. On
    /// success, returns exactly the header bytes (terminator included);
    /// anything read past it remains buffered for the next call.
    pub fn read_header_block(&mut self) -> Result<Vec<u8>, HeaderReadError> {
        self.compact();
        loop {
            if let Some(end) = find_terminator(&self.buf[self.pos..]) {
                let header = self.buf[self.pos..self.pos + end].to_vec();
                self.pos += end;
                return Ok(header);
            }
            if self.unread_len() > MAX_HEADER_BYTES {
                return Err(HeaderReadError::TooLarge);
            }
            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(HeaderReadError::Eof { partial: !self.buf.is_empty() });
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => return Err(HeaderReadError::Timeout),
                Err(e) => return Err(HeaderReadError::Io(e)),
            }
        }
    }

    /// Reads exactly `n` bytes, failing with `UnexpectedEof` if the peer
    /// closes first.
    pub fn read_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.unread_len() < n {
            let mut chunk = [0u8; READ_CHUNK];
            let read = self.stream.read(&mut chunk)?;
            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed before body was fully read"));
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        let out = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    /// Reads until EOF or until a short read-timeout fires, whichever comes
    /// first, returning everything accumulated. Temporarily installs a
    /// short read timeout so a persistent-but-quiet origin doesn't hang the
    /// request for the full idle window.
    pub fn read_until_close(&mut self) -> io::Result<Vec<u8>> {
        let previous_timeout = self.stream.read_timeout()?;
        self.stream.set_read_timeout(Some(CLOSE_BODY_READ_TIMEOUT))?;

        let mut out = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();

        let result = loop {
            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.stream.set_read_timeout(previous_timeout)?;
        result.map(|()| out)
    }

    /// Installs a read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Installs a write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }

    /// Writes a complete message to the socket.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// A duplicate handle to the underlying socket, e.g. for handing off to
    /// the tunnel relay or a deadline-cancellation timer.
    pub fn try_clone(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Consumes the reader, returning the underlying socket and any bytes
    /// already buffered past the current read position (CONNECT never has
    /// leftover bytes in practice, but a pipelining client could send tunnel
    /// bytes early; those must not be dropped).
    pub fn into_parts(mut self) -> (TcpStream, Vec<u8>) {
        self.compact();
        (self.stream, self.buf)
    }
}
