//! Per-connection transport state (§3 Client, §9 "a rewrite should codify
//! this with a per-connection state transition"). `Connection` owns the raw
//! socket, its read/write buffers and the logical `Client` identity; it is
//! touched only by whichever I/O pool thread currently holds it (§5
//! "per-connection state ... needs no locking").

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use mio::event::Source;
use mio::{Interest, Registry, Token};

use crate::client::Client;

/// `Active -> AwaitingReply -> Active` on the request/reply path, or
/// `-> Closing -> Closed` on `QUIT`/protocol error (§9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Registered for `READABLE`, waiting for a complete packet.
    Active,
    /// A request has been handed to the worker pool; the connection is
    /// deregistered until its reply is ready, enforcing "at most one
    /// in-flight request per connection" (§5).
    AwaitingReply,
    /// A reply is partially written; registered for `WRITABLE`.
    Writing,
    /// `QUIT` processed or a protocol error observed; tear down on next
    /// opportunity.
    Closing,
}

pub enum Socket {
    Tcp(mio::net::TcpStream),
    #[cfg(unix)]
    Unix(mio::net::UnixStream),
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Socket::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Socket::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Socket::Unix(s) => s.flush(),
        }
    }
}

impl Source for Socket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.register(registry, token, interests),
            #[cfg(unix)]
            Socket::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.reregister(registry, token, interests),
            #[cfg(unix)]
            Socket::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.deregister(registry),
            #[cfg(unix)]
            Socket::Unix(s) => s.deregister(registry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Closed,
}

pub struct Connection {
    pub socket: Socket,
    pub client: Client,
    pub state: ConnState,
    pub read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    pub fn new(socket: Socket, now: u64) -> Self {
        Self {
            socket,
            client: Client::new(now),
            state: ConnState::Active,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::new(),
        }
    }

    /// Reads as many bytes as are immediately available into `read_buf`,
    /// stopping at the first `WouldBlock` or a `0`-byte read (§7
    /// `ClientDisconnect`).
    pub fn read_available(&mut self) -> io::Result<ReadOutcome> {
        let mut total = 0;
        let mut chunk = [0u8; 4096];
        loop {
            match self.socket.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::Data(total)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn advance_read(&mut self, n: usize) {
        self.read_buf.advance(n);
    }

    pub fn queue_reply(&mut self, bytes: BytesMut) {
        self.write_buf = bytes;
    }

    pub fn has_pending_write(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// Flushes as much of the pending reply as the socket accepts right
    /// now. Returns `true` once the buffer is fully drained.
    pub fn flush_pending(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.socket.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}
