//! The blocking half of C1 (spec.md §4.1): used by the client session (C6),
//! which needs a true blocking `recv` and a boundedly-blocking `poll`.
//!
//! Framing is shared with the non-blocking half (`crate::reactor`): a
//! 4-byte little-endian length header followed by exactly that many payload
//! bytes. Payloads under `CONCAT_THRESHOLD` are written together with their
//! header in one syscall; larger payloads are written as header then body.
//! A single receive scratch buffer is reused across messages and compacted
//! once the read cursor passes its midpoint, grounded on
//! `processional/connection.py::SocketConnection` (`_recv_raw`, `_read`).

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    os::unix::net::{UnixListener, UnixStream},
    path::Path,
    time::{Duration, Instant},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{codec, endpoint::Endpoint, error::WireError};

const HEADER_SIZE: usize = 4;
const CONCAT_THRESHOLD: usize = 512;
const SCRATCH_SIZE: usize = 4096;

enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    fn set_nonblocking(&self, v: bool) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_nonblocking(v),
            Stream::Unix(s) => s.set_nonblocking(v),
        }
    }

    fn set_read_timeout(&self, d: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(d),
            Stream::Unix(s) => s.set_read_timeout(d),
        }
    }

    fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Tcp(s) => Ok(Stream::Tcp(s.try_clone()?)),
            Stream::Unix(s) => Ok(Stream::Unix(s.try_clone()?)),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(buf),
            Stream::Unix(s) => s.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// A connected, blocking, length-framed duplex byte stream (C1).
///
/// Not safe for concurrent `recv`/`poll` calls from multiple threads at
/// once — the client (C6) serialises access with its own receive mutex,
/// per spec.md §4.1.
pub struct Connection {
    stream: Stream,
    scratch: Vec<u8>,
    start: usize,
    end: usize,
}

impl Connection {
    fn new(stream: Stream) -> Self {
        Self { stream, scratch: vec![0_u8; SCRATCH_SIZE], start: 0, end: 0 }
    }

    /// Connects to `endpoint`, used by the client (C6) to dial a server.
    pub fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self, WireError> {
        let stream = match endpoint {
            Endpoint::Tcp(addr) => Stream::Tcp(connect_tcp(*addr, timeout)?),
            Endpoint::Unix(path) => Stream::Unix(connect_unix(path, timeout)?),
        };
        Ok(Self::new(stream))
    }

    fn buffered(&self) -> usize {
        self.end - self.start
    }

    fn compact_if_needed(&mut self) {
        if self.start > self.scratch.len() / 2 {
            self.scratch.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Fills the scratch buffer with whatever is readable right now,
    /// growing it if a single read would otherwise overflow it. `blocking`
    /// controls whether this call waits for the kernel or returns
    /// immediately with whatever is already queued.
    fn fill_once(&mut self, blocking: bool) -> Result<(), WireError> {
        self.compact_if_needed();
        if self.end == self.scratch.len() {
            self.scratch.resize(self.scratch.len() * 2, 0);
        }
        self.stream.set_nonblocking(!blocking).map_err(WireError::Io)?;
        let res = self.stream.read(&mut self.scratch[self.end..]);
        let _ = self.stream.set_nonblocking(false);
        match res {
            Ok(0) => Err(WireError::Disconnected),
            Ok(n) => {
                self.end += n;
                Ok(())
            }
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => Err(WireError::Io(e)),
        }
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.buffered() < n {
            return None;
        }
        let slice = &self.scratch[self.start..self.start + n];
        self.start += n;
        Some(slice)
    }

    /// Receives one value, blocking until the whole frame has arrived.
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T, WireError> {
        while self.buffered() < HEADER_SIZE {
            self.fill_once(true)?;
        }
        let header: [u8; HEADER_SIZE] = self.take(HEADER_SIZE).unwrap().try_into().unwrap();
        let len = u32::from_le_bytes(header) as usize;
        while self.buffered() < len {
            self.fill_once(true)?;
        }
        let body = self.take(len).unwrap();
        codec::decode(body)
    }

    /// Checks for data availability without necessarily consuming a frame.
    ///
    /// `timeout = None` blocks until at least one full frame is ready;
    /// `Some(Duration::ZERO)` is non-blocking; any other `Some(d)` waits up
    /// to `d` (spec.md §4.1).
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, WireError> {
        if self.buffered() >= HEADER_SIZE {
            let len = peek_len(&self.scratch[self.start..self.start + HEADER_SIZE]);
            if self.buffered() >= HEADER_SIZE + len {
                return Ok(true);
            }
        }

        match timeout {
            None => {
                self.fill_once(true)?;
            }
            Some(d) if d.is_zero() => {
                self.fill_once(false)?;
            }
            Some(d) => {
                self.stream.set_read_timeout(Some(d)).map_err(WireError::Io)?;
                let res = self.fill_once_timed();
                let _ = self.stream.set_read_timeout(None);
                res?;
            }
        }

        if self.buffered() < HEADER_SIZE {
            return Ok(false);
        }
        let len = peek_len(&self.scratch[self.start..self.start + HEADER_SIZE]);
        Ok(self.buffered() >= HEADER_SIZE + len)
    }

    fn fill_once_timed(&mut self) -> Result<(), WireError> {
        self.compact_if_needed();
        if self.end == self.scratch.len() {
            self.scratch.resize(self.scratch.len() * 2, 0);
        }
        match self.stream.read(&mut self.scratch[self.end..]) {
            Ok(0) => Err(WireError::Disconnected),
            Ok(n) => {
                self.end += n;
                Ok(())
            }
            Err(e) if would_block(&e) || e.kind() == io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(WireError::Io(e)),
        }
    }

    /// Sends one value, blocking until every byte is handed to the kernel.
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<(), WireError> {
        let body = codec::encode(value)?;
        let header = (body.len() as u32).to_le_bytes();
        if body.len() < CONCAT_THRESHOLD {
            let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
            frame.extend_from_slice(&header);
            frame.extend_from_slice(&body);
            self.stream.write_all(&frame).map_err(write_err)?;
        } else {
            self.stream.write_all(&header).map_err(write_err)?;
            self.stream.write_all(&body).map_err(write_err)?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        debug!("closing connection");
    }

    /// Duplicates the underlying socket fd, giving the caller an
    /// independent read/write cursor over the same connection. Used by
    /// `rfab_client::Session` to hold separate send and receive halves
    /// under separate mutexes (spec.md §5 "send mutex... receive
    /// mutex...") instead of one mutex serialising both directions.
    pub fn try_clone(&self) -> Result<Connection, WireError> {
        Ok(Self::new(self.stream.try_clone().map_err(WireError::Io)?))
    }
}

fn peek_len(header: &[u8]) -> usize {
    u32::from_le_bytes(header.try_into().unwrap()) as usize
}

fn would_block(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock)
}

fn write_err(e: io::Error) -> WireError {
    if matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
    ) {
        WireError::Disconnected
    } else {
        WireError::Io(e)
    }
}

fn connect_tcp(addr: SocketAddr, timeout: Option<Duration>) -> Result<TcpStream, WireError> {
    let stream = match timeout {
        Some(d) => TcpStream::connect_timeout(&addr, d).map_err(write_err)?,
        None => TcpStream::connect(addr).map_err(write_err)?,
    };
    stream.set_nodelay(true).map_err(WireError::Io)?;
    Ok(stream)
}

fn connect_unix(path: &Path, timeout: Option<Duration>) -> Result<UnixStream, WireError> {
    // `SOCK_STREAM` unix connects are local and effectively instantaneous
    // once the path exists; the only thing worth bounding is waiting for
    // the server to have created the socket file yet.
    let deadline = timeout.map(|d| Instant::now() + d);
    loop {
        match UnixStream::connect(path) {
            Ok(s) => return Ok(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(WireError::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "server socket not found",
                        )));
                    }
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(write_err(e)),
        }
    }
}

/// Binds a listening socket for `endpoint`, used by the CLI/server bootstrap
/// before handing the listener to the non-blocking reactor.
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

pub fn bind(endpoint: &Endpoint) -> Result<Listener, WireError> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr).map_err(WireError::Io)?)),
        Endpoint::Unix(path) => {
            let _ = std::fs::remove_file(path);
            Ok(Listener::Unix(UnixListener::bind(path).map_err(WireError::Io)?))
        }
    }
}

/// Resolves a `host:port` string the same way `Endpoint::parse` would, for
/// callers that already know they want TCP (keeps `ToSocketAddrs` imported
/// for downstream crates that parse user-supplied endpoints).
pub fn resolve_tcp(raw: &str) -> Result<SocketAddr, WireError> {
    raw.to_socket_addrs()
        .map_err(WireError::Io)?
        .next()
        .ok_or_else(|| WireError::Io(io::Error::new(io::ErrorKind::InvalidInput, "no address")))
}
