//! The non-blocking half of C1 (spec.md §4.1): used by the server reception
//! loop (C4), which multiplexes reads across many client sockets on one
//! thread via `mio::Poll` without blocking on any single one.
//!
//! Directly generalises `flux-network::tcp::stream::TcpStream`'s
//! read-state-machine (`RxState::{ReadingHeader,ReadingPayload}`,
//! `ConnState::{Alive,Disconnected}`, write-or-enqueue-with-backlog) from a
//! timestamped, telemetry-carrying frame to this fabric's plain 4-byte
//! length-prefixed frame, and extends it to also cover `AF_UNIX` sockets.

use std::{
    collections::VecDeque,
    io::{self, IoSlice, Read, Write},
    path::Path,
};

use mio::{Interest, Registry, Token, event::Source, net::{TcpListener, TcpStream, UnixListener, UnixStream}};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;

const HEADER_SIZE: usize = 4;
const RX_BUF_SIZE: usize = 32 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ConnState {
    Alive,
    Disconnected,
}

pub enum ReadOutcome<'a> {
    PayloadDone { frame: &'a [u8] },
    WouldBlock,
    Disconnected,
}

#[derive(Clone, Copy)]
enum RxState {
    ReadingHeader { buf: [u8; HEADER_SIZE], have: usize },
    ReadingPayload { len: usize, offset: usize },
}

enum RawStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Read for RawStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => s.read(buf),
            RawStream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for RawStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => s.write(buf),
            RawStream::Unix(s) => s.write(buf),
        }
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => s.write_vectored(bufs),
            RawStream::Unix(s) => s.write_vectored(bufs),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RawStream::Tcp(s) => s.flush(),
            RawStream::Unix(s) => s.flush(),
        }
    }
}

impl Source for RawStream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            RawStream::Tcp(s) => s.register(registry, token, interests),
            RawStream::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            RawStream::Tcp(s) => s.reregister(registry, token, interests),
            RawStream::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            RawStream::Tcp(s) => s.deregister(registry),
            RawStream::Unix(s) => s.deregister(registry),
        }
    }
}

/// A single `mio`-backed, length-framed connection, owned by the reception
/// loop (C4). Mirrors `flux-network::tcp::stream::TcpStream` minus the
/// telemetry/timestamp header this fabric's frame doesn't carry.
pub struct Connection {
    stream: RawStream,
    rx_state: RxState,
    rx_buf: Vec<u8>,
    send_backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,
}

impl Connection {
    fn new(stream: RawStream) -> io::Result<Self> {
        Ok(Self {
            stream,
            rx_state: RxState::ReadingHeader { buf: [0; HEADER_SIZE], have: 0 },
            rx_buf: vec![0; RX_BUF_SIZE],
            send_backlog: VecDeque::new(),
            writable_armed: false,
        })
    }

    fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Self::new(RawStream::Tcp(stream))
    }

    fn from_unix(stream: UnixStream) -> io::Result<Self> {
        Self::new(RawStream::Unix(stream))
    }

    /// Polls this socket's readiness, invoking `on_msg` for every
    /// fully-assembled frame already buffered — it does not re-poll the
    /// kernel between messages (spec.md §4.4: "do not re-poll the kernel
    /// between them"). `readable`/`writable` come from the caller's own
    /// `mio::event::Event` (or a test double), so this module doesn't need
    /// to name that type.
    pub fn poll_with<F>(&mut self, registry: &Registry, readable: bool, writable: bool, on_msg: &mut F) -> ConnState
    where
        F: FnMut(&[u8]),
    {
        if readable {
            loop {
                match self.read_frame() {
                    ReadOutcome::PayloadDone { frame } => on_msg(frame),
                    ReadOutcome::WouldBlock => break,
                    ReadOutcome::Disconnected => return ConnState::Disconnected,
                }
            }
        }
        if writable && self.drain_backlog(registry) == ConnState::Disconnected {
            return ConnState::Disconnected;
        }
        ConnState::Alive
    }

    /// Frames and writes `body`, enqueuing it for later flush if the
    /// kernel would block.
    pub fn write_or_enqueue(&mut self, registry: &Registry, body: Vec<u8>) -> ConnState {
        let header = (body.len() as u32).to_le_bytes();
        if !self.send_backlog.is_empty() {
            self.enqueue(registry, header.to_vec());
            return self.enqueue(registry, body);
        }
        match self.stream.write_vectored(&[IoSlice::new(&header), IoSlice::new(&body)]) {
            Ok(0) => {
                warn!("reactor: stream failed to write, disconnecting");
                ConnState::Disconnected
            }
            Ok(n) if n == header.len() + body.len() => ConnState::Alive,
            Ok(n) if n < header.len() => {
                self.enqueue_front(registry, body);
                self.enqueue_front(registry, header[n..].to_vec())
            }
            Ok(n) => {
                let remaining = body[n - header.len()..].to_vec();
                self.enqueue_front(registry, remaining)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.enqueue(registry, header.to_vec());
                self.enqueue(registry, body)
            }
            Err(err) => {
                warn!(?err, "reactor: stream write fail");
                ConnState::Disconnected
            }
        }
    }

    fn enqueue(&mut self, registry: &Registry, data: Vec<u8>) -> ConnState {
        self.send_backlog.push_back(data);
        self.arm_writable(registry)
    }

    fn enqueue_front(&mut self, registry: &Registry, data: Vec<u8>) -> ConnState {
        self.send_backlog.push_front(data);
        self.arm_writable(registry)
    }

    fn arm_writable(&mut self, registry: &Registry) -> ConnState {
        if !self.writable_armed {
            if let Err(err) =
                registry.reregister(&mut self.stream, CONN_TOKEN, Interest::READABLE | Interest::WRITABLE)
            {
                debug!(?err, "reactor: reregister writable");
                return ConnState::Disconnected;
            }
            self.writable_armed = true;
        }
        ConnState::Alive
    }

    fn drain_backlog(&mut self, registry: &Registry) -> ConnState {
        while let Some(front) = self.send_backlog.front_mut() {
            match self.stream.write(front) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) if n == front.len() => {
                    self.send_backlog.pop_front();
                }
                Ok(n) => front.drain(..n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "reactor: write from backlog");
                    return ConnState::Disconnected;
                }
            };
        }
        if self.send_backlog.is_empty() && self.writable_armed {
            if let Err(err) = registry.reregister(&mut self.stream, CONN_TOKEN, Interest::READABLE) {
                debug!(?err, "reactor: reregister drop writable");
                return ConnState::Disconnected;
            }
            self.writable_armed = false;
        }
        ConnState::Alive
    }

    fn read_frame(&mut self) -> ReadOutcome<'_> {
        loop {
            match self.rx_state {
                RxState::ReadingHeader { mut buf, mut have } => {
                    while have < HEADER_SIZE {
                        match self.stream.read(&mut buf[have..]) {
                            Ok(0) => return ReadOutcome::Disconnected,
                            Ok(n) => {
                                have += n;
                                if have == HEADER_SIZE {
                                    let len = u32::from_le_bytes(buf) as usize;
                                    if len > self.rx_buf.len() {
                                        self.rx_buf.resize(len, 0);
                                    }
                                    self.rx_state = RxState::ReadingPayload { len, offset: 0 };
                                }
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                self.rx_state = RxState::ReadingHeader { buf, have };
                                return ReadOutcome::WouldBlock;
                            }
                            Err(err) => {
                                debug!(?err, "reactor: read header");
                                return ReadOutcome::Disconnected;
                            }
                        }
                    }
                }
                RxState::ReadingPayload { len, mut offset } => {
                    while offset < len {
                        match self.stream.read(&mut self.rx_buf[offset..len]) {
                            Ok(0) => return ReadOutcome::Disconnected,
                            Ok(n) => {
                                offset += n;
                                if offset == len {
                                    self.rx_state =
                                        RxState::ReadingHeader { buf: [0; HEADER_SIZE], have: 0 };
                                    return ReadOutcome::PayloadDone { frame: &self.rx_buf[..len] };
                                }
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                self.rx_state = RxState::ReadingPayload { len, offset };
                                return ReadOutcome::WouldBlock;
                            }
                            Err(err) => {
                                debug!(?err, "reactor: read payload");
                                return ReadOutcome::Disconnected;
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.stream, token, Interest::READABLE)
    }

    pub fn close(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.stream);
    }
}

/// `reregister`/`register` calls above only need *some* `Token` value
/// (mio only cares that the registration target matches); the real token
/// tracked in `rfab-server`'s connection table is what's returned via
/// `poll_with`'s caller-supplied mapping, so any stable placeholder works
/// here.
const CONN_TOKEN: Token = Token(usize::MAX);

pub enum RawListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl RawListener {
    pub fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(RawListener::Tcp(TcpListener::bind(*addr)?)),
            Endpoint::Unix(path) => Ok(RawListener::Unix(bind_unix(path)?)),
        }
    }

    pub fn accept(&mut self) -> io::Result<Connection> {
        match self {
            RawListener::Tcp(l) => {
                let (stream, _addr) = l.accept()?;
                Connection::from_tcp(stream)
            }
            RawListener::Unix(l) => {
                let (stream, _addr) = l.accept()?;
                Connection::from_unix(stream)
            }
        }
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        match self {
            RawListener::Tcp(l) => registry.register(l, token, Interest::READABLE),
            RawListener::Unix(l) => registry.register(l, token, Interest::READABLE),
        }
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            RawListener::Tcp(l) => registry.deregister(l),
            RawListener::Unix(l) => registry.deregister(l),
        }
    }

    /// The address actually bound, which for `Endpoint::Tcp(addr)` with
    /// `addr.port() == 0` differs from the endpoint passed to `bind` (the
    /// kernel picks a free port) — tests rely on this to reconnect.
    pub fn local_endpoint(&self, fallback: &Endpoint) -> Endpoint {
        match self {
            RawListener::Tcp(l) => l.local_addr().map(Endpoint::Tcp).unwrap_or_else(|_| fallback.clone()),
            RawListener::Unix(_) => fallback.clone(),
        }
    }
}

fn bind_unix(path: &Path) -> io::Result<UnixListener> {
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path)
}
