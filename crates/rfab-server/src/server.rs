//! Server reception loop (C4, spec.md §4.4), generalising
//! `flux-network::tcp::connector::ConnectionManager`'s single-threaded,
//! `mio::Poll`-driven accept/read/dispatch loop from an outbound-reconnecting
//! peer-to-peer connector into an inbound-only, opcode-dispatching request
//! server.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use mio::{Events, Token, Waker};
use rfab_registry::{ClientRefs, DynValue, Registry};
use rfab_wire::{
    Endpoint, Opcode, Reply, Request, RequestBody, Sid, Value,
    codec,
    reactor::{self, ConnState, RawListener},
};
use tracing::{debug, warn};

use crate::{
    bridge,
    environment::Environment,
    error::ServerError,
    worker::{self, Outcome},
};

const LISTENER_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

struct ClientConn {
    conn: reactor::Connection,
    refs: ClientRefs,
}

/// Configures a [`Server`] before it binds its listening socket, mirroring
/// `TcpConnector`'s builder methods (`with_reconnect_interval`,
/// `with_on_connect_msg`, …) for this fabric's `persistent`/`attached`/
/// environment knobs (spec.md §4.4, SPEC_FULL.md §2).
pub struct ServerBuilder {
    endpoint: Endpoint,
    persistent: bool,
    attached: bool,
    environment: Environment,
}

impl ServerBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, persistent: false, attached: false, environment: Environment::new() }
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn attached(mut self, attached: bool) -> Self {
        self.attached = attached;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let mut poll = mio::Poll::new().map_err(ServerError::Io)?;
        let mut listener = RawListener::bind(&self.endpoint).map_err(ServerError::Io)?;
        listener.register(poll.registry(), LISTENER_TOKEN).map_err(ServerError::Io)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN).map_err(ServerError::Io)?);
        let endpoint = listener.local_endpoint(&self.endpoint);
        Ok(Server {
            poll,
            listener,
            endpoint,
            conns: Vec::new(),
            next_token: FIRST_CLIENT_TOKEN,
            registry: Arc::new(Registry::new()),
            env: Arc::new(self.environment),
            persistent: self.persistent,
            attached: self.attached,
            should_stop: false,
            sid: Sid::current(),
            waker,
            completed: Arc::new(Mutex::new(VecDeque::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// The running server: listening socket, connected clients, and the
/// process-wide handle registry (spec.md §6 "Process-wide state — One
/// global handle registry per server process").
pub struct Server {
    poll: mio::Poll,
    listener: RawListener,
    endpoint: Endpoint,
    conns: Vec<(Token, ClientConn)>,
    next_token: usize,
    registry: Arc<Registry>,
    env: Arc<Environment>,
    persistent: bool,
    attached: bool,
    should_stop: bool,
    sid: Sid,
    waker: Arc<Waker>,
    /// Replies produced by THREAD workers off the reception thread,
    /// drained on `WAKE_TOKEN` (spec.md §5: workers "execute in parallel
    /// with the reception flow").
    completed: Arc<Mutex<VecDeque<(Token, Vec<u8>)>>>,
    /// Set by a [`ShutdownHandle`] from outside the reception thread (e.g.
    /// `rfab-cli`'s Ctrl+C handler); checked once per poll round alongside
    /// the CLOSE opcode's in-band `should_stop`.
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A cheaply cloneable handle that lets code outside the reception
    /// thread ask the loop to stop, the external counterpart to the
    /// in-band CLOSE opcode. Mirrors `flux-ctl`'s use of `ctrlc` to turn an
    /// OS signal into a clean shutdown rather than leaving `SIGINT` to kill
    /// the process mid-write.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: self.shutdown.clone(), waker: self.waker.clone() }
    }

    /// The address actually bound (resolves an ephemeral `:0` port to the
    /// one the kernel picked), used by [`crate::ServerBuilder`]'s callers
    /// (notably tests and `rfab::localserver`) to reconnect.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs the reception loop until CLOSE is received, or the client set
    /// empties on a non-persistent server (spec.md §4.4 "Termination").
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(128);
        loop {
            self.poll.poll(&mut events, None).map_err(ServerError::Io)?;
            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_ready(),
                    WAKE_TOKEN => self.drain_completed(),
                    token => self.client_ready(token, event.is_readable(), event.is_writable()),
                }
                if self.should_stop {
                    return Ok(());
                }
            }

            if self.shutdown.load(Ordering::SeqCst) {
                debug!("server: external shutdown requested, exiting loop");
                return Ok(());
            }

            if self.conns.is_empty() {
                if self.attached {
                    debug!("server: attached and no clients remain, exiting process");
                    std::process::exit(0);
                }
                if !self.persistent {
                    return Ok(());
                }
            }
        }
    }

    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok(mut conn) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) = conn.register(self.poll.registry(), token) {
                        warn!(?err, "server: failed to register accepted connection");
                        continue;
                    }
                    match codec::encode(&self.sid) {
                        Ok(handshake) => {
                            conn.write_or_enqueue(self.poll.registry(), handshake);
                        }
                        Err(err) => {
                            warn!(?err, "server: failed to encode handshake");
                            continue;
                        }
                    }
                    self.conns.push((token, ClientConn { conn, refs: ClientRefs::new() }));
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(?err, "server: accept failed");
                    break;
                }
            }
        }
    }

    fn drain_completed(&mut self) {
        let pending: Vec<_> = {
            let mut queue = self.completed.lock().unwrap();
            queue.drain(..).collect()
        };
        for (token, bytes) in pending {
            self.write_bytes(token, bytes);
        }
    }

    fn client_ready(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(index) = self.index_of(token) else { return };
        let mut frames = Vec::new();
        let registry = self.poll.registry();
        let state = self.conns[index].1.conn.poll_with(registry, readable, writable, &mut |frame| {
            frames.push(frame.to_vec())
        });
        if state == ConnState::Disconnected {
            let (_, client) = self.conns.swap_remove(index);
            self.registry.disconnect(client.refs);
            return;
        }
        for frame in frames {
            match codec::decode::<Request>(&frame) {
                Ok(request) => {
                    self.dispatch(token, request);
                    if self.should_stop {
                        return;
                    }
                }
                Err(err) => warn!(?err, "server: failed to decode request frame"),
            }
        }
    }

    fn dispatch(&mut self, token: Token, request: Request) {
        let Request { task_id, op, body } = request;
        match (op, body) {
            (Opcode::Close, _) => {
                self.send_reply(token, Reply::close(task_id));
                self.should_stop = true;
            }
            (Opcode::Block, RequestBody::Call(payload)) => {
                let outcome = worker::run(&payload, &self.env, &self.registry);
                self.send_outcome(token, task_id, outcome);
            }
            (Opcode::Wrap, RequestBody::Call(payload)) => {
                let root = if bridge::matches(&payload) {
                    bridge::run(&payload).map(|value| self.registry.register(Box::new(value)))
                } else {
                    match worker::run(&payload, &self.env, &self.registry) {
                        Outcome::Ok(value) => Ok(self.registry.register(Box::new(DynValue::new(value)))),
                        Outcome::Err { error, traceback } => Err((error, traceback)),
                    }
                };
                match root {
                    Ok(root) => {
                        if let Some(index) = self.index_of(token) {
                            self.registry.own(&mut self.conns[index].1.refs, root);
                        }
                        self.send_reply(token, Reply::ok(task_id, Value::Int(root as i64)));
                    }
                    Err((error, traceback)) => {
                        self.send_reply(token, Reply::err(task_id, error, traceback));
                    }
                }
            }
            (Opcode::Thread, RequestBody::Call(payload)) => {
                let env = self.env.clone();
                let registry = self.registry.clone();
                let waker = self.waker.clone();
                let completed = self.completed.clone();
                std::thread::spawn(move || {
                    rfab_utils::thread_boot(None, rfab_utils::ThreadPriority::OSDefault);
                    let outcome = worker::run(&payload, &env, &registry);
                    let reply = match outcome {
                        Outcome::Ok(value) => Reply::ok(task_id, value),
                        Outcome::Err { error, traceback } => Reply::err(task_id, error, traceback),
                    };
                    if let Ok(bytes) = codec::encode(&reply) {
                        completed.lock().unwrap().push_back((token, bytes));
                        let _ = waker.wake();
                    }
                });
            }
            (Opcode::Drop, RequestBody::Root(root)) => {
                if let Some(index) = self.index_of(token) {
                    self.registry.drop_ref(&mut self.conns[index].1.refs, root);
                }
            }
            (Opcode::Own, RequestBody::Root(root)) => {
                if let Some(index) = self.index_of(token) {
                    self.registry.own(&mut self.conns[index].1.refs, root);
                }
            }
            (Opcode::Persist, _) => self.persistent = true,
            (Opcode::Detach, _) => self.attached = false,
            (op, _) => warn!(?op, "server: request body did not match its opcode"),
        }
    }

    fn send_outcome(&mut self, token: Token, task_id: u64, outcome: Outcome) {
        let reply = match outcome {
            Outcome::Ok(value) => Reply::ok(task_id, value),
            Outcome::Err { error, traceback } => Reply::err(task_id, error, traceback),
        };
        self.send_reply(token, reply);
    }

    fn send_reply(&mut self, token: Token, reply: Reply) {
        match codec::encode(&reply) {
            Ok(bytes) => self.write_bytes(token, bytes),
            Err(err) => warn!(?err, "server: failed to encode reply"),
        }
    }

    fn write_bytes(&mut self, token: Token, bytes: Vec<u8>) {
        let Some(index) = self.index_of(token) else { return };
        let registry = self.poll.registry();
        if self.conns[index].1.conn.write_or_enqueue(registry, bytes) == ConnState::Disconnected {
            let (_, client) = self.conns.swap_remove(index);
            self.registry.disconnect(client.refs);
        }
    }

    fn index_of(&self, token: Token) -> Option<usize> {
        self.conns.iter().position(|(t, _)| *t == token)
    }
}

/// External counterpart to CLOSE (spec.md §4.4 only documents the in-band
/// opcode): flips an `AtomicBool` the reception loop checks once per poll
/// round and wakes the loop's blocking `poll(&mut events, None)` via the
/// same `mio::Waker` used to deliver completed THREAD replies, so the
/// trigger is observed promptly instead of waiting for unrelated socket
/// activity.
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}
