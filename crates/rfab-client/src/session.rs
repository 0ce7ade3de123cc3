//! Client session (C6, spec.md §4.6), grounded on
//! `processional/processing.py::SlaveProcess`/`Task`, generalised from
//! Python's `Lock`/`Condition` pair to Rust's `Mutex`/`Condvar` — the
//! idiomatic vocabulary the rest of the corpus reaches for whenever a
//! blocking rendezvous (not a lock-free ring, which is what `flux`'s own
//! queues are built for) is the right tool.

use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use rfab_wire::{
    Endpoint, Opcode, Payload, Reply, RequestBody, RootId, Sid, Value, blocking,
};
use tracing::debug;

use crate::{
    bridge,
    error::ClientError,
    handle::{Ownership, RemoteHandle},
    orphan::{OrphanSink, TracingOrphanSink},
    pending::{Outcome, Pending, outcome_of},
};

/// `Task.wait`/`schedule`'s voluntary backlog drain ceiling (spec.md
/// §4.6, §5: "bound the unpolled backlog... MAX_UNPOLLED (≈ 200)").
const MAX_UNPOLLED: u64 = 200;

struct Inner {
    send: Mutex<blocking::Connection>,
    recv: Mutex<blocking::Connection>,
    pending: Pending,
    next_id: AtomicU64,
    unpolled: AtomicU64,
    sid: Sid,
    orphan_sink: Arc<dyn OrphanSink>,
    pid_hint: Option<u32>,
}

/// A connected client session (spec.md §4.6). Cheap to clone — every
/// clone shares the same send/receive halves, pending-task table, and
/// slave identity; this is how one `RemoteHandle` and its owning
/// session's other users (another `RemoteHandle`, a bridged lookup)
/// coexist without races.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// A non-owning reference to a [`Session`], used by the process-wide
/// bridge table (spec.md §4.7 cross-process relay) so that a session
/// being dropped by its last owner isn't kept alive just because some
/// other process once decoded a handle that named its `Sid`.
#[derive(Clone)]
pub struct WeakSession(Weak<Inner>);

impl WeakSession {
    pub fn upgrade(&self) -> Option<Session> {
        self.0.upgrade().map(|inner| Session { inner })
    }
}

impl Session {
    /// Dials `endpoint`, performs the SID handshake (spec.md §6: "the
    /// server sends one framed message carrying the SID"), and registers
    /// the resulting session in the process-wide bridge table (spec.md
    /// §4.7; mirrors `SlaveProcess.instances[self.sid] = self`).
    pub fn dial(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Session, ClientError> {
        let mut handshake = blocking::Connection::connect(endpoint, timeout)?;
        let sid: Sid = handshake.recv()?;
        let send = handshake.try_clone()?;
        let session = Session {
            inner: Arc::new(Inner {
                send: Mutex::new(send),
                recv: Mutex::new(handshake),
                pending: Pending::default(),
                next_id: AtomicU64::new(0),
                unpolled: AtomicU64::new(0),
                sid,
                orphan_sink: Arc::new(TracingOrphanSink),
                pid_hint: None,
            }),
        };
        bridge::register(session.sid().clone(), session.weak());
        Ok(session)
    }

    /// Like [`Session::dial`] but tags the session with the pid of a
    /// process the caller itself spawned (SPEC_FULL.md §10's `pid_hint`:
    /// process-spawning glue is out of scope here, spec.md §1, so this
    /// crate never learns a pid on its own).
    pub fn dial_with_pid(
        endpoint: &Endpoint,
        timeout: Option<Duration>,
        pid: u32,
    ) -> Result<Session, ClientError> {
        let mut session = Self::dial(endpoint, timeout)?;
        Arc::get_mut(&mut session.inner).map(|inner| inner.pid_hint = Some(pid));
        Ok(session)
    }

    pub fn with_orphan_sink(mut self, sink: Arc<dyn OrphanSink>) -> Self {
        // Sessions are usually shared (Clone) by the time a caller wants
        // a custom sink only right after `dial`, when the Arc is unique.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.orphan_sink = sink;
        }
        self
    }

    pub fn sid(&self) -> &Sid {
        &self.inner.sid
    }

    pub fn pid_hint(&self) -> Option<u32> {
        self.inner.pid_hint
    }

    fn weak(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    /// Schedules a BLOCK/THREAD/WRAP request (spec.md §4.6 `schedule`).
    pub fn schedule(&self, op: Opcode, payload: Payload) -> Result<Task, ClientError> {
        self.schedule_body(op, RequestBody::Call(payload))
    }

    fn schedule_body(&self, op: Opcode, body: RequestBody) -> Result<Task, ClientError> {
        let mut send_guard = self.inner.send.lock().unwrap();
        let task_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.pending.insert(task_id);

        let request = rfab_wire::Request { task_id, op, body };
        if let Err(err) = send_guard.send(&request) {
            self.inner.pending.remove(task_id);
            return Err(err.into());
        }

        let unpolled = self.inner.unpolled.fetch_add(1, Ordering::SeqCst) + 1;
        if unpolled > MAX_UNPOLLED {
            if let Ok(mut recv_guard) = self.inner.recv.try_lock() {
                while self.poll_locked(&mut recv_guard, Some(Duration::ZERO)).unwrap_or(false) {}
                self.inner.unpolled.store(0, Ordering::SeqCst);
            }
        }
        drop(send_guard);

        Ok(Task { session: self.clone(), task_id, consumed: false })
    }

    /// `invoke(payload) = schedule(payload, BLOCK).wait()` (spec.md §4.6).
    pub fn invoke(&self, payload: Payload) -> Result<Value, ClientError> {
        self.schedule(Opcode::Block, payload)?.wait(None)
    }

    /// `thread(payload) = schedule(payload, THREAD)` (spec.md §4.6).
    pub fn thread(&self, payload: Payload) -> Result<Task, ClientError> {
        self.schedule(Opcode::Thread, payload)
    }

    /// `wrap(payload) -> Handle` (spec.md §4.6): awaits the root id
    /// synchronously, so no request can reference it before the server
    /// has assigned it (spec.md §5 WRAP ordering guarantee), then
    /// constructs an owned handle locally.
    pub fn wrap(&self, payload: Payload) -> Result<RemoteHandle, ClientError> {
        let reply = self.schedule(Opcode::Wrap, payload)?.wait(None)?;
        let root = reply.as_int().ok_or_else(|| ClientError::RemoteFailure {
            error: Value::Str("WRAP reply did not carry an integer root id".into()),
            traceback: String::new(),
        })? as RootId;
        Ok(RemoteHandle::new(self.clone(), rfab_wire::root_address(root), Ownership::Owned))
    }

    /// Bridges this slave to another server (SPEC_FULL.md §10, recovered
    /// from `processing.py::SlaveProcess.connect`): has the *remote*
    /// slave itself dial `endpoint`, registering that new connection
    /// under this slave's own bridge table, and returns an owned handle
    /// to it — the mechanism that lets a third process later decode a
    /// handle owned by `endpoint`'s slave (spec.md §8 scenario 5).
    pub fn connect(&self, endpoint: &Endpoint) -> Result<RemoteHandle, ClientError> {
        self.wrap(Payload::Invoke(Value::Str("__connect__".into()), vec![Value::Str(endpoint.to_string())]))
    }

    pub fn own(&self, root: RootId) -> Result<(), ClientError> {
        self.schedule_body(Opcode::Own, RequestBody::Root(root)).map(|_| ())
    }

    pub fn drop_ref(&self, root: RootId) -> Result<(), ClientError> {
        self.schedule_body(Opcode::Drop, RequestBody::Root(root)).map(|_| ())
    }

    /// Sets the server's `persistent` flag (spec.md §4.4).
    pub fn persist(&self) -> Result<(), ClientError> {
        self.schedule_body(Opcode::Persist, RequestBody::None).map(|_| ())
    }

    /// Sets the server's `attached` flag to false (spec.md §4.4).
    pub fn detach(&self) -> Result<(), ClientError> {
        self.schedule_body(Opcode::Detach, RequestBody::None).map(|_| ())
    }

    /// Asks the server to stop its reception loop (spec.md §4.4 CLOSE);
    /// waits for the all-null acknowledgement.
    pub fn stop(&self) -> Result<(), ClientError> {
        self.schedule_body(Opcode::Close, RequestBody::None)?.wait(None).map(|_| ())
    }

    /// Best-effort external termination of a slave this crate did not
    /// spawn itself (SPEC_FULL.md §10: process-spawning is out of scope,
    /// spec.md §1, so this is a thin shim over a pid the embedder already
    /// knows, not a `fork`/`exec` facility).
    pub fn terminate(&self) -> Result<(), ClientError> {
        let Some(_pid) = self.inner.pid_hint else {
            return Err(ClientError::RemoteFailure {
                error: Value::Str("this session has no pid hint; it was not dialed from a spawned child".into()),
                traceback: String::new(),
            });
        };
        #[cfg(unix)]
        {
            // SAFETY: `_pid` is a plain pid_t the caller attested to owning.
            unsafe {
                libc::kill(_pid as libc::pid_t, libc::SIGTERM);
            }
        }
        Ok(())
    }

    /// `poll(timeout) -> bool` (spec.md §4.6): consumes exactly one
    /// reply if one is (or becomes) ready.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<bool, ClientError> {
        let mut guard = self.inner.recv.lock().unwrap();
        self.poll_locked(&mut guard, timeout)
    }

    fn poll_locked(
        &self,
        conn: &mut blocking::Connection,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        if !conn.poll(timeout)? {
            return Ok(false);
        }
        let reply: Reply = conn.recv()?;
        let task_id = reply.task_id;
        let outcome = outcome_of(reply);
        // `fulfil` hands the outcome back iff `task_id` was unknown to
        // us — an orphan reply (spec.md §3, §7: "logged if it is a
        // failure, otherwise discarded").
        if let Some(Outcome::Err(error, traceback)) = self.inner.pending.fulfil(task_id, outcome) {
            self.inner.orphan_sink.orphan_failure(task_id, &error, &traceback);
        }
        Ok(true)
    }
}

/// A scheduled task's awaiter (spec.md §4.6 `Task`, §3 "Pending task").
pub struct Task {
    session: Session,
    task_id: u64,
    consumed: bool,
}

impl Task {
    /// `available()` / `complete()`'s non-blocking half: true once the
    /// reply has arrived, opportunistically draining one reply if the
    /// receive mutex is free (spec.md §8 scenario 2 `t.available()`).
    pub fn available(&self) -> bool {
        if self.session.inner.pending.is_filled(self.task_id) {
            return true;
        }
        if let Ok(mut guard) = self.session.inner.recv.try_lock() {
            let _ = self.session.poll_locked(&mut guard, Some(Duration::ZERO));
        }
        self.session.inner.pending.is_filled(self.task_id)
    }

    /// Waits for the task's reply, up to `timeout` (spec.md §4.6
    /// `Task.wait`): tries the receive mutex first, falling back to the
    /// condition variable's fan-out when another waiter already holds it.
    pub fn wait(mut self, timeout: Option<Duration>) -> Result<Value, ClientError> {
        self.wait_mut(timeout)
    }

    fn wait_mut(&mut self, timeout: Option<Duration>) -> Result<Value, ClientError> {
        self.consumed = true;
        let deadline = timeout.map(|d| Instant::now() + d);

        loop {
            if let Some(outcome) = self.session.inner.pending.take_if_filled(self.task_id) {
                return finish(outcome);
            }

            let remaining = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Err(ClientError::Timeout);
                    }
                    Some(dl - now)
                }
                None => None,
            };

            match self.session.inner.recv.try_lock() {
                Ok(mut guard) => {
                    let _ = self.session.poll_locked(&mut guard, remaining);
                }
                Err(_) => {
                    self.session.inner.pending.wait_for_fill(self.task_id, deadline);
                }
            }
        }
    }
}

impl Drop for Task {
    /// "dropped silently if the owning handle is discarded", except a
    /// filled-but-unread error is reported once (spec.md §3, §7).
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        if let Some(Some(Outcome::Err(error, traceback))) = self.session.inner.pending.remove(self.task_id) {
            self.session.inner.orphan_sink.orphan_failure(self.task_id, &error, &traceback);
        }
    }
}

fn finish(outcome: Outcome) -> Result<Value, ClientError> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Err(error, traceback) => Err(ClientError::RemoteFailure { error, traceback }),
    }
}

/// Bridges a handle decoded off the wire (spec.md §4.7 cross-process
/// relay) to a live [`RemoteHandle`] using this process's bridge table.
pub(crate) fn resolve_bridge(href: rfab_wire::HandleRef) -> Result<RemoteHandle, ClientError> {
    match bridge::lookup(&href.sid) {
        Some(session) => Ok(RemoteHandle::new(session, href.address, Ownership::Borrowed)),
        None => {
            debug!(sid = %href.sid, "client: no active session to decode this handle");
            Err(ClientError::NoBridge(href.sid))
        }
    }
}
