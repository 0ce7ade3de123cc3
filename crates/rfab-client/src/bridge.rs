//! Process-wide table of active sessions, keyed by the owning slave's
//! `Sid` (spec.md §4.7 "cross-process relay": "if the decoding process
//! has an active session to sid, a borrowed handle bound to that session
//! is produced"). Grounded on
//! `processional/processing.py::SlaveProcess.instances`, a module-level
//! `WeakValueDictionary` every session registers itself into on
//! construction; the Rust analogue is a `Mutex`-guarded map of
//! [`WeakSession`](crate::session::WeakSession) behind a lazily
//! initialised static, the same pattern the teacher uses for its
//! process-wide clock (`flux-timing::global_clock`).

use std::{collections::HashMap, sync::Mutex};

use once_cell::sync::Lazy;
use rfab_wire::Sid;

use crate::session::{Session, WeakSession};

static SESSIONS: Lazy<Mutex<HashMap<Sid, WeakSession>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn register(sid: Sid, session: WeakSession) {
    SESSIONS.lock().unwrap().insert(sid, session);
}

/// Looks up a live session to `sid`, pruning it from the table if its
/// last strong reference has already gone away.
pub(crate) fn lookup(sid: &Sid) -> Option<Session> {
    let mut table = SESSIONS.lock().unwrap();
    match table.get(sid).and_then(WeakSession::upgrade) {
        Some(session) => Some(session),
        None => {
            table.remove(sid);
            None
        }
    }
}
