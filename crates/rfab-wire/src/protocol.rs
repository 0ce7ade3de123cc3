use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The eight request opcodes (spec.md §4.4, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Close = 0,
    Block = 1,
    Thread = 2,
    Wrap = 3,
    Drop = 4,
    Own = 5,
    Persist = 6,
    Detach = 7,
}

/// The three payload shapes accepted by BLOCK/THREAD/WRAP (spec.md §4.5).
///
/// Rust has no equivalent of shipping a closure's captured environment as
/// data (SPEC_FULL.md §1 addendum), so the "callable" carried by `Invoke`
/// and pre-encoded by `Encoded` is a name or a remote handle rather than a
/// serialised closure — the three-shape taxonomy itself is unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Shape 1: resolve `name` in the server's environment map.
    Lookup(String),
    /// Shape 2: `callable(arg1, ..., argN)`. `callable` is a `Value` so it
    /// may itself be a name (`Value::Str`) or a remote handle
    /// (`Value::Handle`) dereferencing to a server-side callable.
    Invoke(Value, Vec<Value>),
    /// Shape 3: opaque pre-encoded bytes, decoded server-side via the same
    /// codec boundary into an `Invoke` payload (a zero-arg convention: the
    /// encoded bytes already carry their own arguments).
    Encoded(Vec<u8>),
}

/// Body of a DROP/OWN request: the root id to adjust (spec.md §4.4).
pub type RootId = u64;

/// Request frame payload: `(task_id, opcode, body)` (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub task_id: u64,
    pub op: Opcode,
    pub body: RequestBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RequestBody {
    /// CLOSE/PERSIST/DETACH: ignored.
    None,
    /// DROP/OWN: the affected root id.
    Root(RootId),
    /// BLOCK/THREAD/WRAP: one of the three payload shapes.
    Call(Payload),
}

/// Reply frame payload: `(task_id, error?, result?, traceback?)`
/// (spec.md §6). Exactly one of `error`/`result` is populated for a
/// completed task; both are `None` for the CLOSE acknowledgement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reply {
    pub task_id: u64,
    pub error: Option<Value>,
    pub result: Option<Value>,
    pub traceback: Option<String>,
}

impl Reply {
    pub fn ok(task_id: u64, result: Value) -> Self {
        Self { task_id, error: None, result: Some(result), traceback: None }
    }

    pub fn err(task_id: u64, error: Value, traceback: String) -> Self {
        Self { task_id, error: Some(error), result: None, traceback: Some(traceback) }
    }

    pub fn close(task_id: u64) -> Self {
        Self { task_id, error: None, result: None, traceback: None }
    }
}
