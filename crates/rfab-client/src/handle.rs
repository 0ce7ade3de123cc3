//! Remote handle (C7, spec.md §4.7), grounded on
//! `processional/processing.py::RemoteObject`/`WrappedObject`. Rust has no
//! dynamic `__getattr__`/`__getitem__` interception, so per spec.md §9's
//! own design note ("expose explicit getAttr, getItem, call, setAttr,
//! setItem, drop, unwrap methods") this is a plain struct with named
//! methods instead of a transparent proxy.

use rfab_wire::{Address, HandleRef, Payload, Sid, Step, Value, root_of};

use crate::{error::ClientError, session::Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// A `DROP` for `address[0]` must be enqueued on destruction (spec.md
    /// §3: "owned implies that a DROP... must be enqueued").
    Owned,
    /// No lifecycle action on destruction — this handle shares its
    /// root's lifetime through whichever owned handle produced it.
    Borrowed,
}

/// A client-side reference to a value living in a server process (spec.md
/// §3 "Remote handle", §4.7). Attribute/item extension is purely local
/// bookkeeping; only `call`/mutation/`unwrap`/destruction talk to the
/// wire.
pub struct RemoteHandle {
    session: Session,
    address: Address,
    ownership: Ownership,
}

impl RemoteHandle {
    pub(crate) fn new(session: Session, address: Address, ownership: Ownership) -> Self {
        Self { session, address, ownership }
    }

    pub fn sid(&self) -> &Sid {
        self.session.sid()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// `h.<name>`: extends the address by one `ATTR` step (spec.md §4.7).
    /// Ownership is always borrowed — no lifecycle action of its own.
    pub fn attr(&self, name: impl Into<String>) -> RemoteHandle {
        let mut address = self.address.clone();
        address.push(Step::Attr(name.into()));
        RemoteHandle::new(self.session.clone(), address, Ownership::Borrowed)
    }

    /// `h[key]`: extends the address by one `ITEM` step (spec.md §4.7).
    pub fn item(&self, key: impl Into<Value>) -> RemoteHandle {
        let mut address = self.address.clone();
        address.push(Step::Item(key.into()));
        RemoteHandle::new(self.session.clone(), address, Ownership::Borrowed)
    }

    /// `h(*args)`: invokes the referenced value, or the method named by
    /// this handle's trailing `ATTR` step if it has one (spec.md §4.7,
    /// resolved server-side by `rfab_registry::Registry::call`).
    pub fn call(&self, args: Vec<Value>) -> Result<Value, ClientError> {
        self.session.invoke(Payload::Invoke(self.as_value(), args))
    }

    /// `h[k] = v` (spec.md §4.7): a two-argument mutation primitive,
    /// grounded on `processing.py`'s `(setitem, self, key, value)`
    /// tuple — here, a named built-in resolved server-side
    /// (`rfab_server::worker`) instead of `operator.setitem` itself.
    pub fn set_item(&self, key: Value, value: Value) -> Result<(), ClientError> {
        self.session
            .invoke(Payload::Invoke(Value::Str("setitem".into()), vec![self.as_value(), key, value]))
            .map(drop)
    }

    /// `del h[k]` (spec.md §4.7).
    pub fn del_item(&self, key: Value) -> Result<(), ClientError> {
        self.session
            .invoke(Payload::Invoke(Value::Str("delitem".into()), vec![self.as_value(), key]))
            .map(drop)
    }

    /// `h.a = v` (spec.md §4.7).
    pub fn set_attr(&self, name: impl Into<String>, value: Value) -> Result<(), ClientError> {
        self.session
            .invoke(Payload::Invoke(
                Value::Str("setattr".into()),
                vec![self.as_value(), Value::Str(name.into()), value],
            ))
            .map(drop)
    }

    /// `h.unwrap()` (spec.md §4.7): dereferences the full address and
    /// returns the value, provided it is encodable.
    pub fn unwrap(&self) -> Result<Value, ClientError> {
        self.session.invoke(Payload::Invoke(Value::Str("unwrap".into()), vec![self.as_value()]))
    }

    /// Ensures this process owns a reference to the root, promoting a
    /// borrowed handle (spec.md §4.3 `own`, `processing.py::WrappedObject.own`).
    /// Idempotent to call more than once; each call does increment the
    /// server's refcount, matching the fire-and-forget `OWN` contract
    /// (spec.md §9) rather than tracking "already owned" locally.
    pub fn own(&mut self) -> Result<(), ClientError> {
        if let Some(root) = root_of(&self.address) {
            self.session.own(root)?;
            self.ownership = Ownership::Owned;
        }
        Ok(())
    }

    fn as_value(&self) -> Value {
        Value::Handle(HandleRef { sid: self.session.sid().clone(), address: self.address.clone() })
    }
}

impl Drop for RemoteHandle {
    /// If owned, enqueues `DROP` for the root; transport errors are
    /// ignored — the server may already be gone (spec.md §4.7).
    fn drop(&mut self) {
        if self.ownership != Ownership::Owned {
            return;
        }
        if let Some(root) = root_of(&self.address) {
            let _ = self.session.drop_ref(root);
        }
    }
}

/// Decodes a `(sid, address)` handle reference off the wire (spec.md
/// §4.7): succeeds with a borrowed handle if this process has an active
/// session to `sid`, fails with `NoBridge` otherwise. The "current
/// process *is* `sid`" branch is handled on the server side, where a
/// `Value::Handle` argument is dereferenced directly against the local
/// `rfab_registry::Registry` without ever reaching this crate.
pub fn decode(href: HandleRef) -> Result<RemoteHandle, ClientError> {
    crate::session::resolve_bridge(href)
}
