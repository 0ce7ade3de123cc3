use std::{collections::HashMap, sync::Mutex};

use rfab_wire::{Address, RootId, Step, Value, root_of};
use tracing::debug;

use crate::{client_refs::ClientRefs, dyn_value::index_value, error::RegistryError, remote_value::RemoteValue};

struct Entry {
    value: Box<dyn RemoteValue>,
    refcount: u64,
}

/// The process-wide handle registry (C3, spec.md §4.3): a single
/// `Mutex`-guarded table, matching the teacher's own advice
/// ("Process-wide handle registry — replace with a single owned container
/// inside the server object", spec.md §9) rather than the module-level
/// Python dict `host.py::wrapped` it is grounded on.
///
/// **Identity narrowing (DESIGN.md Open Question 4).** `register` always
/// allocates a fresh root id — Rust's owned execution results have no
/// `id(obj)` equivalent without threading `Rc`/`Arc` through `Value`, so
/// this never deduplicates two registrations of "the same" value the way
/// `host.py::_wrap` does by keying on `id(obj)`. Existence-iff-refcount and
/// last-drop-removes still hold exactly.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_root: RootId,
    table: HashMap<RootId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly produced value, returning its root id with
    /// refcount 0 (spec.md §4.3: "creating an entry with refcount 0 if
    /// absent"). The caller is expected to immediately `own` it for the
    /// requesting client — `WRAP`'s "client is auto-OWNed" (spec.md §4.4).
    pub fn register(&self, value: Box<dyn RemoteValue>) -> RootId {
        let mut inner = self.inner.lock().unwrap();
        let root = inner.next_root;
        inner.next_root += 1;
        inner.table.insert(root, Entry { value, refcount: 0 });
        root
    }

    pub fn own(&self, client: &mut ClientRefs, root: RootId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.table.get_mut(&root) {
            entry.refcount += 1;
            client.incr(root);
        }
    }

    pub fn drop_ref(&self, client: &mut ClientRefs, root: RootId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.table.get_mut(&root) {
            entry.refcount = entry.refcount.saturating_sub(1);
            client.decr(root);
            if entry.refcount == 0 {
                inner.table.remove(&root);
                debug!(root, "registry: last reference dropped, entry removed");
            }
        }
    }

    /// Releases every reference a disconnecting client held (spec.md §4.4
    /// "On client readability... On read failure... remove the Client and
    /// decrement its refcounts").
    pub fn disconnect(&self, client: ClientRefs) {
        let mut inner = self.inner.lock().unwrap();
        for (root, count) in client.drain() {
            if let Some(entry) = inner.table.get_mut(&root) {
                entry.refcount = entry.refcount.saturating_sub(count);
                if entry.refcount == 0 {
                    inner.table.remove(&root);
                }
            }
        }
    }

    fn with_entry<T>(
        &self,
        root: RootId,
        f: impl FnOnce(&Entry) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.table.get(&root).ok_or(RegistryError::DanglingReference(root))?;
        f(entry)
    }

    /// Resolves a full address to its value (spec.md §4.3 `dereference`):
    /// the root's `snapshot`, then each further step applied generically
    /// against the resulting `Value` (container indexing only — see the
    /// module doc comment on attribute-chain narrowing).
    pub fn dereference(&self, address: &Address) -> Result<Value, RegistryError> {
        let root = root_of(address)
            .ok_or_else(|| RegistryError::BadAddress("address must start with a root item".into()))?;
        let mut current = self.with_entry(root, |e| e.value.snapshot())?;
        for step in &address[1..] {
            current = match step {
                Step::Item(key) => index_value(&current, key)?,
                Step::Attr(name) => {
                    return Err(RegistryError::BadAddress(format!(
                        "value has no attribute {name} (attribute chains beyond the \
                         registered root are not supported; expose a method via \
                         RemoteValue::call_method instead)"
                    )));
                }
            };
        }
        Ok(current)
    }

    /// Server-side `call(address, args)` primitive (spec.md §4.7): calling
    /// the root directly, or a named method one `Attr` step below it.
    pub fn call(&self, address: &Address, args: Vec<Value>) -> Result<Value, RegistryError> {
        let root = root_of(address)
            .ok_or_else(|| RegistryError::BadAddress("address must start with a root item".into()))?;
        match address.len() {
            1 => self.with_entry(root, |e| e.value.invoke(args)),
            2 => match &address[1] {
                Step::Attr(name) => self.with_entry(root, |e| e.value.call_method(name, args)),
                Step::Item(_) => Err(RegistryError::BadAddress("cannot call an item reference".into())),
            },
            _ => Err(RegistryError::BadAddress(
                "calling beyond one method step below the root is not supported".into(),
            )),
        }
    }

    pub fn set_item(&self, address: &Address, key: Value, value: Value) -> Result<(), RegistryError> {
        let root = self.root_only(address)?;
        self.with_entry(root, |e| e.value.set_item(&key, value))
    }

    pub fn del_item(&self, address: &Address, key: Value) -> Result<(), RegistryError> {
        let root = self.root_only(address)?;
        self.with_entry(root, |e| e.value.del_item(&key))
    }

    pub fn set_attr(&self, address: &Address, name: String, value: Value) -> Result<(), RegistryError> {
        let root = self.root_only(address)?;
        self.with_entry(root, |e| e.value.set_attr(&name, value))
    }

    fn root_only(&self, address: &Address) -> Result<RootId, RegistryError> {
        if address.len() != 1 {
            return Err(RegistryError::BadAddress(
                "in-place mutation beyond the registered root is not supported".into(),
            ));
        }
        root_of(address).ok_or_else(|| RegistryError::BadAddress("address must start with a root item".into()))
    }
}
