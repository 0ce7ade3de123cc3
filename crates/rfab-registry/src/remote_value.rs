use rfab_wire::Value;

use crate::error::RegistryError;

/// Object-safe stand-in for Python's dynamic `getattr`/`getitem`/`setattr`/
/// `setitem`/`delitem`/`call` interception (spec.md §9 "Handle as a proxy" —
/// "In languages without dynamic attribute interception, expose explicit
/// getAttr, getItem, call, setAttr, setItem, drop, unwrap methods").
///
/// Every registered root value implements this trait; `rfab_registry::Registry`
/// dispatches address resolution and the `call`/`setitem`/`setattr`/`delitem`
/// server-side primitives (spec.md §4.7) against it. Default method bodies
/// reject the operation, matching Python raising `AttributeError`/`TypeError`
/// for an unsupported access.
pub trait RemoteValue: Send + Sync {
    fn get_attr(&self, name: &str) -> Result<Value, RegistryError> {
        Err(RegistryError::BadAddress(format!("no attribute {name}")))
    }

    fn get_item(&self, _key: &Value) -> Result<Value, RegistryError> {
        Err(RegistryError::BadAddress("value is not indexable".into()))
    }

    fn set_attr(&self, name: &str, _value: Value) -> Result<(), RegistryError> {
        Err(RegistryError::BadAddress(format!("cannot set attribute {name}")))
    }

    fn set_item(&self, _key: &Value, _value: Value) -> Result<(), RegistryError> {
        Err(RegistryError::BadAddress("value does not support item assignment".into()))
    }

    fn del_item(&self, _key: &Value) -> Result<(), RegistryError> {
        Err(RegistryError::BadAddress("value does not support item deletion".into()))
    }

    fn call_method(&self, name: &str, _args: Vec<Value>) -> Result<Value, RegistryError> {
        Err(RegistryError::BadAddress(format!("no method {name}")))
    }

    /// Invoked when the *root itself* is called (`h(*args)` with no
    /// attribute in between) — the wrapped value was itself a callable.
    fn invoke(&self, _args: Vec<Value>) -> Result<Value, RegistryError> {
        Err(RegistryError::BadAddress("value is not callable".into()))
    }

    /// `unwrap()`: the value as it would be sent back over the wire.
    fn snapshot(&self) -> Result<Value, RegistryError>;
}
