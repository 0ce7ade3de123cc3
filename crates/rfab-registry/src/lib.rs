//! Process-wide handle registry (C3, spec.md §4.3): a table of wrapped
//! values keyed by freshly allocated root ids, with per-value global
//! refcount and per-client refcount tracking, grounded on
//! `host.py`'s `wrapped`/`Client`/`Wrapped` dataclasses.

mod client_refs;
mod dyn_value;
mod error;
mod remote_value;
mod registry;

pub use client_refs::ClientRefs;
pub use dyn_value::DynValue;
pub use error::RegistryError;
pub use remote_value::RemoteValue;
pub use registry::Registry;

#[cfg(test)]
mod tests {
    use rfab_wire::{Step, Value, root_address};

    use super::*;

    #[test]
    fn register_own_drop_removes_entry_at_zero() {
        let registry = Registry::new();
        let root = registry.register(Box::new(DynValue::new(Value::Int(42))));
        let mut client = ClientRefs::new();
        registry.own(&mut client, root);
        assert_eq!(registry.dereference(&root_address(root)).unwrap(), Value::Int(42));
        registry.drop_ref(&mut client, root);
        assert!(matches!(
            registry.dereference(&root_address(root)).unwrap_err(),
            RegistryError::DanglingReference(r) if r == root
        ));
    }

    #[test]
    fn disconnect_releases_every_reference_a_client_held() {
        let registry = Registry::new();
        let root = registry.register(Box::new(DynValue::new(Value::Bool(true))));
        let mut client = ClientRefs::new();
        registry.own(&mut client, root);
        registry.own(&mut client, root);
        registry.disconnect(client);
        assert!(registry.dereference(&root_address(root)).is_err());
    }

    #[test]
    fn list_append_then_unwrap_observes_the_mutation() {
        let registry = Registry::new();
        let root = registry.register(Box::new(DynValue::new(Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ]))));
        let mut address = root_address(root);
        address.push(Step::Attr("append".into()));
        registry.call(&address, vec![Value::Int(5)]).unwrap();
        let unwrapped = registry.dereference(&root_address(root)).unwrap();
        assert_eq!(
            unwrapped,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(5)])
        );
    }

    #[test]
    fn item_step_indexes_into_a_list() {
        let registry = Registry::new();
        let root = registry.register(Box::new(DynValue::new(Value::List(vec![
            Value::Str("a".into()),
            Value::Str("b".into()),
        ]))));
        let mut address = root_address(root);
        address.push(Step::Item(Value::Int(1)));
        assert_eq!(registry.dereference(&address).unwrap(), Value::Str("b".into()));
    }
}
