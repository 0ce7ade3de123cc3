use std::{collections::HashMap, sync::Arc};

use rfab_wire::Value;

/// A named, server-side callable — the static-typing-boundary replacement
/// for Python's arbitrary closures (SPEC_FULL.md §1 addendum): a client
/// invokes one of these by name instead of shipping a closure's captured
/// environment across the wire.
pub trait RemoteFn: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<Value, String>;
}

impl<F> RemoteFn for F
where
    F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        self(args)
    }
}

/// The server's `__main__`-module surrogate (spec.md §4.5 shape 1: "resolve
/// in the server's environment mapping"): named constants resolved by
/// `Payload::Lookup`, and named functions resolved by `Payload::Invoke`'s
/// `Value::Str` callable case.
#[derive(Default, Clone)]
pub struct Environment {
    values: HashMap<String, Value>,
    functions: HashMap<String, Arc<dyn RemoteFn>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, f: impl RemoteFn + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn lookup_value(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    pub fn lookup_function(&self, name: &str) -> Option<Arc<dyn RemoteFn>> {
        self.functions.get(name).cloned()
    }
}
