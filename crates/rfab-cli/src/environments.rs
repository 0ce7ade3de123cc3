//! Compiled-in example environments selectable with `-m NAME` (spec.md
//! §6 "identifier of a module to import as the environment"). `-m PATH`
//! ("path to a file to execute as the environment") is out of scope
//! (SPEC_FULL.md §2 Non-goals: no embedded scripting engine); this module
//! is the entire substitute, so `-m` only ever resolves against names
//! compiled in here.

use std::sync::atomic::{AtomicI64, Ordering};

use rfab::{Environment, Value};

pub const NAMES: &[&str] = &["echo", "counter"];

/// A conservative guess at "this looks like a file, not a module name",
/// used only to produce a clearer error than "unknown module".
pub fn looks_like_a_path(name: &str) -> bool {
    name.contains('/') || name.contains('\\') || name.contains('.')
}

pub fn resolve(name: &str) -> Option<Environment> {
    match name {
        "echo" => Some(echo()),
        "counter" => Some(counter()),
        _ => None,
    }
}

/// Returns whichever single argument it was called with, unchanged.
fn echo() -> Environment {
    Environment::new().with_function("echo", |mut args: Vec<Value>| Ok(args.pop().unwrap_or(Value::Null)))
}

/// Hands out a strictly increasing integer on every call, starting at 0.
fn counter() -> Environment {
    static NEXT: AtomicI64 = AtomicI64::new(0);
    Environment::new().with_function("next", |_: Vec<Value>| Ok(Value::Int(NEXT.fetch_add(1, Ordering::SeqCst))))
}
