//! Worker execution (C5, spec.md §4.5): resolves one of the three payload
//! shapes and runs it, capturing any panic the same way `host.py::_task`
//! captures a Python exception via `traceback.format_exc()`.

use std::panic::{AssertUnwindSafe, catch_unwind};

use rfab_registry::Registry;
use rfab_wire::{Payload, Value, codec};

use crate::environment::Environment;

/// The outcome of running one BLOCK/THREAD/WRAP payload: either a result
/// value, or an error value paired with a human-readable traceback string
/// (spec.md §4.5's `(error, result, traceback)` triple, minus `result`
/// which is `None` on the error branch and vice versa).
pub enum Outcome {
    Ok(Value),
    Err { error: Value, traceback: String },
}

pub fn run(payload: &Payload, env: &Environment, registry: &Registry) -> Outcome {
    match catch_unwind(AssertUnwindSafe(|| resolve(payload, env, registry))) {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err((error, traceback))) => Outcome::Err { error, traceback },
        Err(panic) => {
            let message = panic_message(&panic);
            Outcome::Err { error: Value::Str(message.clone()), traceback: message }
        }
    }
}

fn resolve(payload: &Payload, env: &Environment, registry: &Registry) -> Result<Value, (Value, String)> {
    match payload {
        Payload::Lookup(name) => env
            .lookup_value(name)
            .or_else(|| env.lookup_function(name).map(|_| Value::Str(name.clone())))
            .ok_or_else(|| failure(format!("no such name {name:?} in the server environment"))),
        Payload::Invoke(callable, args) => invoke(callable, args.clone(), env, registry),
        Payload::Encoded(bytes) => {
            let (callable, args): (Value, Vec<Value>) =
                codec::decode(bytes).map_err(|err| failure(format!("bad encoded payload: {err}")))?;
            invoke(&callable, args, env, registry)
        }
    }
}

fn invoke(
    callable: &Value,
    args: Vec<Value>,
    env: &Environment,
    registry: &Registry,
) -> Result<Value, (Value, String)> {
    match callable {
        Value::Str(name) if is_builtin(name) => builtin::call(name, args, registry),
        Value::Str(name) => {
            let f = env
                .lookup_function(name)
                .ok_or_else(|| failure(format!("no such function {name:?} in the server environment")))?;
            f.call(args).map_err(failure)
        }
        Value::Handle(handle) => {
            registry.call(&handle.address, args).map_err(|err| failure(err.to_string()))
        }
        other => Err(failure(format!("{other:?} is not callable"))),
    }
}

/// Names reserved for [`builtin::call`], shadowing any user-registered
/// [`Environment`] function of the same name (spec.md §4.7's mutation
/// primitives and §9's `unwrap` are part of this fabric's surface, not a
/// particular environment's).
fn is_builtin(name: &str) -> bool {
    matches!(name, "setitem" | "delitem" | "setattr" | "unwrap")
}

/// The handle-mutation and dereference primitives `RemoteHandle` drives
/// over the wire (spec.md §4.7 "expose explicit... setAttr, setItem, drop,
/// unwrap methods"): plain functions named like any other, resolved here
/// instead of threading a fifth `Opcode` through the reception loop for
/// operations that are just `BLOCK` calls against a well-known name.
mod builtin {
    use rfab_registry::Registry;
    use rfab_wire::Value;

    use super::failure;

    pub(super) fn call(name: &str, mut args: Vec<Value>, registry: &Registry) -> Result<Value, (Value, String)> {
        let handle = take_handle(&mut args, name)?;
        match name {
            "setitem" => {
                let (key, value) = two_args(args, name)?;
                registry.set_item(&handle.address, key, value).map(|()| Value::Null).map_err(|e| failure(e.to_string()))
            }
            "delitem" => {
                let key = one_arg(args, name)?;
                registry.del_item(&handle.address, key).map(|()| Value::Null).map_err(|e| failure(e.to_string()))
            }
            "setattr" => {
                let (attr, value) = two_args(args, name)?;
                let Value::Str(attr) = attr else {
                    return Err(failure("setattr's attribute name must be a string".into()));
                };
                registry.set_attr(&handle.address, attr, value).map(|()| Value::Null).map_err(|e| failure(e.to_string()))
            }
            "unwrap" => {
                if !args.is_empty() {
                    return Err(failure("unwrap takes no arguments beyond the handle".into()));
                }
                registry.dereference(&handle.address).map_err(|e| failure(e.to_string()))
            }
            _ => unreachable!("is_builtin gates this match"),
        }
    }

    fn take_handle(args: &mut Vec<Value>, name: &str) -> Result<rfab_wire::HandleRef, (Value, String)> {
        if args.is_empty() {
            return Err(failure(format!("{name} requires a handle as its first argument")));
        }
        match args.remove(0) {
            Value::Handle(handle) => Ok(handle),
            other => Err(failure(format!("{name}'s first argument must be a handle, got {other:?}"))),
        }
    }

    fn one_arg(mut args: Vec<Value>, name: &str) -> Result<Value, (Value, String)> {
        if args.len() != 1 {
            return Err(failure(format!("{name} takes exactly one argument after the handle")));
        }
        Ok(args.remove(0))
    }

    fn two_args(mut args: Vec<Value>, name: &str) -> Result<(Value, Value), (Value, String)> {
        if args.len() != 2 {
            return Err(failure(format!("{name} takes exactly two arguments after the handle")));
        }
        let second = args.remove(1);
        let first = args.remove(0);
        Ok((first, second))
    }
}

fn failure(message: String) -> (Value, String) {
    (Value::Str(message.clone()), message)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
