//! The `__connect__` built-in (SPEC_FULL.md §10, recovered from
//! `processional/processing.py::SlaveProcess.connect`: "simply a shorthand
//! to `self.wrap(partial(client, process.address))`"). Executed as an
//! ordinary `WRAP` payload, it dials `endpoint` *from this server
//! process* and registers the resulting [`rfab_client::Session`] as a
//! root, so the caller gets back a handle that lives here and proxies
//! onward to a second slave — the mechanism a master uses to reach a
//! slave it has no direct connection to.

use rfab_registry::RegistryError;
use rfab_wire::{Payload, Value};

pub const NAME: &str = "__connect__";

pub fn matches(payload: &Payload) -> bool {
    matches!(payload, Payload::Invoke(Value::Str(name), _) if name == NAME)
}

pub fn run(payload: &Payload) -> Result<BridgeValue, (Value, String)> {
    let Payload::Invoke(_, args) = payload else { unreachable!("matches() already checked the shape") };
    let [Value::Str(endpoint)] = args.as_slice() else {
        return Err(failure("__connect__ takes exactly one string endpoint argument"));
    };
    let endpoint = rfab_wire::Endpoint::parse(endpoint)
        .map_err(|err| failure(format!("bad endpoint {endpoint:?}: {err}")))?;
    let session = rfab_client::Session::dial(&endpoint, None).map_err(|err| failure(err.to_string()))?;
    Ok(BridgeValue(session))
}

fn failure(message: String) -> (Value, String) {
    (Value::Str(message.clone()), message)
}

/// A registered root whose live value is a session to another slave
/// rather than an ordinary [`Value`] (spec.md §4.3's registry stores any
/// `RemoteValue`, not just the built-in container kinds).
pub struct BridgeValue(rfab_client::Session);

impl rfab_registry::RemoteValue for BridgeValue {
    fn get_attr(&self, name: &str) -> Result<Value, RegistryError> {
        match name {
            "sid" => Ok(Value::Str(self.0.sid().to_string())),
            other => Err(RegistryError::BadAddress(format!("no attribute {other} on a bridged session"))),
        }
    }

    /// `bridged.invoke(callable, args...)`: forwards to the second
    /// slave's `BLOCK`, mirroring `SlaveProcess.invoke` (the `RemoteObject`
    /// proxy in `processing.py` forwards every method call the same way).
    fn call_method(&self, name: &str, mut args: Vec<Value>) -> Result<Value, RegistryError> {
        match name {
            "invoke" if !args.is_empty() => {
                let callable = args.remove(0);
                self.0.invoke(Payload::Invoke(callable, args)).map_err(|err| RegistryError::BadAddress(err.to_string()))
            }
            other => Err(RegistryError::BadAddress(format!("no method {other} on a bridged session"))),
        }
    }

    fn snapshot(&self) -> Result<Value, RegistryError> {
        Err(RegistryError::BadAddress("a bridged session has no encodable snapshot; call unwrap on a value it owns instead".into()))
    }
}
