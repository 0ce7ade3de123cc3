//! Facade crate tying the wire, registry, server, and client crates
//! together, in the re-export style of the teacher's own top-level facade
//! crate: most users only ever need `use rfab::*;`.
//!
//! `slave()`/`server()` in `processional/processing.py` spawn a child
//! interpreter; that glue is explicitly out of scope here (spec.md §1), so
//! this crate exposes [`client`] (dial an already-running server) and
//! [`localserver`] (run the reception loop on a dedicated thread in the
//! current process, recovered from `processing.py::localserver` per
//! SPEC_FULL.md §10) instead. An embedder who does spawn its own child
//! process still gets the full experience by dialing the socket it
//! created and optionally supplying the child's pid via
//! [`rfab_client::Session::dial_with_pid`].

use std::{thread::JoinHandle, time::Duration};

pub use rfab_client::{
    ClientError, Endpoint, OrphanSink, Ownership, Payload, RemoteHandle, Session, Sid, Step, Task,
    TracingOrphanSink, Value, WeakSession, decode_handle,
};
pub use rfab_registry::{ClientRefs, DynValue, Registry, RegistryError, RemoteValue};
pub use rfab_server::{Environment, RemoteFn, Server, ServerBuilder, ServerError, ShutdownHandle};
pub use rfab_wire::{HandleRef, Opcode, Request, RequestBody, Reply, RootId, root_address, root_of};

/// Dials an already-listening server (`processing.py::client`).
pub fn client(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Session, ClientError> {
    Session::dial(endpoint, timeout)
}

/// Runs a server's reception loop on a dedicated thread inside the
/// current process, then dials it (`processing.py::localserver`,
/// SPEC_FULL.md §10): useful for handing another process this one's own
/// address to connect back to, and for tests that want a real socket
/// without a real second process.
pub fn localserver(builder: ServerBuilder) -> Result<(JoinHandle<()>, Session), LocalServerError> {
    let mut server = builder.build().map_err(LocalServerError::Server)?;
    let endpoint = server.endpoint().clone();
    let handle = std::thread::spawn(move || {
        if let Err(err) = server.run() {
            tracing::warn!(?err, "localserver: reception loop exited with an error");
        }
    });
    match Session::dial(&endpoint, Some(Duration::from_secs(5))) {
        Ok(session) => Ok((handle, session)),
        Err(err) => Err(LocalServerError::Client(err)),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LocalServerError {
    #[error("failed to start the local server: {0}")]
    Server(ServerError),
    #[error("failed to connect to the local server: {0}")]
    Client(ClientError),
}
