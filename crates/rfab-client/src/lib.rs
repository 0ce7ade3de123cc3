//! Client-side half of the remote-execution fabric (C6 client session,
//! C7 remote handle). The server-side reception loop and worker pool
//! live in `rfab-server`; the wire codec and framing live in `rfab-wire`.

mod bridge;
mod error;
mod handle;
mod orphan;
mod pending;
mod session;

pub use error::ClientError;
pub use handle::{Ownership, RemoteHandle, decode as decode_handle};
pub use orphan::{OrphanSink, TracingOrphanSink};
pub use session::{Session, Task, WeakSession};

pub use rfab_wire::{Endpoint, Opcode, Payload, Sid, Step, Value};
