//! Wire framing, codec boundary and shared protocol types for the rfab
//! remote-execution fabric: C1 (`blocking`, `reactor`) and C2 (`codec`),
//! plus the data model pieces (`value`, `sid`) and request/reply shapes
//! (`protocol`) every other crate in the workspace builds on.

pub mod blocking;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod reactor;
pub mod sid;
pub mod value;

pub use endpoint::Endpoint;
pub use error::WireError;
pub use protocol::{Opcode, Payload, Reply, Request, RequestBody, RootId};
pub use sid::Sid;
pub use value::{Address, HandleRef, Step, Value, root_address, root_of};
