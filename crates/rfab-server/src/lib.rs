//! Server-side half of the remote-execution fabric: the multiplexed
//! reception loop (C4), worker execution (C5), and the server's named
//! environment of callables.

mod bridge;
mod environment;
mod error;
mod server;
mod worker;

pub use environment::{Environment, RemoteFn};
pub use error::ServerError;
pub use server::{Server, ServerBuilder, ShutdownHandle};
