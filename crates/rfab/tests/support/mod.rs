//! Shared test plumbing: real sockets, real threads, no mocked transport
//! (SPEC_FULL.md §2 test tooling).

use std::{net::SocketAddr, thread::JoinHandle, time::Duration};

use rfab::{Endpoint, Environment, Server, ServerBuilder, Session};

pub fn tcp_any() -> Endpoint {
    Endpoint::Tcp(SocketAddr::from(([127, 0, 0, 1], 0)))
}

/// Binds `env` on an ephemeral TCP port, runs the reception loop on a
/// dedicated thread, and returns the thread handle alongside the bound
/// endpoint so callers can dial as many clients as they like.
pub fn spawn_server(env: Environment, persistent: bool) -> (JoinHandle<()>, Endpoint) {
    let mut server: Server =
        ServerBuilder::new(tcp_any()).environment(env).persistent(persistent).build().expect("bind server");
    let endpoint = server.endpoint().clone();
    let handle = std::thread::spawn(move || {
        server.run().expect("reception loop");
    });
    // the listener is already bound by the time `build()` returns, but give
    // the thread a moment to reach `poll()` before the first dial.
    std::thread::sleep(Duration::from_millis(20));
    (handle, endpoint)
}

pub fn dial(endpoint: &Endpoint) -> Session {
    Session::dial(endpoint, Some(Duration::from_secs(5))).expect("dial")
}
