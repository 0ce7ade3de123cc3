//! Test-only helper process for the attached half of the Lifecycle
//! end-to-end scenario (spec.md §8 scenario 6): "a non-persistent,
//! attached slave with no surviving clients exits its loop". Exiting the
//! *host process* is only observable from outside that process, so this
//! binary binds a throwaway server, prints its endpoint, and runs it
//! attached — the test asserts on this process's own exit status rather
//! than anything in-process. Not part of the library's public surface.

use std::io::Write;

use rfab::{Endpoint, Environment, ServerBuilder};

fn main() {
    let endpoint = Endpoint::Tcp(std::net::SocketAddr::from(([127, 0, 0, 1], 0)));
    let mut server = ServerBuilder::new(endpoint)
        .environment(Environment::new())
        .persistent(false)
        .attached(true)
        .build()
        .expect("bind server");

    println!("LISTENING:{}", server.endpoint());
    std::io::stdout().flush().expect("flush stdout");

    // `attached` makes the reception loop call `std::process::exit(0)`
    // itself once the client set empties (server.rs); `run()` otherwise
    // never returns here.
    server.run().expect("reception loop");
}
