//! Command-line entry point for a stand-alone slave process (spec.md §6
//! "CLI of the slave binary"): binds a listening socket, resolves a
//! built-in environment, and runs the reception loop in this process.
//!
//! `slave [-s] [-p] [-d] [-a ADDRESS] [-m MODULE]`. Spawning *this*
//! binary as a child of another process (`processing.py::slave`/
//! `server`) is out of scope (SPEC_FULL.md §2 Non-goals); an embedder
//! who spawns it some other way still gets full behaviour by dialing
//! the address it was given.

mod environments;

use clap::Parser;
use rfab::{Endpoint, ServerBuilder};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rfab-slave", about = "Stand-alone remote-execution fabric slave")]
struct Args {
    /// Slave mode: a single client is expected; `-a` defaults from the pid.
    #[arg(short = 's', long)]
    slave: bool,

    /// Persistent: do not exit the reception loop on last disconnect.
    #[arg(short = 'p', long)]
    persistent: bool,

    /// Detached: do not exit the host process when the client set empties.
    #[arg(short = 'd', long)]
    detached: bool,

    /// `host:port` or filesystem path. Required unless `-s` derives a
    /// default of `/tmp/process-<pid>`.
    #[arg(short = 'a', long = "address")]
    address: Option<String>,

    /// Name of a built-in environment (see `environments::NAMES`).
    #[arg(short = 'm', long = "module")]
    module: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let address = args.address.clone().or_else(|| args.slave.then(|| format!("/tmp/process-{}", std::process::id())));
    let Some(address) = address else {
        eprintln!("-a ADDRESS is required unless -s derives one from the pid");
        std::process::exit(2);
    };
    let endpoint = match Endpoint::parse(&address) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("invalid address {address:?}: {err}");
            std::process::exit(2);
        }
    };

    let environment = match args.module.as_deref() {
        None => rfab::Environment::new(),
        Some(name) if environments::looks_like_a_path(name) => {
            eprintln!("-m {name:?} looks like a file path; executing a file as the environment is out of scope");
            std::process::exit(2);
        }
        Some(name) => match environments::resolve(name) {
            Some(environment) => environment,
            None => {
                eprintln!("no built-in environment named {name:?}; known names: {:?}", environments::NAMES);
                std::process::exit(2);
            }
        },
    };

    detach_from_parent_signal_group();

    let mut server = match ServerBuilder::new(endpoint)
        .environment(environment)
        .persistent(args.persistent)
        .attached(!args.detached)
        .build()
    {
        Ok(server) => server,
        Err(err) => {
            eprintln!("failed to bind {address:?}: {err}");
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("rfab-slave: received Ctrl+C, shutting down");
        shutdown.trigger();
    }) {
        warn!(?err, "rfab-slave: failed to install Ctrl+C handler, SIGINT will terminate abruptly");
    }

    info!(endpoint = %server.endpoint(), persistent = args.persistent, detached = args.detached, "rfab-slave: listening");
    if let Err(err) = server.run() {
        warn!(?err, "rfab-slave: reception loop exited with an error");
        std::process::exit(1);
    }
}

/// "becomes independent of the signals sent to the parent process"
/// (spec.md §6 "On start-up the slave detaches from the parent signal
/// group where permitted"): leaves the parent's session so a SIGINT/
/// SIGHUP delivered to a controlling terminal doesn't reach this process.
fn detach_from_parent_signal_group() {
    // SAFETY: setsid() has no preconditions beyond "not already a session
    // leader", which holds for a freshly exec'd process.
    let result = unsafe { libc::setsid() };
    if result == -1 {
        warn!("rfab-slave: setsid() failed; staying in the parent's session");
    }
}
