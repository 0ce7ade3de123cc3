//! Test-only helper process for the Bridging end-to-end scenario (spec.md
//! §8 scenario 5): acting as client C, in a genuinely separate OS process
//! from the test binary (which plays A and B), so the per-process bridge
//! table (spec.md §4.7 "the decoding process has an active session")
//! actually means something. Not part of the library's public surface.
//!
//! Usage: `bridge_probe <endpoint> <sid-host> <sid-pid> <root-id>`. Prints
//! one line per step to stdout and exits non-zero on any unexpected
//! outcome.

use rfab::{Endpoint, HandleRef, Sid, decode_handle, root_address};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [endpoint, host, pid, root] = args.as_slice() else {
        eprintln!("usage: bridge_probe <endpoint> <sid-host> <sid-pid> <root-id>");
        std::process::exit(2);
    };
    let endpoint = Endpoint::parse(endpoint).expect("valid endpoint");
    let sid = Sid { host: host.clone(), pid: pid.parse().expect("numeric pid") };
    let root: u64 = root.parse().expect("numeric root id");
    let href = HandleRef { sid: sid.clone(), address: root_address(root) };

    match decode_handle(href.clone()) {
        Err(rfab::ClientError::NoBridge(_)) => println!("NOBRIDGE_OK"),
        other => {
            eprintln!("expected NoBridge before connecting, got {other:?}");
            std::process::exit(1);
        }
    }

    let _session = rfab::client(&endpoint, None).expect("dial the server");

    let borrowed = decode_handle(href).expect("bridge should now resolve");
    match borrowed.unwrap() {
        Ok(value) => println!("RESULT:{value:?}"),
        Err(err) => {
            eprintln!("unwrap failed after bridging: {err}");
            std::process::exit(1);
        }
    }
}
