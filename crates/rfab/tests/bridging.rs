//! spec.md §8 scenario 5: "Process A = server; B and C are clients of A.
//! B wraps value v. Sending v from B to C directly raises NoBridge. After
//! C opens a session to A, B may send v to C and C.unwrap(v) == A-side v."
//!
//! `C` is spawned as a real child process (`bridge_probe`) so the
//! per-process bridge table genuinely starts empty for it, rather than
//! sharing the one process-wide table every in-process `Session` in this
//! test binary would collide on.

#[path = "support/mod.rs"]
mod support;

use std::process::Command;

use rfab::{Environment, Payload, Value};

fn environment() -> Environment {
    Environment::new().with_function("make_value", |_: Vec<Value>| Ok(Value::Str("A-side v".into())))
}

#[test]
fn c_cannot_decode_until_it_opens_its_own_session() {
    let (_server, endpoint) = support::spawn_server(environment(), true);
    let b = support::dial(&endpoint);

    let v = b.wrap(Payload::Invoke(Value::Str("make_value".into()), vec![])).unwrap();
    let root = rfab::root_of(v.address()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_bridge_probe"))
        .arg(endpoint.to_string())
        .arg(&v.sid().host)
        .arg(v.sid().pid.to_string())
        .arg(root.to_string())
        .output()
        .expect("spawn bridge_probe");

    assert!(
        output.status.success(),
        "bridge_probe failed: stdout={} stderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("NOBRIDGE_OK"), "stdout: {stdout}");
    assert!(stdout.contains("RESULT:Str(\"A-side v\")"), "stdout: {stdout}");

    b.stop().unwrap();
}
