//! spec.md §8 scenario 6: "A non-persistent, attached slave with no
//! surviving clients exits its loop; a persistent one does not; a
//! detached slave whose master disappears but which still has live
//! THREAD work keeps running until the work completes."

#[path = "support/mod.rs"]
mod support;

use std::{
    io::{BufRead, BufReader},
    process::{Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use rfab::{Endpoint, Environment, Payload, Value};

fn environment() -> Environment {
    Environment::new().with_function("noop", |_: Vec<Value>| Ok(Value::Bool(true)))
}

/// Blocks up to `timeout` for a `JoinHandle` to finish, without consuming
/// it on timeout (join handles aren't `Clone`, so failure to finish in
/// time is reported by the caller, not by this helper retrying).
fn join_within(handle: JoinHandle<()>, timeout: Duration) -> Result<(), JoinHandle<()>> {
    let (tx, rx) = mpsc::channel();
    let waiter = std::thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(panic)) => std::panic::resume_unwind(panic),
        Err(mpsc::RecvTimeoutError::Timeout) | Err(mpsc::RecvTimeoutError::Disconnected) => {
            // the reception loop is still running (or the waiter thread
            // hasn't reported back yet); leak the waiter rather than block
            // the test forever joining it.
            std::mem::forget(waiter);
            Err(std::thread::spawn(|| {}))
        }
    }
}

#[test]
fn non_persistent_slave_returns_once_its_clients_empty() {
    let (handle, endpoint) = support::spawn_server(environment(), false);
    let client = support::dial(&endpoint);
    drop(client);

    assert!(join_within(handle, Duration::from_secs(2)).is_ok(), "non-persistent loop should have returned");
}

#[test]
fn persistent_slave_outlives_its_last_client_until_closed() {
    let (handle, endpoint) = support::spawn_server(environment(), true);
    let client = support::dial(&endpoint);
    drop(client);

    // give the reception loop a round to notice the empty client set
    std::thread::sleep(Duration::from_millis(100));
    if join_within(handle, Duration::from_millis(200)).is_ok() {
        panic!("a persistent server must not exit its loop with no clients");
    }

    // the real handle is stuck inside `join_within`'s waiter thread after a
    // timeout; explicit CLOSE is the only way left to stop it.
    let closer = support::dial(&endpoint);
    closer.stop().expect("close a persistent server explicitly");
}

#[test]
fn detached_slave_keeps_live_thread_work_running_after_its_master_disappears() {
    static DONE: AtomicBool = AtomicBool::new(false);

    fn environment_with_slow_mark() -> Environment {
        Environment::new().with_function("slow_mark", |_: Vec<Value>| {
            std::thread::sleep(Duration::from_millis(250));
            DONE.store(true, Ordering::SeqCst);
            Ok(Value::Bool(true))
        })
    }

    let (handle, endpoint) = support::spawn_server(environment_with_slow_mark(), false);
    let client = support::dial(&endpoint);
    let _task = client.thread(Payload::Invoke(Value::Str("slow_mark".into()), vec![])).expect("dispatch THREAD work");
    drop(client);

    // the reception loop itself returns as soon as the client set empties
    // (non-persistent, non-attached); the THREAD worker is a detached OS
    // thread the loop never joins, so it keeps running independently.
    assert!(join_within(handle, Duration::from_secs(2)).is_ok(), "reception loop should have returned");
    assert!(!DONE.load(Ordering::SeqCst), "the worker should still be mid-sleep right after the loop exits");

    let deadline = Instant::now() + Duration::from_secs(2);
    while !DONE.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(DONE.load(Ordering::SeqCst), "detached THREAD work should have completed on its own");
}

#[test]
fn attached_slave_exits_its_host_process_once_its_clients_empty() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_lifecycle_probe"))
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("spawn lifecycle_probe");

    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();
    let first = lines.next().expect("a line of output").expect("valid utf8");
    let endpoint_str = first.strip_prefix("LISTENING:").expect("the first line announces the bound endpoint");
    let endpoint = Endpoint::parse(endpoint_str).expect("valid endpoint");

    let client = rfab::client(&endpoint, Some(Duration::from_secs(5))).expect("dial lifecycle_probe");
    drop(client);

    let status = Arc::new(std::sync::Mutex::new(None));
    let status_clone = status.clone();
    let waiter = std::thread::spawn(move || {
        *status_clone.lock().unwrap() = Some(child.wait());
    });

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if status.lock().unwrap().is_some() {
            break;
        }
        assert!(Instant::now() < deadline, "attached process should have exited on its own");
        std::thread::sleep(Duration::from_millis(20));
    }
    waiter.join().expect("waiter thread");
    let exit = status.lock().unwrap().take().unwrap().expect("wait on child");
    assert!(exit.success(), "lifecycle_probe should exit 0, got {exit:?}");
}
