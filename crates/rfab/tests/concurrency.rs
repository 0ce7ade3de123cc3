//! spec.md §8 scenario 2: a THREAD task runs alongside BLOCK tasks on the
//! same client without either blocking the other.

#[path = "support/mod.rs"]
mod support;

use std::time::{Duration, Instant};

use rfab::{Environment, Payload, Value};

fn environment() -> Environment {
    Environment::new()
        .with_function("sleep_then_true", |_: Vec<Value>| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Value::Bool(true))
        })
        .with_function("always_true", |_: Vec<Value>| Ok(Value::Bool(true)))
}

#[test]
fn block_invocations_proceed_while_a_thread_task_sleeps() {
    let (_server, endpoint) = support::spawn_server(environment(), false);
    let client = support::dial(&endpoint);

    let started = Instant::now();
    let task = client.thread(Payload::Invoke(Value::Str("sleep_then_true".into()), vec![])).unwrap();

    assert!(started.elapsed() < Duration::from_millis(200));
    let immediate = client.invoke(Payload::Invoke(Value::Str("always_true".into()), vec![])).unwrap();
    assert_eq!(immediate, Value::Bool(true));
    assert!(!task.available());

    let result = task.wait(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(result, Value::Bool(true));

    client.stop().unwrap();
}
