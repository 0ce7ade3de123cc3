//! spec.md §8 scenario 4 and the Σ-refcount invariant: `wrap`/`append`/
//! `unwrap` round-trips the mutation, and dropping the only owning
//! reference eventually surfaces `DanglingReference` to a borrower.

#[path = "support/mod.rs"]
mod support;

use std::time::{Duration, Instant};

use rfab::{ClientError, Environment, HandleRef, Payload, Value, decode_handle, root_address, root_of};

fn environment() -> Environment {
    Environment::new().with_function("make_list", |_: Vec<Value>| {
        Ok(Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    })
}

#[test]
fn append_then_unwrap_observes_the_mutation_then_dangles_after_drop() {
    let (_server, endpoint) = support::spawn_server(environment(), true);
    let owner = support::dial(&endpoint);

    let handle = owner.wrap(Payload::Invoke(Value::Str("make_list".into()), vec![])).unwrap();
    handle.attr("append").call(vec![Value::Int(5)]).unwrap();
    let snapshot = handle.unwrap().unwrap();
    assert_eq!(snapshot, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(5)]));

    let root_id = root_of(handle.address()).unwrap();

    let borrower = support::dial(&endpoint);
    let borrowed = decode_handle(HandleRef { sid: borrower.sid().clone(), address: root_address(root_id) }).unwrap();

    drop(handle);

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match borrowed.unwrap() {
            Err(ClientError::RemoteFailure { error, .. }) => {
                let message = error.as_str().unwrap_or_default();
                assert!(message.contains("dangling reference"), "unexpected failure: {message}");
                break;
            }
            Ok(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
            Ok(value) => panic!("root should have become dangling, still observed {value:?}"),
            Err(other) => panic!("unexpected error waiting for DanglingReference: {other}"),
        }
    }

    owner.stop().unwrap();
}
