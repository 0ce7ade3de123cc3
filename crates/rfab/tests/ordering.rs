//! spec.md §8 scenario 3 and the BLOCK-ordering invariant: "the sequence
//! of BLOCK replies to C is a prefix of the expected-order sequence".

#[path = "support/mod.rs"]
mod support;

use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use rfab::{Environment, Payload, Value};

fn environment() -> Environment {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    Environment::new().with_function("next", |_: Vec<Value>| {
        Ok(Value::Int(COUNTER.fetch_add(1, AtomicOrdering::SeqCst)))
    })
}

#[test]
fn one_hundred_block_tasks_return_in_request_order() {
    let (_server, endpoint) = support::spawn_server(environment(), false);
    let client = support::dial(&endpoint);

    let mut previous = -1;
    for _ in 0..100 {
        let result = client.invoke(Payload::Invoke(Value::Str("next".into()), vec![])).unwrap();
        let value = result.as_int().expect("counter returns an int");
        assert!(value > previous, "expected a strictly increasing sequence, got {value} after {previous}");
        previous = value;
    }

    client.stop().unwrap();
}
