//! spec.md §8 scenario 1: "*Echo.* Client sends a function, receives its
//! result; repeated for scalars, lists, and nested maps."

#[path = "support/mod.rs"]
mod support;

use rfab::{Environment, Payload, Value};

fn environment() -> Environment {
    Environment::new().with_function("echo", |mut args: Vec<Value>| {
        if args.len() != 1 {
            return Err("echo takes exactly one argument".into());
        }
        Ok(args.remove(0))
    })
}

#[test]
fn scalar_list_and_nested_map_round_trip() {
    let (_server, endpoint) = support::spawn_server(environment(), false);
    let client = support::dial(&endpoint);

    let scalar = client.invoke(Payload::Invoke(Value::Str("echo".into()), vec![Value::Int(42)])).unwrap();
    assert_eq!(scalar, Value::Int(42));

    let list = Value::List(vec![Value::Int(1), Value::Str("two".into()), Value::Bool(true)]);
    let echoed = client.invoke(Payload::Invoke(Value::Str("echo".into()), vec![list.clone()])).unwrap();
    assert_eq!(echoed, list);

    let nested = Value::Map(vec![(
        Value::Str("inner".into()),
        Value::Map(vec![(Value::Str("values".into()), Value::List(vec![Value::Int(1), Value::Int(2)]))]),
    )]);
    let echoed = client.invoke(Payload::Invoke(Value::Str("echo".into()), vec![nested.clone()])).unwrap();
    assert_eq!(echoed, nested);

    client.stop().unwrap();
}
