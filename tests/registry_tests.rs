// Script registry and invocation protocol tests
// These tests cover registration, reloading after a store forgets a script,
// result decoding and the errors a call can fail with.

use luaship::connection::args;
use luaship::{Error, MemoryStore, Options, Outcome, RemoteFunction, ScriptRegistry, Value};
use std::sync::Arc;
use std::thread;

const COUNTER: &str = "
    def counter(client, key):
        client.incr(key)
        return client.get(key)
";

/// Test that identical functions share one script
#[test]
fn test_registration_is_content_addressed() {
    let registry = Arc::new(ScriptRegistry::new());
    let a = RemoteFunction::builder(COUNTER).registry(Arc::clone(&registry)).build().unwrap();
    let b = RemoteFunction::builder(COUNTER).registry(Arc::clone(&registry)).build().unwrap();
    let store = MemoryStore::new();

    a.call(&store, &[Value::from("n")]).unwrap();
    b.call(&store, &[Value::from("n")]).unwrap();

    assert_eq!(a.script_id(), b.script_id());
    assert_eq!(store.stats().script_loads, 1);
    let stats = registry.stats();
    assert_eq!(stats.registrations, 2);
    assert_eq!(stats.invocations, 2);
    let id = a.script_id().unwrap();
    assert_eq!(registry.script_text(&id).as_deref(), a.script_text().as_deref());
}

/// Test recovery when the store drops its script cache
#[test]
fn test_reload_after_script_flush() {
    let f = RemoteFunction::builder(COUNTER).build().unwrap();
    let store = MemoryStore::new();
    assert_eq!(f.call(&store, &[Value::from("n")]).unwrap().into_value(), Value::from("1"));

    store.execute_command(&args(["SCRIPT", "FLUSH"]));
    assert_eq!(f.call(&store, &[Value::from("n")]).unwrap().into_value(), Value::from("2"));
    assert_eq!(f.registry().stats().reloads, 1);
    assert_eq!(store.stats().script_loads, 2);
}

/// Test the difference between returning None and not returning
#[test]
fn test_no_return_versus_none() {
    let store = MemoryStore::new();
    let silent = RemoteFunction::builder("def f(client, key):\n    client.set(key, 'v')\n")
        .remote_objects(["client"])
        .build()
        .unwrap();
    let outcome = silent.call(&store, &[Value::from("k")]).unwrap();
    assert!(!outcome.returned());
    assert!(matches!(outcome, Outcome::NoReturn { ref live_out } if live_out.is_empty()));

    let explicit = RemoteFunction::builder("def f(client, key):\n    client.set(key, 'v')\n    return None\n")
        .remote_objects(["client"])
        .build()
        .unwrap();
    let outcome = explicit.call(&store, &[Value::from("k")]).unwrap();
    assert!(outcome.returned());
    assert_eq!(outcome.value(), &Value::None);
}

/// Test that argument shapes are fixed by the first call
#[test]
fn test_argument_shape_mismatch() {
    let options = Options {
        check_argument_shapes: true,
        ..Options::default()
    };
    let f = RemoteFunction::builder("def f(client, n):\n    return client.incrby('n', n)\n")
        .remote_objects(["client"])
        .options(options)
        .build()
        .unwrap();
    let store = MemoryStore::new();
    assert_eq!(f.call(&store, &[Value::from(5)]).unwrap().into_value(), Value::Int(5));

    match f.call(&store, &[Value::from("5")]) {
        Err(Error::ArgumentShapeMismatch { name, .. }) => assert_eq!(name, "n"),
        other => panic!("expected a shape mismatch, got {:?}", other),
    }
    assert!(matches!(
        f.call(&store, &[Value::from(1), Value::from(2)]),
        Err(Error::InvalidArgument(_))
    ));
}

/// Test errors raised while building a proxy
#[test]
fn test_build_errors() {
    let err = RemoteFunction::builder("def f(x, y):\n    return x + y\n").build().unwrap_err();
    assert!(matches!(err, Error::IdentificationFailure { ref function } if function == "f"));

    let err = RemoteFunction::builder(
        "
        def f(client, d):
            client.get('a')
            for k, v in d.items():
                client.set(k, v)
        ",
    )
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::Untranslatable { line: 3, .. }), "{}", err);

    let err = RemoteFunction::builder("def f(client:\n").build().unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "{}", err);
}

/// Test proxies called from many threads against one store
#[test]
fn test_concurrent_calls_are_atomic() {
    let f = Arc::new(
        RemoteFunction::builder(
            "
            def transfer(client, src, dst, amount):
                balance = int(client.get(src))
                if balance < amount:
                    return False
                client.decrby(src, amount)
                client.incrby(dst, amount)
                return True
            ",
        )
        .remote_objects(["client"])
        .build()
        .unwrap(),
    );
    let store = MemoryStore::new();
    store.execute_command(&args(["SET", "a", "1000"]));
    store.execute_command(&args(["SET", "b", "0"]));

    // Compile before spawning so the script is loaded exactly once.
    f.call(&store, &[Value::from("a"), Value::from("b"), Value::from(0)]).unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let f = Arc::clone(&f);
        let store = store.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                f.call(&store, &[Value::from("a"), Value::from("b"), Value::from(3)])
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let balance = |key: &str| -> i64 {
        store.execute_command(&args(["GET", key])).as_str().unwrap().parse().unwrap()
    };
    let (a, b) = (balance("a"), balance("b"));
    assert_eq!(a + b, 1000);
    assert_eq!(b % 3, 0);
    assert_eq!(a, 1);
    assert_eq!(store.stats().script_loads, 1);
}
