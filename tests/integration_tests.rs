// End-to-End Integration Tests for luaship
// These tests translate functions, run them inside the in-process store and
// check the values handed back to the caller.

use luaship::connection::args;
use luaship::{Environment, Error, Instance, MemoryStore, Options, Outcome, RemoteFunction, Reply, Value};
use std::collections::BTreeMap;

fn remote(source: &str) -> RemoteFunction {
    RemoteFunction::builder(source)
        .remote_objects(["client"])
        .build()
        .unwrap()
}

fn call(f: &RemoteFunction, store: &MemoryStore, values: &[Value]) -> Value {
    f.call(store, values).unwrap().into_value()
}

fn map<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Test the link shortener counter across calls
#[test]
fn test_e2e_add_link() {
    let add_link = RemoteFunction::builder(
        "
        def add_link(client, url):
            link_id = client.incr('link-id')
            client.set('link-' + str(link_id), url)
            return link_id
        ",
    )
    .build()
    .unwrap();

    let store = MemoryStore::new();
    assert_eq!(add_link.remote_objects(), vec!["client"]);
    assert_eq!(call(&add_link, &store, &[Value::from("http://a")]), Value::Int(1));
    assert_eq!(call(&add_link, &store, &[Value::from("http://b")]), Value::Int(2));
    assert_eq!(store.execute_command(&args(["GET", "link-2"])), Reply::bulk("http://b"));
}

/// Test a method reading a constant instance attribute
#[test]
fn test_e2e_increx_with_attribute() {
    let increx = RemoteFunction::builder(
        "
        def increx(self, key):
            if self.db.exists(key) == self.KEY_EXISTS:
                return self.db.incr(key)
            return None
        ",
    )
    .remote_objects(["self.db"])
    .build()
    .unwrap();
    let instance = Instance::new().with_attribute("KEY_EXISTS", 1);

    let store = MemoryStore::new();
    let outcome = increx.call_method(&instance, &store, &[Value::from("n")]).unwrap();
    assert_eq!(outcome, Outcome::Returned(Value::None));

    store.execute_command(&args(["SET", "n", "41"]));
    let outcome = increx.call_method(&instance, &store, &[Value::from("n")]).unwrap();
    assert_eq!(outcome.into_value(), Value::Int(42));
}

/// Test that argument types survive the trip through the script
#[test]
fn test_e2e_argument_types() {
    let echo = remote(
        "
        def echo(client, a, b, c):
            client.set('last', b)
            return [a, b, c]
        ",
    );
    let store = MemoryStore::new();
    let result = call(
        &echo,
        &store,
        &[Value::from(3), Value::from("foo"), Value::from(2.71828)],
    );
    assert_eq!(
        result,
        Value::List(vec![Value::Int(3), Value::from("foo"), Value::Float(2.71828)])
    );
}

/// Test loops over ranges and appends
#[test]
fn test_e2e_range_loop() {
    let f = remote(
        "
        def f(client):
            result = []
            for i in range(10):
                result.append(i)
            return result
        ",
    );
    let expected: Vec<Value> = (0..10).map(Value::Int).collect();
    assert_eq!(call(&f, &MemoryStore::new(), &[]), Value::List(expected));

    let f = remote(
        "
        def f(client, n):
            total = 0
            for i in range(1, n, 2):
                total += i
            return total
        ",
    );
    assert_eq!(call(&f, &MemoryStore::new(), &[Value::from(7)]), Value::Int(9));
}

/// Test None handling for returns and arguments
#[test]
fn test_e2e_none() {
    let store = MemoryStore::new();
    let f = remote("def f(client):\n    return None\n");
    assert_eq!(f.call(&store, &[]).unwrap(), Outcome::Returned(Value::None));

    let f = remote("def f(client, x):\n    if x is None:\n        return 'nothing'\n    return x\n");
    assert_eq!(call(&f, &store, &[Value::None]), Value::from("nothing"));

    let f = remote("def f(client):\n    x = client.get('missing')\n    return x\n");
    assert_eq!(call(&f, &store, &[]), Value::None);
}

/// Test constants inlined from the environment
#[test]
fn test_e2e_constants() {
    let env = Environment::new()
        .with("FOO", 3)
        .with("constants.FOO", 10)
        .with("constants.STRING", "a-b-c");
    let f = RemoteFunction::builder(
        "
        def f(client):
            client.set('k', FOO)
            return [FOO + 1, constants.FOO, constants.STRING.replace('-', '+')]
        ",
    )
    .remote_objects(["client"])
    .environment(env)
    .build()
    .unwrap();

    let store = MemoryStore::new();
    assert_eq!(
        call(&f, &store, &[]),
        Value::List(vec![Value::Int(4), Value::Int(10), Value::from("a+b+c")])
    );
    assert_eq!(store.execute_command(&args(["GET", "k"])), Reply::bulk("3"));

    let missing = RemoteFunction::builder("def f(client):\n    return client.get(BAR)\n")
        .remote_objects(["client"])
        .build();
    assert!(matches!(missing, Err(Error::Untranslatable { line: 2, .. })));
}

/// Test helper methods compiled into the script
#[test]
fn test_e2e_helper_methods() {
    let get = RemoteFunction::builder(
        "
        def get(self, key):
            return self.db.get(self.decorate_key(key))
        ",
    )
    .remote_objects(["self.db"])
    .build()
    .unwrap();
    let instance = Instance::new()
        .with_attribute("prefix", "app")
        .with_method("decorate_key", "def decorate_key(self, key):\n    return self.prefix + ':' + key\n");

    let store = MemoryStore::new();
    store.execute_command(&args(["SET", "app:user", "alice"]));
    assert_eq!(
        get.call_method(&instance, &store, &[Value::from("user")]).unwrap().into_value(),
        Value::from("alice")
    );
    assert!(get.script_text().unwrap().contains("self.decorate_key = function(key)"));
}

/// Test a helper that uses a remote object reachable through self
#[test]
fn test_e2e_sharded_helper() {
    let count = RemoteFunction::builder(
        "
        def count(self, w_id):
            shard = self.shard(w_id)
            self.db.incr('count:' + str(shard))
            return self.db.get('count:' + str(shard))
        ",
    )
    .build()
    .unwrap();
    let instance = Instance::new()
        .with_attribute("db_count", 4)
        .with_method("shard", "def shard(self, w_id):\n    return int(w_id) % self.db_count\n");

    let store = MemoryStore::new();
    count.call_method(&instance, &store, &[Value::from(6)]).unwrap();
    let outcome = count.call_method(&instance, &store, &[Value::from(10)]).unwrap();
    assert_eq!(outcome.into_value(), Value::from("2"));
    assert_eq!(store.execute_command(&args(["GET", "count:2"])), Reply::bulk("2"));
}

/// Test zero-based indexing of lists and keyed access of maps
#[test]
fn test_e2e_indexing() {
    let store = MemoryStore::new();
    let f = remote("def f(client, array):\n    return array[0]\n");
    assert_eq!(call(&f, &store, &[Value::from(vec![3, 4])]), Value::Int(3));

    let f = remote("def f(client, array):\n    return array[-1]\n");
    assert_eq!(call(&f, &store, &[Value::from(vec![3, 4])]), Value::Int(4));

    let f = remote("def f(client, d):\n    return d['b']\n");
    let d = BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
    assert_eq!(call(&f, &store, &[Value::from(d)]), Value::Int(2));

    let f = remote("def f(client):\n    return {'a': 1, 'b': 'x'}\n");
    assert_eq!(
        call(&f, &store, &[]),
        map([("a", Value::Int(1)), ("b", Value::from("x"))])
    );
}

/// Test list and string methods
#[test]
fn test_e2e_list_and_string_methods() {
    let store = MemoryStore::new();
    let f = remote(
        "
        def f(client):
            items = [1, 3]
            items.insert(1, 2)
            return items
        ",
    );
    assert_eq!(call(&f, &store, &[]), Value::from(vec![1, 2, 3]));

    let f = remote("def f(client, s):\n    return ', '.join([s.replace('a', 'o'), 'x'])\n");
    assert_eq!(call(&f, &store, &[Value::from("banana")]), Value::from("bonono, x"));

    let f = remote("def f(client):\n    return 'a\\nb'\n");
    assert_eq!(call(&f, &store, &[]), Value::from("a\nb"));
}

/// Test arithmetic operators
#[test]
fn test_e2e_arithmetic() {
    let store = MemoryStore::new();
    let cases = [
        ("-x", Value::Int(-3)),
        ("+x", Value::Int(3)),
        ("x * 4", Value::Int(12)),
        ("9 / x", Value::Int(3)),
        ("x ** 3", Value::Int(27)),
        ("7 // x", Value::Int(2)),
        ("7 % x", Value::Int(1)),
        ("x - 0.5", Value::Float(2.5)),
    ];
    for (expr, expected) in cases {
        let f = remote(&format!("def f(client, x):\n    return {}\n", expr));
        assert_eq!(call(&f, &store, &[Value::from(3)]), expected, "{}", expr);
    }
}

/// Test short-circuit operators and truthiness
#[test]
fn test_e2e_boolean_operators() {
    let store = MemoryStore::new();
    let f = remote("def f(client, x):\n    return x or 'default'\n");
    assert_eq!(call(&f, &store, &[Value::from("")]), Value::from("default"));
    assert_eq!(call(&f, &store, &[Value::from("given")]), Value::from("given"));

    let f = remote("def f(client, x):\n    return x and 5\n");
    assert_eq!(call(&f, &store, &[Value::from(0)]), Value::Int(0));
    assert_eq!(call(&f, &store, &[Value::from(1)]), Value::Int(5));

    // Side effects of later operands only happen when needed.
    let f = remote("def f(client, x):\n    return x or client.incr('calls')\n");
    call(&f, &store, &[Value::from(1)]);
    assert_eq!(store.execute_command(&args(["GET", "calls"])), Reply::Nil);

    let f = remote("def f(client):\n    return [not [], not '', not 0, not 'x']\n");
    assert_eq!(
        call(&f, &store, &[]),
        Value::List(vec![
            Value::Bool(true),
            Value::Bool(true),
            Value::Bool(true),
            Value::Bool(false)
        ])
    );
}

/// Test translating part of a function
#[test]
fn test_e2e_partial_lines() {
    let f = RemoteFunction::builder(
        "
        def f(client, key):
            value = client.get(key)
            value = value + 'x'
            return value
        ",
    )
    .remote_objects(["client"])
    .lines(3, 3)
    .build()
    .unwrap();
    assert_eq!(f.inputs(), vec!["key", "value"]);
    assert_eq!(f.outputs(), ["value".to_string()]);

    let outcome = f
        .call(&MemoryStore::new(), &[Value::from("k"), Value::from("abc")])
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::NoReturn {
            live_out: BTreeMap::from([("value".to_string(), Value::from("abcx"))])
        }
    );
}

/// Test statements that do not produce values
#[test]
fn test_e2e_pass_compare_and_augassign() {
    let store = MemoryStore::new();
    let f = remote(
        "
        def f(client, x):
            if x > 3:
                pass
            else:
                x += 2
            return [x, x > 3, x == 5]
        ",
    );
    assert_eq!(
        call(&f, &store, &[Value::from(3)]),
        Value::List(vec![Value::Int(5), Value::Bool(true), Value::Bool(true)])
    );

    let f = remote("def f(client):\n    a, b = 1, 2\n    return [b, a]\n");
    assert_eq!(call(&f, &store, &[]), Value::from(vec![2, 1]));
}

/// Test continue and break inside loops
#[test]
fn test_e2e_continue_and_break() {
    let f = remote(
        "
        def f(client):
            out = []
            for i in range(10):
                if i == 2:
                    continue
                if i == 5:
                    break
                out.append(i)
            return out
        ",
    );
    assert_eq!(call(&f, &MemoryStore::new(), &[]), Value::from(vec![0, 1, 3, 4]));
}

/// Test that a loop exit skips the rest of the body, including a return
#[test]
fn test_e2e_loop_exit_skips_return() {
    for keyword in ["continue", "break"] {
        let source = format!(
            "def f(client):\n    for i in range(3):\n        {}\n        return False\n    return True\n",
            keyword
        );
        let f = remote(&source);
        assert_eq!(
            f.call(&MemoryStore::new(), &[]).unwrap(),
            Outcome::Returned(Value::Bool(true)),
            "{}",
            keyword
        );
    }
}

/// Test reassignment and loop variables after the loop
#[test]
fn test_e2e_scoping() {
    let f = remote(
        "
        def f(client, items):
            last = None
            for item in items:
                last = item
                x = 1
            x = x + 1
            return [last, item, x]
        ",
    );
    assert_eq!(
        call(&f, &MemoryStore::new(), &[Value::from(vec!["a", "b"])]),
        Value::List(vec![Value::from("b"), Value::from("b"), Value::Int(2)])
    );
}

/// Test iterating a mapping visits its keys in sorted order
#[test]
fn test_e2e_iterate_mapping() {
    let f = remote(
        "
        def f(client, d):
            keys = []
            for k in d:
                keys.append(k)
                client.hset('h', k, d[k])
            return keys
        ",
    );
    let d = BTreeMap::from([("b".to_string(), 2), ("a".to_string(), 1)]);
    let store = MemoryStore::new();
    assert_eq!(call(&f, &store, &[Value::from(d)]), Value::from(vec!["a", "b"]));
    assert_eq!(store.execute_command(&args(["HGET", "h", "b"])), Reply::bulk("2"));
}

/// Test pipelined calls drained by execute()
#[test]
fn test_e2e_pipelined_execute() {
    let f = remote(
        "
        def f(client, key):
            client.pipe()
            client.set(key, 'baz')
            client.append(key, 'quux')
            client.get(key)
            return client.execute()[2]
        ",
    );
    assert!(f.lua_body().contains("__PIPE_GET('client')"));
    assert_eq!(call(&f, &MemoryStore::new(), &[Value::from("foo")]), Value::from("bazquux"));
}

/// Test calling through a pipelined connection
#[test]
fn test_e2e_pipeline_connection() {
    let f = remote(
        "
        def f(client, key):
            client.incr(key)
            return int(client.get(key))
        ",
    );
    let store = MemoryStore::new();
    store.execute_command(&args(["SET", "n", "1336"]));

    let pipe = store.pipeline();
    assert_eq!(f.call(&pipe, &[Value::from("n")]).unwrap().into_value(), Value::Int(1337));
    assert!(pipe.is_empty());
}

/// Test delete and multiple remote objects in one function
#[test]
fn test_e2e_delete_and_multiple_objects() {
    let f = RemoteFunction::builder(
        "
        def f(a, b, key):
            a.set(key, '1')
            b.incr(key)
            a.incr(key)
            value = b.get(key)
            a.delete(key)
            return [value, b.exists(key)]
        ",
    )
    .build()
    .unwrap();
    assert_eq!(f.remote_objects(), vec!["a", "b"]);

    let store = MemoryStore::new();
    assert_eq!(
        call(&f, &store, &[Value::from("k")]),
        Value::List(vec![Value::from("3"), Value::Int(0)])
    );
    assert_eq!(store.key_count(), 0);
}

/// Test that missing fields inside a multi-bulk reply arrive as false
#[test]
fn test_e2e_nested_missing_values() {
    let store = MemoryStore::new();
    store.execute_command(&args(["HSET", "h", "a", "1"]));
    let f = remote("def f(client):\n    return client.hmget('h', 'a', 'b')\n");
    assert_eq!(
        call(&f, &store, &[]),
        Value::List(vec![Value::from("1"), Value::Bool(false)])
    );

    let f = remote("def f(client):\n    return client.hget('h', 'b')\n");
    assert_eq!(call(&f, &store, &[]), Value::None);
}

/// Test time.time() and len()
#[test]
fn test_e2e_time_and_len() {
    let store = MemoryStore::new();
    let f = remote("def f(client):\n    return time.time()\n");
    let now = call(&f, &store, &[]).as_f64().unwrap();
    assert!(now > 1_600_000_000.0);

    let f = remote("def f(client, s, items):\n    return [len(s), len(items)]\n");
    assert_eq!(
        call(&f, &store, &[Value::from("four"), Value::from(vec![1, 2, 3])]),
        Value::from(vec![4, 3])
    );

    let d = BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
    assert_eq!(
        call(&f, &store, &[Value::from(""), Value::from(d)]),
        Value::from(vec![0, 2])
    );
}

/// Test assignment into lists and maps
#[test]
fn test_e2e_subscript_assignment() {
    let store = MemoryStore::new();
    let f = remote("def f(client, array):\n    array[1] = 4\n    return array[1]\n");
    assert_eq!(call(&f, &store, &[Value::from(vec![1, 2])]), Value::Int(4));

    let f = remote("def f(client):\n    d = {}\n    d['a'] = 2\n    return d['a']\n");
    assert_eq!(call(&f, &store, &[]), Value::Int(2));
}

/// Test a TPC-C style new order fragment
#[test]
fn test_e2e_tpcc_new_order() {
    let new_order = RemoteFunction::builder(
        "
        def new_order(client, w_id, d_id, items):
            key = 'district:' + str(w_id) + ':' + str(d_id)
            o_id = client.hincrby(key, 'next_o_id', 1)
            total = 0
            for item in items:
                price = client.hget('item:' + str(item['i_id']), 'price')
                if price is None:
                    return {'ok': False, 'o_id': o_id}
                total = total + float(price) * item['qty']
            client.hset('order:' + str(o_id), 'total', total)
            return {'ok': True, 'o_id': o_id, 'total': total}
        ",
    )
    .remote_objects(["client"])
    .build()
    .unwrap();

    let store = MemoryStore::new();
    store.execute_command(&args(["HSET", "item:1", "price", "2.5"]));
    store.execute_command(&args(["HSET", "item:2", "price", "4"]));
    let line = |i_id: i64, qty: i64| {
        Value::from(BTreeMap::from([
            ("i_id".to_string(), Value::Int(i_id)),
            ("qty".to_string(), Value::Int(qty)),
        ]))
    };

    let outcome = new_order
        .call(&store, &[Value::from(1), Value::from(2), Value::List(vec![line(1, 2), line(2, 1)])])
        .unwrap();
    assert_eq!(
        outcome.into_value(),
        map([
            ("ok", Value::Bool(true)),
            ("o_id", Value::Int(1)),
            ("total", Value::Int(9))
        ])
    );
    assert_eq!(store.execute_command(&args(["HGET", "order:1", "total"])), Reply::bulk("9"));

    let outcome = new_order
        .call(&store, &[Value::from(1), Value::from(2), Value::List(vec![line(3, 1)])])
        .unwrap();
    assert_eq!(
        outcome.into_value(),
        map([("ok", Value::Bool(false)), ("o_id", Value::Int(2))])
    );
}

/// Test reading a category with a limit
#[test]
fn test_e2e_get_by_category() {
    let get_by_category = RemoteFunction::builder(
        "
        def get_by_category(client, category, limit):
            ids = client.smembers('category:' + category)
            items = []
            for item_id in ids:
                if len(items) >= limit:
                    break
                items.append(client.hget('item:' + item_id, 'name'))
            return items
        ",
    )
    .build()
    .unwrap();

    let store = MemoryStore::new();
    for (id, name) in [("1", "apple"), ("2", "banana"), ("3", "cherry")] {
        store.execute_command(&args(["SADD", "category:fruit", id]));
        store.execute_command(&args(["HSET", &format!("item:{}", id), "name", name]));
    }
    assert_eq!(
        call(&get_by_category, &store, &[Value::from("fruit"), Value::from(2)]),
        Value::from(vec!["apple", "banana"])
    );
    assert_eq!(
        call(&get_by_category, &store, &[Value::from("veg"), Value::from(2)]),
        Value::List(Vec::new())
    );
}

/// Test that a failing script leaves no writes behind
#[test]
fn test_e2e_failed_script_rolls_back() {
    let f = remote(
        "
        def f(client, key):
            client.set('touched', '1')
            return client.incr(key)
        ",
    );
    let store = MemoryStore::new();
    store.execute_command(&args(["HSET", "h", "a", "1"]));

    let err = f.call(&store, &[Value::from("h")]).unwrap_err();
    match err {
        Error::RemoteExecution(msg) => assert!(msg.contains("WRONGTYPE"), "{}", msg),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.execute_command(&args(["GET", "touched"])), Reply::Nil);
}

/// Test the debug trace published while a script runs
#[test]
fn test_e2e_debug_trace() {
    let f = RemoteFunction::builder("def f(client):\n    x = 1\n    return x\n")
        .remote_objects(["client"])
        .options(Options::default().with_lua_debug())
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let trace = store.subscribe("luaship-debug");

    assert_eq!(call(&f, &store, &[]), Value::Int(1));
    let messages: Vec<String> = trace
        .try_iter()
        .map(|m| String::from_utf8_lossy(&m).into_owned())
        .collect();
    assert!(messages.iter().any(|m| m == "2: x = 1"), "{:?}", messages);
}
