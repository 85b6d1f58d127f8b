// Invocation performance benchmarks for luaship

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use luaship::connection::args;
use luaship::{MemoryStore, RemoteFunction, Value};
use std::hint::black_box;

fn benchmark_counter_call(c: &mut Criterion) {
    let f = RemoteFunction::builder(
        "
        def counter(client, key):
            client.incr(key)
            return client.get(key)
        ",
    )
    .build()
    .unwrap();
    let store = MemoryStore::new();
    let key = [Value::from("counter")];
    f.call(&store, &key).unwrap();

    c.bench_function("counter_call", |b| {
        b.iter(|| black_box(f.call(&store, &key).unwrap()));
    });
}

fn benchmark_loop_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_call");
    let f = RemoteFunction::builder(
        "
        def push_all(client, key, items):
            for item in items:
                client.rpush(key, item)
            return client.llen(key)
        ",
    )
    .build()
    .unwrap();

    for size in [10, 100, 1000].iter() {
        let items: Vec<Value> = (0..*size).map(|i| Value::Int(i as i64)).collect();
        let call_args = [Value::from("list"), Value::List(items)];
        let store = MemoryStore::new();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &call_args, |b, call_args| {
            b.iter(|| {
                store.execute_command(&args(["DEL", "list"]));
                black_box(f.call(&store, call_args).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_direct_commands(c: &mut Criterion) {
    let store = MemoryStore::new();
    c.bench_function("direct_incr_get", |b| {
        b.iter(|| {
            store.execute_command(&args(["INCR", "counter"]));
            black_box(store.execute_command(&args(["GET", "counter"])));
        });
    });
}

criterion_group!(
    benches,
    benchmark_counter_call,
    benchmark_loop_call,
    benchmark_direct_commands
);
criterion_main!(benches);
