//! Example: Inventory reservations run inside the store
//!
//! A reservation reads stock levels, checks them and writes the new levels.
//! Run as a remote function it takes one round trip and cannot interleave
//! with a concurrent reservation.
//!
//! Run with `RUST_LOG=debug cargo run --example inventory` to see the
//! translation and invocation log.

use anyhow::Context;
use luaship::connection::args;
use luaship::{compile_to_lua, Instance, MemoryStore, Outcome, RemoteFunction, Value};
use std::collections::BTreeMap;

const RESERVE: &str = "
    def reserve(self, order_id, lines):
        for sku in lines:
            stock = self.db.hget(self.stock_key(sku), 'available')
            if stock is None or int(stock) < lines[sku]:
                return {'ok': False, 'sku': sku}
        for sku in lines:
            self.db.hincrby(self.stock_key(sku), 'available', -lines[sku])
            self.db.hincrby(self.stock_key(sku), 'reserved', lines[sku])
        self.db.sadd('orders', order_id)
        return {'ok': True, 'sku': None}
";

const STOCK_KEY: &str = "
    def stock_key(self, sku):
        return self.prefix + ':' + sku
";

fn order(lines: &[(&str, i64)]) -> Value {
    let lines: BTreeMap<String, Value> = lines
        .iter()
        .map(|(sku, qty)| (sku.to_string(), Value::Int(*qty)))
        .collect();
    Value::Map(lines)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let store = MemoryStore::new();
    for (sku, available) in [("apple", "10"), ("pear", "3")] {
        store.execute_command(&args(["HSET", &format!("stock:{}", sku), "available", available]));
    }

    let inventory = Instance::new()
        .with_attribute("prefix", "stock")
        .with_method("stock_key", STOCK_KEY);
    let reserve = RemoteFunction::builder(RESERVE)
        .build()
        .context("translating reserve()")?;

    println!("=== Inventory reservations ===\n");
    println!("Remote objects: {:?}", reserve.remote_objects());
    println!("Translated body:\n{}", reserve.lua_body());

    for (order_id, lines) in [
        ("order-1", order(&[("apple", 4), ("pear", 2)])),
        ("order-2", order(&[("apple", 4), ("pear", 2)])),
        ("order-3", order(&[("apple", 6)])),
    ] {
        let outcome = reserve
            .call_method(&inventory, &store, &[Value::from(order_id), lines])
            .with_context(|| format!("reserving {}", order_id))?;
        match outcome {
            Outcome::Returned(value) => println!("{}: {}", order_id, serde_json::to_string(&value)?),
            Outcome::NoReturn { .. } => println!("{}: no result", order_id),
        }
    }

    for sku in ["apple", "pear"] {
        let available = store.execute_command(&args(["HGET", &format!("stock:{}", sku), "available"]));
        println!("{} available: {}", sku, available);
    }

    let text = compile_to_lua(
        "def peek(client, key):\n    client.incr(key)\n    return client.get(key)\n",
        &[Value::from("k")],
    )?;
    println!("\nScript for peek():\n{}", text);

    Ok(())
}
