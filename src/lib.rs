//! # luaship - Run Python-style functions inside a key-value store
//!
//! luaship takes the source of a function that talks to a store client,
//! translates its body into a Lua script and runs that script inside the
//! store, so the whole function executes in one round trip and atomically.
//!
//! ## Architecture
//!
//! - **Syntax**: parses the function source into a small statement tree
//! - **Analysis**: identifies remote objects and computes the names a
//!   fragment reads from and hands back to the caller
//! - **Translate**: lowers statements and expressions into Lua
//! - **Marshal**: builds the argument preamble from the first call's values
//! - **Registry**: content-addressed script loading and `EVALSHA` invocation
//! - **Store**: an in-process store with an embedded Lua runtime
//!
//! ## Example Usage
//!
//! ```rust
//! use luaship::{MemoryStore, RemoteFunction, Value};
//!
//! # fn main() -> Result<(), luaship::Error> {
//! let incr_twice = RemoteFunction::builder(
//!     "def incr_twice(client, key):
//!         client.incr(key)
//!         return client.incr(key)",
//! )
//! .build()?;
//!
//! let store = MemoryStore::new();
//! let outcome = incr_twice.call(&store, &[Value::from("hits")])?;
//! assert_eq!(outcome.into_value(), Value::Int(2));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod analysis;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod marshal;
pub mod proxy;
pub mod registry;
pub mod store;
pub mod syntax;
pub mod translate;
pub mod value;

// Re-exports
pub use config::{Options, StoreOptions};
pub use connection::Connection;
pub use error::{Error, Result};
pub use host::{Environment, Instance};
pub use proxy::{compile_to_lua, RemoteFunction, RemoteFunctionBuilder};
pub use registry::{Outcome, ScriptId, ScriptRegistry};
pub use store::{MemoryStore, Pipeline, Reply};
pub use value::{ArgShape, Value};
