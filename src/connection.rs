//! The seam between proxies and a store.

use crate::error::Result;
use crate::store::Reply;
use bytes::Bytes;

/// Identity of a connection. Scripts are loaded once per connection.
pub type ConnectionId = u64;

/// A connection that accepts commands.
///
/// Pipelined connections defer ordinary commands; script loading and
/// evaluation then go through [`immediate_query`](Connection::immediate_query)
/// so a proxied call still returns its result right away.
pub trait Connection {
    /// Identity used to track which scripts this connection has loaded.
    fn id(&self) -> ConnectionId;

    /// Sends a command on the normal path.
    fn query(&self, args: &[Bytes]) -> Result<Reply>;

    /// Sends a command that must be answered now.
    fn immediate_query(&self, args: &[Bytes]) -> Result<Reply> {
        self.query(args)
    }

    /// True if [`query`](Connection::query) defers commands instead of running them.
    fn is_pipelined(&self) -> bool {
        false
    }
}

/// Builds a command from its parts.
pub fn args<I, T>(parts: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    parts
        .into_iter()
        .map(|part| Bytes::copy_from_slice(part.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_store_is_a_connection() {
        let store = MemoryStore::new();
        let conn: &dyn Connection = &store;
        assert!(!conn.is_pipelined());
        assert_eq!(conn.query(&args(["SET", "a", "1"])).unwrap(), Reply::ok());
        assert_eq!(conn.immediate_query(&args(["GET", "a"])).unwrap(), Reply::bulk("1"));
        assert_ne!(conn.id(), MemoryStore::new().id());
    }
}
