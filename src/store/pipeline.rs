//! Batched connection mode.

use super::reply::Reply;
use super::MemoryStore;
use crate::connection::{Connection, ConnectionId};
use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;

/// Queues commands until [`execute`](Pipeline::execute) runs them as one
/// atomic batch.
pub struct Pipeline {
    store: MemoryStore,
    queue: Mutex<Vec<Vec<Bytes>>>,
}

impl Pipeline {
    /// An empty pipeline on `store`.
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            store: store.clone(),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Runs the queued commands and returns their replies in order.
    pub fn execute(&self) -> Vec<Reply> {
        let commands = std::mem::take(&mut *self.queue.lock());
        self.store.execute_batch(&commands)
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Connection for Pipeline {
    fn id(&self) -> ConnectionId {
        self.store.id()
    }

    fn query(&self, args: &[Bytes]) -> Result<Reply> {
        self.queue.lock().push(args.to_vec());
        Ok(Reply::Status("QUEUED".to_string()))
    }

    fn immediate_query(&self, args: &[Bytes]) -> Result<Reply> {
        Ok(self.store.execute_command(args))
    }

    fn is_pipelined(&self) -> bool {
        true
    }
}
