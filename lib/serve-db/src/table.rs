//! In-memory routing tables
//!
//! A [`ServeTable`] is built once by the parser and never mutated after it
//! is installed. A [`RoutingTable`] holds the current table behind a lock
//! that is only taken to clone or swap the reference, so readers never see
//! a partially applied reload.

use crate::record::{ServeKey, ServeRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Immutable mapping from routing key to record
#[derive(Clone, Debug, Default)]
pub struct ServeTable {
    records: HashMap<ServeKey, Arc<ServeRecord>>,
}

impl ServeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a record under its own key, replacing any earlier record
    pub fn insert(&mut self, record: ServeRecord) -> Option<Arc<ServeRecord>> {
        let key = record.key().clone();
        self.records.insert(key, Arc::new(record))
    }

    pub fn get(&self, key: &ServeKey) -> Option<&Arc<ServeRecord>> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<ServeRecord>> {
        self.records.values()
    }
}

/// Concurrently readable routing table, replaced wholesale on reload
#[derive(Debug, Default)]
pub struct RoutingTable {
    current: RwLock<Arc<ServeTable>>,
}

impl RoutingTable {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for an identity connecting on a socket path
    pub fn lookup(&self, key: &ServeKey) -> Option<Arc<ServeRecord>> {
        self.current.read().get(key).cloned()
    }

    /// Look up by identity and path without building a key first
    pub fn resolve(&self, identity: &str, path: &str) -> Option<Arc<ServeRecord>> {
        self.lookup(&ServeKey::new(identity, path))
    }

    /// Token for an identity/path pair, if routed
    pub fn token(&self, identity: &str, path: &str) -> Option<String> {
        self.resolve(identity, path).map(|record| record.token().to_string())
    }

    /// Replace the whole table in one step
    pub fn install(&self, table: ServeTable) {
        let table = Arc::new(table);
        let count = table.len();
        *self.current.write() = table;
        debug!(records = count, "Installed routing table");
    }

    /// The table in effect right now; unaffected by later installs
    pub fn snapshot(&self) -> Arc<ServeTable> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
