//! The persistence collaborator contract.
//!
//! The kernel calls the graph store only to (a) durably record cascade
//! chains and events so cascades survive a restart, and (b) let
//! overlays perform capability-gated reads and writes through the host
//! surface. Query text is validated by the sandbox's query guard before
//! it ever reaches an implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use spire_bus::{CascadeChain, CascadeStore, EventRecord};
use spire_core::{ChainId, KernelResult};
use spire_sandbox::StoreAccess;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The full persistence collaborator: cascade durability plus
/// capability-gated data access
pub trait GraphStore: StoreAccess + CascadeStore {}

impl<T: StoreAccess + CascadeStore> GraphStore for T {}

/// In-memory store for tests and embedders without persistence
///
/// Records every chain, event record, and query for inspection.
#[derive(Default)]
pub struct MemoryStore {
    chains: RwLock<HashMap<ChainId, CascadeChain>>,
    records: RwLock<Vec<EventRecord>>,
    read_queries: RwLock<Vec<String>>,
    write_queries: RwLock<Vec<String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded cascade chains
    pub async fn chains(&self) -> Vec<CascadeChain> {
        self.chains.read().await.values().cloned().collect()
    }

    /// Recorded event records, in arrival order
    pub async fn records(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    /// Read queries seen, in arrival order
    pub async fn read_queries(&self) -> Vec<String> {
        self.read_queries.read().await.clone()
    }

    /// Write queries seen, in arrival order
    pub async fn write_queries(&self) -> Vec<String> {
        self.write_queries.read().await.clone()
    }
}

#[async_trait]
impl CascadeStore for MemoryStore {
    async fn record_chain(&self, chain: &CascadeChain) -> KernelResult<()> {
        self.chains
            .write()
            .await
            .insert(chain.chain_id, chain.clone());
        Ok(())
    }

    async fn record_event(&self, record: &EventRecord) -> KernelResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreAccess for MemoryStore {
    async fn read(&self, query: &str) -> KernelResult<Value> {
        self.read_queries.write().await.push(query.to_string());
        Ok(json!({"rows": []}))
    }

    async fn write(&self, query: &str) -> KernelResult<Value> {
        self.write_queries.write().await.push(query.to_string());
        Ok(json!({"acknowledged": true}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_bus::Event;
    use spire_core::EventId;

    #[tokio::test]
    async fn test_memory_store_records_chains_and_events() {
        let store = MemoryStore::new();
        let chain = CascadeChain::new(EventId::new(), 3);
        store.record_chain(&chain).await.unwrap();

        let event = Event::new("x", Value::Null);
        store
            .record_event(&EventRecord::from_event(&event))
            .await
            .unwrap();

        assert_eq!(store.chains().await.len(), 1);
        assert_eq!(store.records().await.len(), 1);
        assert_eq!(store.records().await[0].id, event.id);
    }

    #[tokio::test]
    async fn test_memory_store_logs_queries() {
        let store = MemoryStore::new();
        store.read("MATCH (n) RETURN n").await.unwrap();
        store.write("CREATE (n:Node)").await.unwrap();

        assert_eq!(store.read_queries().await, vec!["MATCH (n) RETURN n"]);
        assert_eq!(store.write_queries().await, vec!["CREATE (n:Node)"]);
    }
}
