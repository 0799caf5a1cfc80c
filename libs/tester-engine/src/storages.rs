use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};

use tester_api::{Error, StorageBuilder, TableStorage};

use crate::engine::Engine;
use crate::lock::{read, write};

/// Every table storage built during the test, grouped by topic. The first
/// replica of a topic is the one reads go to.
#[derive(Default)]
pub struct StorageRegistry {
    tables: RwLock<BTreeMap<String, Vec<Arc<dyn TableStorage>>>>,
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = read(&self.tables, "storage registry");
        f.debug_map()
            .entries(tables.iter().map(|(t, r)| (t, r.len())))
            .finish()
    }
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a replica of `topic`; returns its replica index.
    pub fn add(&self, topic: &str, storage: Arc<dyn TableStorage>) -> usize {
        let mut tables = write(&self.tables, "storage registry");
        let replicas = tables.entry(topic.to_string()).or_default();
        replicas.push(storage);
        replicas.len() - 1
    }

    pub fn first(&self, topic: &str) -> Option<Arc<dyn TableStorage>> {
        read(&self.tables, "storage registry")
            .get(topic)
            .and_then(|r| r.first().cloned())
    }

    pub fn replicas(&self, topic: &str) -> Vec<Arc<dyn TableStorage>> {
        read(&self.tables, "storage registry")
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Every replica of every topic, in topic order.
    pub fn all(&self) -> Vec<(String, Arc<dyn TableStorage>)> {
        read(&self.tables, "storage registry")
            .iter()
            .flat_map(|(topic, replicas)| replicas.iter().map(move |s| (topic.clone(), s.clone())))
            .collect()
    }
}

/// The `StorageBuilder` handed to processors. Each build creates a fresh
/// storage and binds a table-replica consumer to it.
pub struct TesterStorageBuilder {
    engine: Weak<Engine>,
}

impl TesterStorageBuilder {
    pub(crate) fn new(engine: Weak<Engine>) -> Self {
        Self { engine }
    }
}

impl StorageBuilder for TesterStorageBuilder {
    fn build(&self, topic: &str, partition: i32) -> Result<Arc<dyn TableStorage>, Error> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| Error::engine(format!("storage for '{topic}' requested after the tester was dropped")))?;
        engine
            .build_storage(topic, partition)
            .map_err(|e| e.into_api_error().with_context(format!("build storage '{topic}'")))
    }
}
