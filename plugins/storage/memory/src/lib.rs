use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;

use tester_api::{Error, StorageFactory, TableStorage};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_keys() -> usize {
    1_000_000
}

#[derive(Debug, serde::Deserialize)]
pub struct MemoryStorageConfig {
    /// Writes of new keys beyond this limit fail with a storage error.
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Table {
    entries: BTreeMap<String, Vec<u8>>,
    offset: Option<u64>,
}

/// In-memory key-value table. Nothing survives the process.
pub struct MemoryStorage {
    table: RwLock<Table>,
    max_keys: usize,
}

impl MemoryStorage {
    pub fn new(max_keys: usize) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            max_keys,
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.entries.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(default_max_keys())
    }
}

impl TableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.table.read().await.entries.get(&key).cloned()) })
    }

    fn has(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.table.read().await.entries.contains_key(&key)) })
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut table = self.table.write().await;
            if !table.entries.contains_key(&key) && table.entries.len() >= self.max_keys {
                return Err(Error::storage(format!(
                    "memory table full ({} keys), cannot insert '{key}'",
                    self.max_keys
                )));
            }
            table.entries.insert(key, value);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.table.write().await.entries.remove(&key);
            Ok(())
        })
    }

    fn iter(&self) -> Pin<Box<dyn Future<Output = Result<Vec<(String, Vec<u8>)>, Error>> + Send + '_>> {
        Box::pin(async move {
            let table = self.table.read().await;
            Ok(table
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    fn set_offset(&self, offset: u64) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            self.table.write().await.offset = Some(offset);
            Ok(())
        })
    }

    fn offset(&self) -> Pin<Box<dyn Future<Output = Result<Option<u64>, Error>> + Send + '_>> {
        Box::pin(async move { Ok(self.table.read().await.offset) })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            self.table.write().await.entries.clear();
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageFactory
// ═══════════════════════════════════════════════════════════════

pub struct MemoryStorageFactory;

impl StorageFactory for MemoryStorageFactory {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn TableStorage>, Error> {
        let config: MemoryStorageConfig = if config.is_null() {
            MemoryStorageConfig::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| Error::config(format!("memory storage config: {e}")))?
        };
        Ok(Arc::new(MemoryStorage::new(config.max_keys)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tester_api::ErrorKind;

    #[tokio::test]
    async fn set_get_delete() {
        let st = MemoryStorage::default();
        st.set("a", b"1".to_vec()).await.unwrap();
        assert_eq!(st.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(st.has("a").await.unwrap());

        st.delete("a").await.unwrap();
        assert_eq!(st.get("a").await.unwrap(), None);
        // deleting twice is fine
        st.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn iter_is_ordered_by_key() {
        let st = MemoryStorage::default();
        st.set("b", b"2".to_vec()).await.unwrap();
        st.set("a", b"1".to_vec()).await.unwrap();
        let keys: Vec<String> = st.iter().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[tokio::test]
    async fn clear_keeps_offset() {
        let st = MemoryStorage::default();
        st.set("a", b"1".to_vec()).await.unwrap();
        st.set("b", b"2".to_vec()).await.unwrap();
        st.set_offset(7).await.unwrap();
        assert_eq!(st.len().await, 2);
        st.clear().await.unwrap();
        assert!(st.is_empty().await);
        assert_eq!(st.len().await, 0);
        assert_eq!(st.offset().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn full_table_rejects_new_keys() {
        let st = MemoryStorage::new(1);
        st.set("a", b"1".to_vec()).await.unwrap();
        // overwriting an existing key is still allowed
        st.set("a", b"2".to_vec()).await.unwrap();
        let err = st.set("b", b"3".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn factory_parses_config() {
        let factory = MemoryStorageFactory;
        assert!(factory.create(&serde_json::Value::Null).is_ok());
        assert!(factory.create(&serde_json::json!({ "max_keys": 10 })).is_ok());
        let err = factory
            .create(&serde_json::json!({ "max_keys": "many" }))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
