use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;

/// Key-value table storage. One instance per (topic, partition) replica.
///
/// Populated by table-replica consumers; read and written directly by
/// the processing logic and by the test driver.
pub trait TableStorage: Send + Sync {
    /// Current bytes for `key`, `None` if absent.
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>>;

    fn has(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>>;

    fn set(&self, key: &str, value: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;

    /// Snapshot of every entry, ordered by key.
    fn iter(&self) -> Pin<Box<dyn Future<Output = Result<Vec<(String, Vec<u8>)>, Error>> + Send + '_>>;

    /// Record the last log offset applied to this replica.
    fn set_offset(&self, offset: u64) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;

    /// Last applied log offset, `None` if nothing was applied yet.
    fn offset(&self) -> Pin<Box<dyn Future<Output = Result<Option<u64>, Error>> + Send + '_>>;

    /// Delete every key. Default: iterate and delete one by one.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            for (key, _) in self.iter().await? {
                self.delete(&key).await?;
            }
            Ok(())
        })
    }
}

/// Creates storage instances from a JSON config.
///
/// Implementations: MemoryStorageFactory (built-in).
pub trait StorageFactory: Send + Sync {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn TableStorage>, Error>;
}

/// Storage builder handed to the processing logic: one fresh storage per
/// (topic, partition) request.
pub trait StorageBuilder: Send + Sync {
    fn build(&self, topic: &str, partition: i32) -> Result<Arc<dyn TableStorage>, Error>;
}
