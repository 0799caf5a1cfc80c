use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tester_api::Record;

use crate::consumer::ConsumerHandle;
use crate::error::EngineError;
use crate::lock::{read, write};

/// Append-only record log of one topic.
///
/// Offsets are the positions in `records`: strictly increasing, no gaps.
#[derive(Debug)]
pub struct StreamLog {
    topic: String,
    records: RwLock<Vec<Record>>,
}

impl StreamLog {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append and return the assigned offset.
    pub fn append(&self, key: &str, value: Option<Vec<u8>>) -> u64 {
        let mut records = write(&self.records, "stream log");
        let offset = records.len() as u64;
        records.push(Record {
            offset,
            key: key.to_string(),
            value,
        });
        offset
    }

    /// Snapshot of every record at or after `offset`.
    pub fn read_from(&self, offset: u64) -> Vec<Record> {
        let records = read(&self.records, "stream log");
        usize::try_from(offset)
            .ok()
            .and_then(|start| records.get(start..))
            .map(<[Record]>::to_vec)
            .unwrap_or_default()
    }

    pub fn record_at(&self, offset: u64) -> Option<Record> {
        let records = read(&self.records, "stream log");
        usize::try_from(offset).ok().and_then(|i| records.get(i).cloned())
    }

    /// Number of records, i.e. the offset the next append gets.
    pub fn len(&self) -> u64 {
        read(&self.records, "stream log").len() as u64
    }
}

/// A topic's log plus the consumers registered on it, in registration order.
#[derive(Debug)]
pub struct Stream {
    log: Arc<StreamLog>,
    consumers: RwLock<Vec<ConsumerHandle>>,
}

impl Stream {
    fn new(topic: &str) -> Self {
        Self {
            log: Arc::new(StreamLog::new(topic)),
            consumers: RwLock::new(Vec::new()),
        }
    }

    pub fn topic(&self) -> &str {
        self.log.topic()
    }

    pub fn log(&self) -> &Arc<StreamLog> {
        &self.log
    }

    pub(crate) fn register_consumer(&self, handle: ConsumerHandle) {
        write(&self.consumers, "consumer roster").push(handle);
    }

    pub(crate) fn consumers(&self) -> Vec<ConsumerHandle> {
        read(&self.consumers, "consumer roster").clone()
    }

    pub fn consumer_count(&self) -> usize {
        read(&self.consumers, "consumer roster").len()
    }

    /// Let every consumer read its unread records, one consumer at a time.
    pub(crate) async fn deliver_pending(&self) -> Result<usize, EngineError> {
        let mut delivered = 0;
        for consumer in self.consumers() {
            delivered += consumer.deliver_pending().await?;
        }
        Ok(delivered)
    }

    /// Startup barrier: every consumer registered so far is initialized.
    pub(crate) async fn wait_consumers_initialized(&self) -> Result<(), EngineError> {
        for consumer in self.consumers() {
            consumer.wait_initialized().await?;
        }
        Ok(())
    }
}

/// Arena of streams keyed by topic. Streams are created lazily and never
/// removed; iteration is in topic order.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<BTreeMap<String, Arc<Stream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic: &str) -> Option<Arc<Stream>> {
        read(&self.streams, "stream registry").get(topic).cloned()
    }

    /// Race-free create-if-absent.
    pub fn get_or_create(&self, topic: &str) -> Arc<Stream> {
        if let Some(stream) = self.get(topic) {
            return stream;
        }
        let mut streams = write(&self.streams, "stream registry");
        streams
            .entry(topic.to_string())
            .or_insert_with(|| {
                tracing::debug!(topic, "stream created");
                Arc::new(Stream::new(topic))
            })
            .clone()
    }

    /// Every stream, in topic order.
    pub fn snapshot(&self) -> Vec<Arc<Stream>> {
        read(&self.streams, "stream registry").values().cloned().collect()
    }

    pub fn topics(&self) -> Vec<String> {
        read(&self.streams, "stream registry").keys().cloned().collect()
    }
}
