use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use tester_api::{EmitHandler, Error, Producer, Promise, TopicManager};

use crate::lock::{read, write};
use crate::queue::QueuedMessage;

// ═══════════════════════════════════════════════════════════════
//  Producer
// ═══════════════════════════════════════════════════════════════

/// Producer handed to processors. Every emit goes through the current
/// handler; the default one appends to the pending queue.
pub struct ProducerMock {
    handler: RwLock<EmitHandler>,
    default: EmitHandler,
}

impl ProducerMock {
    pub fn new(queue: mpsc::UnboundedSender<QueuedMessage>) -> Self {
        let default: EmitHandler = Arc::new(move |topic: &str, key: &str, value: Option<Vec<u8>>| {
            tracing::trace!(topic, key, tombstone = value.is_none(), "emit queued");
            let message = QueuedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                value,
            };
            match queue.send(message) {
                Ok(()) => Promise::finished(Ok(())),
                Err(_) => Promise::finished(Err(Error::engine(format!(
                    "emit to '{topic}' after the tester was dropped"
                )))),
            }
        });
        Self {
            handler: RwLock::new(default.clone()),
            default,
        }
    }

    /// Install `handler` for every following emit; returns the previous one.
    pub fn replace_handler(&self, handler: EmitHandler) -> EmitHandler {
        std::mem::replace(&mut *write(&self.handler, "emit handler"), handler)
    }

    /// The queueing handler, for overrides that delegate some emits.
    pub fn default_handler(&self) -> EmitHandler {
        self.default.clone()
    }
}

impl Producer for ProducerMock {
    fn emit(&self, topic: &str, key: &str, value: Option<Vec<u8>>) -> Promise {
        // Clone out so a handler may replace itself.
        let handler = read(&self.handler, "emit handler").clone();
        handler(topic, key, value)
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic manager
// ═══════════════════════════════════════════════════════════════

/// Every topic exists and has exactly one partition.
#[derive(Debug, Default)]
pub struct TopicManagerMock;

impl TopicManager for TopicManagerMock {
    fn ensure_table_exists(&self, topic: &str, partitions: usize) -> Result<(), Error> {
        tracing::trace!(topic, partitions, "ensure table exists");
        Ok(())
    }

    fn ensure_stream_exists(&self, topic: &str, partitions: usize) -> Result<(), Error> {
        tracing::trace!(topic, partitions, "ensure stream exists");
        Ok(())
    }

    fn partitions(&self, _topic: &str) -> Result<Vec<i32>, Error> {
        Ok(vec![0])
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
