use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::producer::{Producer, Promise, TopicManager};
use crate::record::Message;
use crate::storage::StorageBuilder;

/// Services handed to the processing logic once, before any delivery.
///
/// Mock instances that route everything back into the harness.
#[derive(Clone)]
pub struct InitContext {
    pub producer: Arc<dyn Producer>,
    pub topic_manager: Arc<dyn TopicManager>,
    pub storage_builder: Arc<dyn StorageBuilder>,
}

/// Context of a single delivery.
pub struct ProcessContext<'a> {
    topic: &'a str,
    producer: &'a dyn Producer,
}

impl<'a> ProcessContext<'a> {
    pub fn new(topic: &'a str, producer: &'a dyn Producer) -> Self {
        Self { topic, producer }
    }

    /// Topic the current message was read from.
    pub fn topic(&self) -> &str {
        self.topic
    }

    /// Publish through the harness' publish hook.
    pub fn emit(&self, topic: &str, key: &str, value: Option<Vec<u8>>) -> Promise {
        self.producer.emit(topic, key, value)
    }
}

/// The processing logic under test.
///
/// Called synchronously per record: the harness waits for `process` to
/// return before delivering the next record of the same stream.
pub trait Processor: Send + Sync {
    /// One-time setup (build storages, check topics). Consumers of this
    /// processor count as initialized once it returns `Ok`.
    fn init<'a>(
        &'a self,
        _ctx: &'a InitContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    /// Handle a record delivered from an input or loop stream.
    fn process<'a>(
        &'a self,
        ctx: &'a ProcessContext<'a>,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}
