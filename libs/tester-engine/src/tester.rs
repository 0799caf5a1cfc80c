use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use tester_api::{
    EmitHandler, ErrorKind, GroupGraph, PanicReporter, Processor, Producer, Reporter, StorageBuilder,
    StorageFactory, TopicManager,
};

use crate::config::TesterConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::tracker::MessageTracker;

/// Route an engine error to the reporter: codec and storage failures fail
/// the test and let it continue, everything else stops it.
pub(crate) fn report(reporter: &dyn Reporter, err: EngineError) {
    match err.kind() {
        ErrorKind::Codec | ErrorKind::Storage => reporter.error(&err.to_string()),
        _ => reporter.fatal(&err.to_string()),
    }
}

/// Test driver over an in-memory stream system.
///
/// Every injecting call returns only after the injected record and
/// everything it cascades into has been delivered to every consumer, so
/// assertions right after it never race background work.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tester_engine::{Tester, TesterConfig};
/// # async fn demo(graph: tester_api::GroupGraph, processor: Arc<dyn tester_api::Processor>) {
/// let tester = Tester::new(TesterConfig::default());
/// tester.register_group_graph(&graph, processor).await;
/// tester.consume_string("orders", "o1", "created").await;
/// assert_eq!(tester.table_value("order-states", "o1").await, Some("created".into()));
/// # }
/// ```
pub struct Tester {
    engine: Arc<Engine>,
    reporter: Arc<dyn Reporter>,
    dispatch: Dispatch,
}

impl std::fmt::Debug for Tester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tester").field("engine", &self.engine).finish_non_exhaustive()
    }
}

/// Builder for a [`Tester`] with a custom reporter or storage backend.
pub struct TesterBuilder {
    config: TesterConfig,
    reporter: Arc<dyn Reporter>,
    storage_factory: Option<Arc<dyn StorageFactory>>,
}

impl TesterBuilder {
    pub fn config(mut self, config: TesterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use `factory` instead of the backend named in the config.
    pub fn storage_factory(mut self, factory: Arc<dyn StorageFactory>) -> Self {
        self.storage_factory = Some(factory);
        self
    }

    /// Build the tester. Invalid configuration is reported as fatal.
    pub fn build(self) -> Tester {
        match self.try_build() {
            Ok(tester) => tester,
            Err(e) => self.reporter.fatal(&e.to_string()),
        }
    }

    fn try_build(&self) -> Result<Tester, EngineError> {
        let dispatch = self.config.log.dispatch()?;
        let factory = match &self.storage_factory {
            Some(factory) => factory.clone(),
            None => self.config.storage.factory()?,
        };
        let engine = Engine::new(dispatch.clone(), factory, self.config.storage.config.clone());
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!(backend = %self.config.storage.backend, "tester created");
        });
        Ok(Tester {
            engine,
            reporter: self.reporter.clone(),
            dispatch,
        })
    }
}

impl Tester {
    pub fn builder() -> TesterBuilder {
        TesterBuilder {
            config: TesterConfig::default(),
            reporter: Arc::new(PanicReporter),
            storage_factory: None,
        }
    }

    /// Tester reporting through [`PanicReporter`].
    pub fn new(config: TesterConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn with_reporter(config: TesterConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self::builder().config(config).reporter(reporter).build()
    }

    /// Run an engine operation under this tester's log sink and report its
    /// error, if any.
    async fn run<T, F>(&self, op: F) -> Option<T>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let logged = async {
            let result = op.await;
            if let Err(e) = &result {
                tracing::error!(kind = %e.kind(), error = %e, "operation failed");
            }
            result
        };
        match logged.with_subscriber(self.dispatch.clone()).await {
            Ok(value) => Some(value),
            Err(e) => {
                report(self.reporter.as_ref(), e);
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  Registration
    // ═══════════════════════════════════════════════════════════════

    /// Declare a group's topics and start `processor` on its input and loop
    /// streams. Returns once the processor's setup finished.
    pub async fn register_group_graph(&self, graph: &GroupGraph, processor: Arc<dyn Processor>) {
        self.run(async {
            self.engine.register_group_graph(graph, processor)?;
            self.engine.settle().await
        })
        .await;
    }

    // ═══════════════════════════════════════════════════════════════
    //  Injection
    // ═══════════════════════════════════════════════════════════════

    /// Encode `value` with the topic's codec and inject it. A value that
    /// serializes to `null` is a tombstone.
    pub async fn consume<V: Serialize>(&self, topic: &str, key: &str, value: V) {
        self.run(async {
            let value = serde_json::to_value(value).map_err(|e| EngineError::Codec {
                topic: topic.to_string(),
                source: e.into(),
            })?;
            let bytes = match value {
                serde_json::Value::Null => None,
                value => Some(self.engine.encode(topic, &value)?),
            };
            self.engine.inject(topic, key, bytes).await
        })
        .await;
    }

    pub async fn consume_string(&self, topic: &str, key: &str, value: &str) {
        self.consume(topic, key, value).await;
    }

    /// Inject pre-encoded bytes, bypassing the codec.
    pub async fn consume_data(&self, topic: &str, key: &str, data: Vec<u8>) {
        self.run(self.engine.inject(topic, key, Some(data))).await;
    }

    pub async fn consume_tombstone(&self, topic: &str, key: &str) {
        self.run(self.engine.inject(topic, key, None)).await;
    }

    // ═══════════════════════════════════════════════════════════════
    //  Tables
    // ═══════════════════════════════════════════════════════════════

    /// Decoded value of `key` in the first replica of table `topic`.
    pub async fn table_value(&self, topic: &str, key: &str) -> Option<serde_json::Value> {
        self.run(async {
            self.engine.settle().await?;
            self.engine.table_value(topic, key).await
        })
        .await
        .flatten()
    }

    /// `table_value` deserialized into `T`.
    pub async fn table_value_as<T: DeserializeOwned>(&self, topic: &str, key: &str) -> Option<T> {
        let value = self.table_value(topic, key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                report(
                    self.reporter.as_ref(),
                    EngineError::Codec {
                        topic: topic.to_string(),
                        source: e.into(),
                    },
                );
                None
            }
        }
    }

    /// Write `value` to every replica of table `topic`, bypassing the
    /// stream. `null` deletes the key.
    pub async fn set_table_value<V: Serialize>(&self, topic: &str, key: &str, value: V) {
        self.run(async {
            self.engine.settle().await?;
            let value = serde_json::to_value(value).map_err(|e| EngineError::Codec {
                topic: topic.to_string(),
                source: e.into(),
            })?;
            let bytes = match value {
                serde_json::Value::Null => None,
                value => Some(self.engine.encode(topic, &value)?),
            };
            self.engine.set_table_value(topic, key, bytes).await
        })
        .await;
    }

    /// Empty every table storage. Streams keep their history.
    pub async fn clear_values(&self) {
        self.run(async {
            self.engine.settle().await?;
            self.engine.clear_values().await
        })
        .await;
    }

    // ═══════════════════════════════════════════════════════════════
    //  Emit hook / tracking
    // ═══════════════════════════════════════════════════════════════

    /// Route every following processor emit through `handler`. The handler
    /// decides whether the message is queued at all.
    pub fn replace_emit_handler(&self, handler: EmitHandler) {
        self.engine.producer_mock().replace_handler(handler);
    }

    /// The queueing handler, for overrides that delegate some emits.
    pub fn default_emit_handler(&self) -> EmitHandler {
        self.engine.producer_mock().default_handler()
    }

    /// Tracker anchored at the current end of every stream. Waits for every
    /// processor setup first, so records appended during setup are not
    /// reported as unseen.
    pub async fn new_message_tracker(&self) -> MessageTracker {
        self.run(self.engine.wait_startup()).await;
        MessageTracker::new(self.engine.clone(), self.reporter.clone())
    }

    // ═══════════════════════════════════════════════════════════════
    //  Collaborator services
    // ═══════════════════════════════════════════════════════════════

    pub fn producer(&self) -> Arc<dyn Producer> {
        self.engine.producer()
    }

    pub fn topic_manager(&self) -> Arc<dyn TopicManager> {
        self.engine.topic_manager()
    }

    pub fn storage_builder(&self) -> Arc<dyn StorageBuilder> {
        self.engine.storage_builder()
    }

    /// Stop every consumer task. Later injections report the consumers as
    /// gone.
    pub fn shutdown(&self) {
        tracing::dispatcher::with_default(&self.dispatch, || self.engine.shutdown());
    }
}

impl Drop for Tester {
    fn drop(&mut self) {
        self.shutdown();
    }
}
