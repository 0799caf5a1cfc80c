use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use tester_api::{
    Codec, ErrorKind, GroupGraph, InitContext, Processor, Producer, StorageBuilder, StorageFactory, TableStorage,
    TopicManager,
};

use crate::codecs::CodecRegistry;
use crate::consumer::{spawn_consumer, ConsumerKind, Destination, InitGuard, InitSignal, SpawnContext, Startup};
use crate::error::EngineError;
use crate::lock::lock;
use crate::mocks::{ProducerMock, TopicManagerMock};
use crate::queue::{PendingQueue, QueuedMessage};
use crate::storages::{StorageRegistry, TesterStorageBuilder};
use crate::stream::StreamRegistry;

/// Injection and drain engine: owns the streams, their consumers, the
/// pending queue and the table storages of one Tester.
pub struct Engine {
    streams: StreamRegistry,
    codecs: Arc<CodecRegistry>,
    storages: StorageRegistry,
    pending: PendingQueue,
    spawn: SpawnContext,

    factory: Arc<dyn StorageFactory>,
    storage_config: serde_json::Value,

    producer: Arc<ProducerMock>,
    topic_manager: Arc<TopicManagerMock>,
    storage_builder: Arc<TesterStorageBuilder>,

    /// One entry per registered group graph: its processor's setup.
    startups: Mutex<Vec<Startup>>,
}

impl Engine {
    pub fn new(dispatch: Dispatch, factory: Arc<dyn StorageFactory>, storage_config: serde_json::Value) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let codecs = Arc::new(CodecRegistry::new());
            let pending = PendingQueue::new();
            let producer = Arc::new(ProducerMock::new(pending.sender()));
            Engine {
                streams: StreamRegistry::new(),
                codecs: codecs.clone(),
                storages: StorageRegistry::new(),
                pending,
                spawn: SpawnContext {
                    codecs,
                    token: CancellationToken::new(),
                    dispatch,
                },
                factory,
                storage_config,
                producer,
                topic_manager: Arc::new(TopicManagerMock),
                storage_builder: Arc::new(TesterStorageBuilder::new(weak.clone())),
                startups: Mutex::new(Vec::new()),
            }
        })
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn producer_mock(&self) -> &ProducerMock {
        &self.producer
    }

    pub fn producer(&self) -> Arc<dyn Producer> {
        self.producer.clone()
    }

    pub fn topic_manager(&self) -> Arc<dyn TopicManager> {
        self.topic_manager.clone()
    }

    pub fn storage_builder(&self) -> Arc<dyn StorageBuilder> {
        self.storage_builder.clone()
    }

    /// Stop every consumer task.
    pub fn shutdown(&self) {
        if !self.spawn.token.is_cancelled() {
            tracing::debug!("shutting down consumers");
            self.spawn.token.cancel();
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  Registration
    // ═══════════════════════════════════════════════════════════════

    /// Register the codecs and streams of `graph`, bind group consumers to
    /// its input and loop streams and start the processor's setup.
    pub fn register_group_graph(&self, graph: &GroupGraph, processor: Arc<dyn Processor>) -> Result<(), EngineError> {
        let group = graph.group();
        tracing::info!(group, "registering group graph");

        // Tables: codec and stream only. Replica consumers are bound when
        // the processor builds its storages.
        let tables = graph
            .group_table()
            .into_iter()
            .chain(graph.joint_tables())
            .chain(graph.lookup_tables());
        for edge in tables {
            self.codecs.register(edge.topic(), edge.codec())?;
            self.streams.get_or_create(edge.topic());
        }

        for edge in graph.output_streams() {
            self.codecs.register(edge.topic(), edge.codec())?;
        }

        let mut signals = Vec::new();
        for edge in graph.input_streams().iter().chain(graph.loop_stream()) {
            self.codecs.register(edge.topic(), edge.codec())?;
            let stream = self.streams.get_or_create(edge.topic());
            let (handle, signal) = spawn_consumer(
                format!("{group}/{}", edge.topic()),
                stream.log().clone(),
                Destination::Processor {
                    processor: processor.clone(),
                    producer: self.producer(),
                },
                graph.start_offset(),
                &self.spawn,
            )?;
            stream.register_consumer(handle);
            signals.push(signal);
        }

        let (signal, startup) = InitSignal::standalone(group);
        signals.push(signal);
        lock(&self.startups, "startups").push(startup);

        let ctx = InitContext {
            producer: self.producer(),
            topic_manager: self.topic_manager(),
            storage_builder: self.storage_builder(),
        };
        let guard = InitGuard::new(signals);
        let group = group.to_string();
        let setup = async move {
            let result = processor.init(&ctx).await;
            if let Err(e) = &result {
                tracing::error!(group = %group, error = %e, "processor init failed");
            }
            guard.complete(result.map_err(|e| e.to_string()));
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Config(format!("group '{}' needs a tokio runtime: {e}", graph.group())))?;
        runtime.spawn(setup.with_subscriber(self.spawn.dispatch.clone()));
        Ok(())
    }

    /// Create a fresh storage replica of `topic` and bind a table-replica
    /// consumer to it. The consumer is initialized right away.
    pub fn build_storage(&self, topic: &str, partition: i32) -> Result<Arc<dyn TableStorage>, EngineError> {
        let storage = self
            .factory
            .create(&self.storage_config)
            .map_err(|source| match source.kind() {
                ErrorKind::Config => EngineError::Config(format!("storage for '{topic}': {source}")),
                _ => EngineError::Storage {
                    topic: topic.to_string(),
                    source,
                },
            })?;
        let replica = self.storages.add(topic, storage.clone());
        let stream = self.streams.get_or_create(topic);
        let (handle, signal) = spawn_consumer(
            format!("{topic}#replica{replica}"),
            stream.log().clone(),
            Destination::Table(storage.clone()),
            ConsumerKind::TableReplica.default_start(),
            &self.spawn,
        )?;
        stream.register_consumer(handle);
        signal.ready();
        tracing::debug!(topic, partition, replica, "table storage built");
        Ok(storage)
    }

    /// Startup barrier: every processor setup finished and every consumer
    /// registered so far is initialized.
    pub async fn wait_startup(&self) -> Result<(), EngineError> {
        let startups = lock(&self.startups, "startups").clone();
        for startup in &startups {
            startup.wait().await?;
        }
        for stream in self.streams.snapshot() {
            stream.wait_consumers_initialized().await?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════
    //  Injection / drain
    // ═══════════════════════════════════════════════════════════════

    /// Append one record to `topic` and return once it and everything it
    /// cascades into has been delivered.
    pub async fn inject(&self, topic: &str, key: &str, value: Option<Vec<u8>>) -> Result<(), EngineError> {
        let declared = self.codecs.contains(topic)
            || self.streams.get(topic).is_some_and(|s| s.consumer_count() > 0);
        if !declared {
            return Err(EngineError::UnknownTopic(topic.to_string()));
        }
        self.wait_startup().await?;

        tracing::debug!(topic, key, tombstone = value.is_none(), "inject");
        self.pending.push(QueuedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            value,
        });
        self.drain().await
    }

    /// Wait for startup and deliver whatever is unread (replica catch-up,
    /// rewound group consumers) without injecting anything.
    pub async fn settle(&self) -> Result<(), EngineError> {
        self.wait_startup().await?;
        self.drain().await
    }

    /// Pop one pending message at a time, append it, and sweep to
    /// convergence before popping the next. Emits made during a sweep join
    /// the back of the queue.
    async fn drain(&self) -> Result<(), EngineError> {
        let mut rx = self.pending.lock().await;
        let mut result = self.converge().await;
        while result.is_ok() {
            let Ok(message) = rx.try_recv() else { break };
            let stream = self.streams.get_or_create(&message.topic);
            let offset = stream.log().append(&message.key, message.value);
            tracing::debug!(topic = %message.topic, key = %message.key, offset, "appended");
            result = self.converge().await;
        }

        if result.is_err() {
            let dropped = std::iter::from_fn(|| rx.try_recv().ok()).count();
            if dropped > 0 {
                tracing::warn!(dropped, "discarding pending messages after failed delivery");
            }
        }
        result
    }

    /// Sweep all streams in topic order until one sweep delivers nothing.
    async fn converge(&self) -> Result<(), EngineError> {
        let mut sweeps = 0u64;
        loop {
            let mut delivered = 0;
            for stream in self.streams.snapshot() {
                delivered += stream.deliver_pending().await?;
            }
            sweeps += 1;
            if delivered == 0 {
                if sweeps > 1 {
                    tracing::trace!(sweeps, "converged");
                }
                return Ok(());
            }
            tracing::trace!(delivered, "sweep");
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  Codecs / tables
    // ═══════════════════════════════════════════════════════════════

    pub fn codec(&self, topic: &str) -> Result<Arc<dyn Codec>, EngineError> {
        self.codecs
            .get(topic)
            .ok_or_else(|| EngineError::NoCodec(topic.to_string()))
    }

    pub fn encode(&self, topic: &str, value: &serde_json::Value) -> Result<Vec<u8>, EngineError> {
        self.codec(topic)?
            .encode(value)
            .map_err(|source| EngineError::Codec {
                topic: topic.to_string(),
                source,
            })
    }

    pub fn decode(&self, topic: &str, data: &[u8]) -> Result<serde_json::Value, EngineError> {
        self.codec(topic)?
            .decode(data)
            .map_err(|source| EngineError::Codec {
                topic: topic.to_string(),
                source,
            })
    }

    /// Decoded value of `key` in the first replica of `topic`.
    pub async fn table_value(&self, topic: &str, key: &str) -> Result<Option<serde_json::Value>, EngineError> {
        let storage = self
            .storages
            .first(topic)
            .ok_or_else(|| EngineError::MissingStorage(topic.to_string()))?;
        let bytes = storage.get(key).await.map_err(|source| EngineError::Storage {
            topic: topic.to_string(),
            source,
        })?;
        bytes.map(|b| self.decode(topic, &b)).transpose()
    }

    /// Write `value` (or delete, for `None`) to every replica of `topic`.
    pub async fn set_table_value(&self, topic: &str, key: &str, value: Option<Vec<u8>>) -> Result<(), EngineError> {
        let replicas = self.storages.replicas(topic);
        if replicas.is_empty() {
            return Err(EngineError::MissingStorage(topic.to_string()));
        }
        for storage in replicas {
            let written = match &value {
                Some(bytes) => storage.set(key, bytes.clone()).await,
                None => storage.delete(key).await,
            };
            written.map_err(|source| EngineError::Storage {
                topic: topic.to_string(),
                source,
            })?;
        }
        tracing::debug!(topic, key, "table value set");
        Ok(())
    }

    /// Delete every key of every replica of every table.
    pub async fn clear_values(&self) -> Result<(), EngineError> {
        for (topic, storage) in self.storages.all() {
            storage.clear().await.map_err(|source| EngineError::Storage { topic, source })?;
        }
        tracing::debug!("table values cleared");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("streams", &self.streams.topics())
            .field("codecs", &self.codecs)
            .field("storages", &self.storages)
            .finish_non_exhaustive()
    }
}
