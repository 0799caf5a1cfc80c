use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use tester_api::{Message, ProcessContext, Processor, Producer, Record, StartOffset, TableStorage};

use crate::codecs::CodecRegistry;
use crate::error::EngineError;
use crate::stream::StreamLog;

// ═══════════════════════════════════════════════════════════════
//  Consumer roles and states
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerKind {
    /// Replays the whole log into one table storage replica.
    TableReplica,
    /// Sees only records appended after registration (unless rewound) and
    /// hands them to the processing logic.
    Group,
}

impl ConsumerKind {
    pub fn default_start(self) -> StartOffset {
        match self {
            ConsumerKind::TableReplica => StartOffset::Oldest,
            ConsumerKind::Group => StartOffset::Newest,
        }
    }
}

/// `Registered` → `Idle` (initialized) → `Idle ⇄ Delivering`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    Registered,
    Idle,
    Delivering,
    /// The owning component's setup failed; the consumer never delivers.
    Failed(String),
}

/// What a consumer does with each record.
pub(crate) enum Destination {
    Table(Arc<dyn TableStorage>),
    Processor {
        processor: Arc<dyn Processor>,
        producer: Arc<dyn Producer>,
    },
}

impl Destination {
    fn kind(&self) -> ConsumerKind {
        match self {
            Destination::Table(_) => ConsumerKind::TableReplica,
            Destination::Processor { .. } => ConsumerKind::Group,
        }
    }
}

/// Shared by every consumer task of one Tester.
#[derive(Clone)]
pub(crate) struct SpawnContext {
    pub codecs: Arc<CodecRegistry>,
    pub token: CancellationToken,
    pub dispatch: Dispatch,
}

// ═══════════════════════════════════════════════════════════════
//  Handle / InitSignal
// ═══════════════════════════════════════════════════════════════

enum Command {
    Deliver(oneshot::Sender<Result<usize, EngineError>>),
}

/// Roster entry of a stream: talks to the consumer task.
#[derive(Clone)]
pub(crate) struct ConsumerHandle {
    label: Arc<str>,
    kind: ConsumerKind,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConsumerState>,
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        self.state.borrow().clone()
    }

    /// Deliver every unread record; returns how many were delivered.
    /// Consumers that are not initialized yet deliver nothing.
    pub async fn deliver_pending(&self) -> Result<usize, EngineError> {
        match self.state() {
            ConsumerState::Registered => return Ok(0),
            ConsumerState::Failed(reason) => {
                return Err(EngineError::ConsumerFailed {
                    consumer: self.label.to_string(),
                    reason,
                });
            }
            ConsumerState::Idle | ConsumerState::Delivering => {}
        }
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Deliver(tx))
            .await
            .map_err(|_| EngineError::ConsumerGone(self.label.to_string()))?;
        rx.await
            .map_err(|_| EngineError::ConsumerGone(self.label.to_string()))?
    }

    /// Block until the owning component signalled readiness.
    pub async fn wait_initialized(&self) -> Result<(), EngineError> {
        wait_ready(&self.label, &self.state).await
    }
}

async fn wait_ready(label: &str, state: &watch::Receiver<ConsumerState>) -> Result<(), EngineError> {
    let mut state = state.clone();
    let result = state
        .wait_for(|s| *s != ConsumerState::Registered)
        .await
        .map(|s| s.clone());
    match result {
        Ok(ConsumerState::Failed(reason)) => Err(EngineError::ConsumerFailed {
            consumer: label.to_string(),
            reason,
        }),
        Ok(_) => Ok(()),
        Err(_) => Err(EngineError::ConsumerGone(label.to_string())),
    }
}

/// Readiness of a component that owns no stream position itself, such as
/// a processor's one-time setup.
#[derive(Debug, Clone)]
pub(crate) struct Startup {
    label: Arc<str>,
    state: watch::Receiver<ConsumerState>,
}

impl Startup {
    pub async fn wait(&self) -> Result<(), EngineError> {
        wait_ready(&self.label, &self.state).await
    }
}

/// Held by the component that owns a consumer; flips it out of `Registered`.
#[derive(Clone)]
pub(crate) struct InitSignal {
    label: Arc<str>,
    state: Arc<watch::Sender<ConsumerState>>,
}

impl InitSignal {
    pub fn standalone(label: impl Into<Arc<str>>) -> (InitSignal, Startup) {
        let label = label.into();
        let (tx, rx) = watch::channel(ConsumerState::Registered);
        let signal = InitSignal {
            label: label.clone(),
            state: Arc::new(tx),
        };
        (signal, Startup { label, state: rx })
    }

    pub fn ready(&self) {
        self.state.send_if_modified(|s| {
            if *s == ConsumerState::Registered {
                *s = ConsumerState::Idle;
                true
            } else {
                false
            }
        });
        tracing::debug!(consumer = %self.label, "consumer initialized");
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(consumer = %self.label, %reason, "consumer initialization failed");
        self.state.send_replace(ConsumerState::Failed(reason));
    }
}

/// Resolves a set of signals once. Dropped unresolved (panic or
/// cancellation of the setup future) it fails them all.
pub(crate) struct InitGuard {
    signals: Vec<InitSignal>,
    done: bool,
}

impl InitGuard {
    pub fn new(signals: Vec<InitSignal>) -> Self {
        Self { signals, done: false }
    }

    pub fn complete(mut self, result: Result<(), String>) {
        for signal in &self.signals {
            match &result {
                Ok(()) => signal.ready(),
                Err(reason) => signal.fail(reason.clone()),
            }
        }
        self.done = true;
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if !self.done {
            for signal in &self.signals {
                signal.fail("initialization aborted");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer task
// ═══════════════════════════════════════════════════════════════

struct ConsumerTask {
    label: Arc<str>,
    log: Arc<StreamLog>,
    next_offset: u64,
    destination: Destination,
    codecs: Arc<CodecRegistry>,
    state: Arc<watch::Sender<ConsumerState>>,
}

/// Spawn a consumer task on `log` and return its roster handle plus the
/// signal that initializes it.
pub(crate) fn spawn_consumer(
    label: String,
    log: Arc<StreamLog>,
    destination: Destination,
    start: StartOffset,
    ctx: &SpawnContext,
) -> Result<(ConsumerHandle, InitSignal), EngineError> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| EngineError::Config(format!("consumer '{label}' needs a tokio runtime: {e}")))?;

    let kind = destination.kind();
    let next_offset = match start {
        StartOffset::Oldest => 0,
        StartOffset::Newest => log.len(),
        StartOffset::At(offset) => offset,
    };
    let label: Arc<str> = Arc::from(label);
    let (state_tx, state_rx) = watch::channel(ConsumerState::Registered);
    let state_tx = Arc::new(state_tx);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    let task = ConsumerTask {
        label: label.clone(),
        log,
        next_offset,
        destination,
        codecs: ctx.codecs.clone(),
        state: state_tx.clone(),
    };
    runtime.spawn(task.run(cmd_rx, ctx.token.clone()).with_subscriber(ctx.dispatch.clone()));

    tracing::debug!(consumer = %label, ?kind, next_offset, "consumer registered");

    let handle = ConsumerHandle {
        label: label.clone(),
        kind,
        commands: cmd_tx,
        state: state_rx,
    };
    Ok((handle, InitSignal { label, state: state_tx }))
}

impl ConsumerTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Deliver(reply)) => {
                            let result = self.deliver_pending().await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
            }
        }
        tracing::debug!(consumer = %self.label, "consumer stopped");
    }

    async fn deliver_pending(&mut self) -> Result<usize, EngineError> {
        let records = self.log.read_from(self.next_offset);
        if records.is_empty() {
            return Ok(0);
        }

        self.state.send_replace(ConsumerState::Delivering);
        let mut result = Ok(records.len());
        for record in &records {
            // Advance first: a failed record is never delivered again.
            self.next_offset = record.offset + 1;
            if let Err(e) = self.apply(record).await {
                result = Err(e);
                break;
            }
        }
        self.state.send_replace(ConsumerState::Idle);

        if let Ok(delivered) = result {
            tracing::trace!(consumer = %self.label, delivered, next_offset = self.next_offset, "delivered");
        }
        result
    }

    async fn apply(&self, record: &Record) -> Result<(), EngineError> {
        let topic = self.log.topic();
        match &self.destination {
            Destination::Table(storage) => {
                let storage_err = |source: tester_api::Error| EngineError::Storage { topic: topic.to_string(), source };
                match &record.value {
                    Some(bytes) => {
                        if let Some(codec) = self.codecs.get(topic) {
                            codec.decode(bytes).map_err(|source| EngineError::Codec {
                                topic: topic.to_string(),
                                source,
                            })?;
                        }
                        storage.set(&record.key, bytes.clone()).await.map_err(storage_err)?;
                    }
                    None => storage.delete(&record.key).await.map_err(storage_err)?,
                }
                storage.set_offset(record.offset).await.map_err(storage_err)?;
            }
            Destination::Processor { processor, producer } => {
                let codec = self
                    .codecs
                    .get(topic)
                    .ok_or_else(|| EngineError::NoCodec(topic.to_string()))?;
                let value = match &record.value {
                    Some(bytes) => Some(codec.decode(bytes).map_err(|source| EngineError::Codec {
                        topic: topic.to_string(),
                        source,
                    })?),
                    None => None,
                };
                let message = Message {
                    topic: topic.to_string(),
                    offset: record.offset,
                    key: record.key.clone(),
                    raw: record.value.clone(),
                    value,
                };
                let ctx = ProcessContext::new(topic, producer.as_ref());
                processor
                    .process(&ctx, &message)
                    .await
                    .map_err(|source| EngineError::Processor {
                        topic: topic.to_string(),
                        offset: record.offset,
                        source,
                    })?;
            }
        }
        tracing::trace!(consumer = %self.label, key = %record.key, offset = record.offset, "applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_memory::MemoryStorage;

    fn ctx() -> SpawnContext {
        SpawnContext {
            codecs: Arc::new(CodecRegistry::new()),
            token: CancellationToken::new(),
            dispatch: Dispatch::none(),
        }
    }

    #[tokio::test]
    async fn replica_applies_sets_and_deletes_in_order() {
        let ctx = ctx();
        let log = Arc::new(StreamLog::new("users"));
        log.append("u1", Some(b"ada".to_vec()));
        log.append("u2", Some(b"bob".to_vec()));
        log.append("u1", None);

        let storage = Arc::new(MemoryStorage::default());
        let (handle, signal) = spawn_consumer(
            "users#replica0".into(),
            log.clone(),
            Destination::Table(storage.clone()),
            StartOffset::Oldest,
            &ctx,
        )
        .unwrap();

        // not initialized yet: nothing is delivered
        assert_eq!(handle.deliver_pending().await.unwrap(), 0);
        signal.ready();
        handle.wait_initialized().await.unwrap();

        assert_eq!(handle.deliver_pending().await.unwrap(), 3);
        assert_eq!(handle.deliver_pending().await.unwrap(), 0);
        assert_eq!(storage.get("u1").await.unwrap(), None);
        assert_eq!(storage.get("u2").await.unwrap(), Some(b"bob".to_vec()));
        assert_eq!(storage.offset().await.unwrap(), Some(2));

        log.append("u3", Some(b"cy".to_vec()));
        assert_eq!(handle.deliver_pending().await.unwrap(), 1);
        assert_eq!(handle.state(), ConsumerState::Idle);
    }

    #[tokio::test]
    async fn newest_start_skips_history() {
        let ctx = ctx();
        let log = Arc::new(StreamLog::new("clicks"));
        log.append("c1", None);
        let storage = Arc::new(MemoryStorage::default());
        let (handle, signal) = spawn_consumer(
            "g/clicks".into(),
            log.clone(),
            Destination::Table(storage.clone()),
            StartOffset::Newest,
            &ctx,
        )
        .unwrap();
        signal.ready();
        assert_eq!(handle.deliver_pending().await.unwrap(), 0);
        log.append("c2", Some(b"x".to_vec()));
        assert_eq!(handle.deliver_pending().await.unwrap(), 1);
        assert!(!storage.has("c1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_or_dropped_init_is_reported() {
        let ctx = ctx();
        let log = Arc::new(StreamLog::new("t"));
        let storage = Arc::new(MemoryStorage::default());
        let (handle, signal) =
            spawn_consumer("t#replica0".into(), log, Destination::Table(storage), StartOffset::Oldest, &ctx)
                .unwrap();
        let (standalone, startup) = InitSignal::standalone("group");

        drop(InitGuard::new(vec![signal, standalone]));

        let err = handle.wait_initialized().await.unwrap_err();
        assert!(matches!(err, EngineError::ConsumerFailed { ref reason, .. } if reason == "initialization aborted"));
        assert!(matches!(startup.wait().await, Err(EngineError::ConsumerFailed { .. })));
        assert!(matches!(handle.deliver_pending().await, Err(EngineError::ConsumerFailed { .. })));
    }

    #[tokio::test]
    async fn cancelled_consumer_is_gone() {
        let ctx = ctx();
        let log = Arc::new(StreamLog::new("t"));
        log.append("k", None);
        let storage = Arc::new(MemoryStorage::default());
        let (handle, signal) =
            spawn_consumer("t#replica0".into(), log, Destination::Table(storage), StartOffset::Oldest, &ctx)
                .unwrap();
        signal.ready();
        ctx.token.cancel();
        assert!(matches!(handle.deliver_pending().await, Err(EngineError::ConsumerGone(_))));
    }
}
