use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::Error;

/// Completion signal of an emit. Resolves once with success or failure.
#[derive(Debug)]
pub struct Promise {
    rx: oneshot::Receiver<Result<(), Error>>,
}

/// Resolving side of a [`Promise`].
#[derive(Debug)]
pub struct PromiseHandle {
    tx: oneshot::Sender<Result<(), Error>>,
}

impl Promise {
    /// Pending promise plus the handle that resolves it.
    pub fn new() -> (PromiseHandle, Promise) {
        let (tx, rx) = oneshot::channel();
        (PromiseHandle { tx }, Promise { rx })
    }

    /// Already resolved promise.
    pub fn finished(result: Result<(), Error>) -> Promise {
        let (handle, promise) = Promise::new();
        handle.finish(result);
        promise
    }

    /// Wait for the outcome. A handle dropped without resolving is an
    /// engine error.
    pub async fn wait(self) -> Result<(), Error> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Error::engine("emit promise dropped before completion")))
    }

    /// Outcome if already resolved, `None` while pending.
    pub fn try_result(&mut self) -> Option<Result<(), Error>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(Error::engine("emit promise dropped before completion")))
            }
        }
    }
}

impl PromiseHandle {
    pub fn finish(self, result: Result<(), Error>) {
        // Receiver may already be gone: the emitter did not care about the outcome.
        let _ = self.tx.send(result);
    }
}

/// Replaceable publish hook: `(topic, key, value) -> completion signal`.
pub type EmitHandler = Arc<dyn Fn(&str, &str, Option<Vec<u8>>) -> Promise + Send + Sync>;

/// Outbound publish service handed to the processing logic.
pub trait Producer: Send + Sync {
    /// Publish to any topic. `value = None` emits a tombstone.
    fn emit(&self, topic: &str, key: &str, value: Option<Vec<u8>>) -> Promise;

    fn close(&self) -> Result<(), Error>;
}

/// Topic administration service handed to the processing logic.
pub trait TopicManager: Send + Sync {
    /// Check that a log-compacted table topic exists, creating it if possible.
    fn ensure_table_exists(&self, topic: &str, partitions: usize) -> Result<(), Error>;

    /// Check that a stream topic exists, creating it if possible.
    fn ensure_stream_exists(&self, topic: &str, partitions: usize) -> Result<(), Error>;

    /// Partitions of `topic` assigned to this process.
    fn partitions(&self, topic: &str) -> Result<Vec<i32>, Error>;

    fn close(&self) -> Result<(), Error>;
}
