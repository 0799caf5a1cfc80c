use tokio::sync::{mpsc, Mutex, MutexGuard};

/// A publish that has not been appended to its stream yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub topic: String,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// FIFO shared by test-driver injections and processor publishes.
///
/// Pushing never blocks. Draining requires the receiver lock, so only one
/// drain runs at a time.
#[derive(Debug)]
pub struct PendingQueue {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<QueuedMessage>>,
}

impl Default for PendingQueue {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Mutex::new(rx) }
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<QueuedMessage> {
        self.tx.clone()
    }

    pub fn push(&self, message: QueuedMessage) {
        // The receiver lives as long as the queue itself.
        let _ = self.tx.send(message);
    }

    /// Exclusive access to the receiving side for one drain cycle.
    pub async fn lock(&self) -> MutexGuard<'_, mpsc::UnboundedReceiver<QueuedMessage>> {
        self.rx.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(key: &str) -> QueuedMessage {
        QueuedMessage {
            topic: "t".into(),
            key: key.into(),
            value: None,
        }
    }

    #[tokio::test]
    async fn fifo_order_across_senders() {
        let queue = PendingQueue::new();
        let sender = queue.sender();
        queue.push(msg("a"));
        sender.send(msg("b")).unwrap();
        queue.push(msg("c"));

        let mut rx = queue.lock().await;
        let keys: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|m| m.key).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert!(rx.try_recv().is_err());
    }
}
