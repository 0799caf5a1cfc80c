use std::collections::HashMap;
use std::sync::Arc;

use tester_api::{Record, Reporter};

use crate::engine::Engine;
use crate::stream::StreamLog;
use crate::tester::report;

/// Cursor over every stream, used to assert on records appended after a
/// point in time. Independent of table storage.
///
/// Baselines only move through `move_to_end*` or by consuming records.
/// Topics the tracker has not seen yet start at offset 0.
pub struct MessageTracker {
    engine: Arc<Engine>,
    reporter: Arc<dyn Reporter>,
    offsets: HashMap<String, u64>,
}

impl std::fmt::Debug for MessageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTracker").field("offsets", &self.offsets).finish()
    }
}

impl MessageTracker {
    pub(crate) fn new(engine: Arc<Engine>, reporter: Arc<dyn Reporter>) -> Self {
        let mut tracker = Self {
            engine,
            reporter,
            offsets: HashMap::new(),
        };
        tracker.move_to_end_all();
        tracker
    }

    /// Skip everything appended to `topic` so far.
    pub fn move_to_end(&mut self, topic: &str) {
        let end = self.engine.streams().get(topic).map_or(0, |s| s.log().len());
        self.offsets.insert(topic.to_string(), end);
    }

    /// `move_to_end` for every known stream.
    pub fn move_to_end_all(&mut self) {
        for stream in self.engine.streams().snapshot() {
            self.offsets.insert(stream.topic().to_string(), stream.log().len());
        }
    }

    /// Offset of the next record the tracker has not seen on `topic`.
    pub fn offset(&self, topic: &str) -> u64 {
        self.offsets.get(topic).copied().unwrap_or(0)
    }

    /// Records of `topic` after the baseline. Lazy: records appended while
    /// iterating are picked up, and each yielded record advances the
    /// baseline.
    pub fn unseen(&mut self, topic: &str) -> Unseen<'_> {
        let log = self.engine.streams().get(topic).map(|s| s.log().clone());
        let offset = self.offsets.entry(topic.to_string()).or_insert(0);
        Unseen { log, offset }
    }

    /// Next unseen record of `topic` as `(key, decoded value)`. The value is
    /// `None` for tombstones.
    pub fn next_message(&mut self, topic: &str) -> Option<(String, Option<serde_json::Value>)> {
        let record = self.unseen(topic).next()?;
        let Some(bytes) = record.value else {
            return Some((record.key, None));
        };
        match self.engine.decode(topic, &bytes) {
            Ok(value) => Some((record.key, Some(value))),
            Err(e) => {
                report(self.reporter.as_ref(), e);
                None
            }
        }
    }

    /// Report an error if anything was appended to `topic` after the
    /// baseline. Does not move the baseline.
    pub fn expect_empty(&self, topic: &str) {
        let pending = self
            .engine
            .streams()
            .get(topic)
            .map(|s| s.log().read_from(self.offset(topic)))
            .unwrap_or_default();
        if let Some(first) = pending.first() {
            self.reporter.error(&format!(
                "expected no messages on '{topic}', found {} (first key '{}' at offset {})",
                pending.len(),
                first.key,
                first.offset
            ));
        }
    }

    /// Consume the next record of `topic`, check its key and hand its
    /// decoded value to `check`. A missing record or a different key is
    /// reported as an error and `check` is not called.
    pub fn expect_emit<F>(&mut self, topic: &str, key: &str, check: F)
    where
        F: FnOnce(Option<serde_json::Value>),
    {
        let offset = self.offset(topic);
        match self.next_message(topic) {
            None if self.offset(topic) == offset => {
                self.reporter
                    .error(&format!("expected a message with key '{key}' on '{topic}', found none"));
            }
            // Decode failure, already reported.
            None => {}
            Some((actual, _)) if actual != key => {
                self.reporter.error(&format!(
                    "expected a message with key '{key}' on '{topic}' at offset {offset}, found key '{actual}'"
                ));
            }
            Some((_, value)) => check(value),
        }
    }
}

/// Iterator returned by [`MessageTracker::unseen`].
pub struct Unseen<'a> {
    log: Option<Arc<StreamLog>>,
    offset: &'a mut u64,
}

impl Iterator for Unseen<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let record = self.log.as_ref()?.record_at(*self.offset)?;
        *self.offset += 1;
        Some(record)
    }
}

