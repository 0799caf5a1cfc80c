//! In-memory stream system for testing processors deterministically.
//!
//! A [`Tester`] owns one append-only log per topic, the consumers bound to
//! them (table replicas and processor groups, each running as its own
//! task) and a pending-publish queue. Injecting a record pushes it onto the
//! queue and drains: pop, append, sweep every stream until nothing is
//! delivered, repeat until the queue is empty.

pub mod config;
pub mod error;

mod codecs;
mod consumer;
mod engine;
mod lock;
mod mocks;
mod queue;
mod storages;
mod stream;
mod tester;
mod tracker;

pub use config::{LogConfig, LogSink, StorageConfig, TesterConfig};
pub use error::EngineError;
pub use tester::{Tester, TesterBuilder};
pub use tracker::{MessageTracker, Unseen};
