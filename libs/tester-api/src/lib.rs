//! Collaborator-facing surface of the stream tester: the types and traits
//! shared by the engine, the storage and codec plugins, and the processing
//! logic under test. No runtime lives here.

pub mod codec;
pub mod error;
pub mod graph;
pub mod processor;
pub mod producer;
pub mod record;
pub mod reporter;
pub mod storage;

pub use codec::Codec;
pub use error::{Error, ErrorKind};
pub use graph::{Edge, GroupGraph, StartOffset};
pub use processor::{InitContext, ProcessContext, Processor};
pub use producer::{EmitHandler, Producer, Promise, PromiseHandle, TopicManager};
pub use record::{Message, Record};
pub use reporter::{CollectingReporter, PanicReporter, Reporter};
pub use storage::{StorageBuilder, StorageFactory, TableStorage};
