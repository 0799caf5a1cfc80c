use std::fmt;
use std::sync::Arc;

use crate::codec::Codec;

/// Where a group-style consumer starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartOffset {
    /// Only records appended after registration (consumer-group semantics).
    #[default]
    Newest,
    /// Replay the whole stream.
    Oldest,
    /// Start at an explicit offset.
    At(u64),
}

/// A topic together with the codec of its values.
#[derive(Clone)]
pub struct Edge {
    topic: String,
    codec: Arc<dyn Codec>,
}

impl Edge {
    pub fn new(topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        Self { topic: topic.into(), codec: Arc::new(codec) }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("topic", &self.topic)
            .field("codec", &self.codec.codec_name())
            .finish()
    }
}

/// Topology of one processor group: which topics it reads, writes and
/// materializes.
///
/// ```
/// # use tester_api::{GroupGraph, Codec, Error};
/// # struct Text;
/// # impl Codec for Text {
/// #     fn encode(&self, v: &serde_json::Value) -> Result<Vec<u8>, Error> { Ok(v.to_string().into_bytes()) }
/// #     fn decode(&self, d: &[u8]) -> Result<serde_json::Value, Error> { Ok(serde_json::from_slice(d)?) }
/// # }
/// let graph = GroupGraph::define("orders")
///     .input("order-events", Text)
///     .output("alerts", Text)
///     .persist(Text);
/// assert_eq!(graph.group_table().map(|e| e.topic()), Some("orders-table"));
/// ```
#[derive(Debug, Clone)]
pub struct GroupGraph {
    group: String,
    group_table: Option<Edge>,
    inputs: Vec<Edge>,
    outputs: Vec<Edge>,
    joins: Vec<Edge>,
    loop_stream: Option<Edge>,
    lookups: Vec<Edge>,
    start_offset: StartOffset,
}

impl GroupGraph {
    pub fn define(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            group_table: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            joins: Vec::new(),
            loop_stream: None,
            lookups: Vec::new(),
            start_offset: StartOffset::default(),
        }
    }

    /// Name of the group table topic for `group`.
    pub fn table_topic(group: &str) -> String {
        format!("{group}-table")
    }

    /// Name of the loop topic for `group`.
    pub fn loop_topic(group: &str) -> String {
        format!("{group}-loop")
    }

    pub fn input(mut self, topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.inputs.push(Edge::new(topic, codec));
        self
    }

    pub fn output(mut self, topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.outputs.push(Edge::new(topic, codec));
        self
    }

    pub fn join(mut self, topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.joins.push(Edge::new(topic, codec));
        self
    }

    pub fn lookup(mut self, topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.lookups.push(Edge::new(topic, codec));
        self
    }

    pub fn looped(mut self, codec: impl Codec + 'static) -> Self {
        self.loop_stream = Some(Edge::new(Self::loop_topic(&self.group), codec));
        self
    }

    pub fn persist(self, codec: impl Codec + 'static) -> Self {
        let topic = Self::table_topic(&self.group);
        self.persist_to(topic, codec)
    }

    pub fn persist_to(mut self, topic: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.group_table = Some(Edge::new(topic, codec));
        self
    }

    pub fn consume_from(mut self, start: StartOffset) -> Self {
        self.start_offset = start;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn group_table(&self) -> Option<&Edge> {
        self.group_table.as_ref()
    }

    pub fn input_streams(&self) -> &[Edge] {
        &self.inputs
    }

    pub fn output_streams(&self) -> &[Edge] {
        &self.outputs
    }

    pub fn joint_tables(&self) -> &[Edge] {
        &self.joins
    }

    pub fn loop_stream(&self) -> Option<&Edge> {
        self.loop_stream.as_ref()
    }

    pub fn lookup_tables(&self) -> &[Edge] {
        &self.lookups
    }

    pub fn start_offset(&self) -> StartOffset {
        self.start_offset
    }
}
