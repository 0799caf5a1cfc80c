use crate::error::Error;

/// Encodes and decodes the values of one topic.
///
/// Values are format-agnostic `serde_json::Value`s; the codec decides the
/// wire bytes. Stateless: one instance may serve several topics.
pub trait Codec: Send + Sync {
    /// Serialize a value into the topic's wire bytes.
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, Error>;

    /// Parse wire bytes back into a value.
    fn decode(&self, data: &[u8]) -> Result<serde_json::Value, Error>;

    /// Identity used to detect two structurally different codecs declared
    /// for the same topic. Defaults to the implementing type's name.
    fn codec_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
