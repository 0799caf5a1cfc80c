/// One entry of a stream. Immutable once appended.
///
/// `value = None` is a tombstone: table consumers delete the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Position in the stream, assigned at append time.
    pub offset: u64,
    pub key: String,
    /// Opaque encoded bytes, interpreted only through the topic's codec.
    pub value: Option<Vec<u8>>,
}

impl Record {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// A record as handed to the processing logic: raw bytes plus the value
/// decoded with the topic's codec.
#[derive(Clone, Debug)]
pub struct Message {
    pub topic: String,
    pub offset: u64,
    pub key: String,
    pub raw: Option<Vec<u8>>,
    /// `None` for tombstones.
    pub value: Option<serde_json::Value>,
}

impl Message {
    /// Decoded value as a string slice, if it is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(|v| v.as_str())
    }
}
