use tester_api::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("topic '{0}' was never declared by a group graph")]
    UnknownTopic(String),

    #[error("no codec registered for topic '{0}'")]
    NoCodec(String),

    #[error("different codecs for topic '{topic}': {existing} vs {new}")]
    CodecConflict {
        topic: String,
        existing: &'static str,
        new: &'static str,
    },

    #[error("no table storage for topic '{0}'")]
    MissingStorage(String),

    #[error("codec ({topic}): {source}")]
    Codec { topic: String, source: tester_api::Error },

    #[error("storage ({topic}): {source}")]
    Storage { topic: String, source: tester_api::Error },

    #[error("processor ({topic}@{offset}): {source}")]
    Processor {
        topic: String,
        offset: u64,
        source: tester_api::Error,
    },

    #[error("consumer '{0}' is gone")]
    ConsumerGone(String),

    #[error("consumer '{consumer}' failed to initialize: {reason}")]
    ConsumerFailed { consumer: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownTopic(_)
            | EngineError::NoCodec(_)
            | EngineError::CodecConflict { .. }
            | EngineError::MissingStorage(_)
            | EngineError::Config(_) => ErrorKind::Config,
            EngineError::Codec { .. } => ErrorKind::Codec,
            EngineError::Storage { .. } => ErrorKind::Storage,
            EngineError::Processor { .. } => ErrorKind::Processor,
            EngineError::ConsumerGone(_) | EngineError::ConsumerFailed { .. } => ErrorKind::Engine,
        }
    }

    /// Convert to the collaborator-facing error, preserving the kind.
    pub fn into_api_error(self) -> tester_api::Error {
        match self {
            EngineError::Codec { source, .. }
            | EngineError::Storage { source, .. }
            | EngineError::Processor { source, .. } => source,
            other => tester_api::Error::new(other.kind(), other.to_string()),
        }
    }
}
