use std::fmt;

/// Error kind. Decides how the harness reports the failure to the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown topic, conflicting codecs, missing storage.
    Config,
    /// Value did not match the topic's codec.
    Codec,
    /// Table storage get/set/delete failed.
    Storage,
    /// Internal engine fault (consumer task gone, unregistered topic).
    Engine,
    /// The processing logic under test returned an error.
    Processor,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Codec => f.write_str("codec"),
            ErrorKind::Storage => f.write_str("storage"),
            ErrorKind::Engine => f.write_str("engine"),
            ErrorKind::Processor => f.write_str("processor"),
        }
    }
}

/// Error returned by every collaborator trait method (codecs, storages,
/// processors, producers).
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Codec, msg)
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, msg)
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Engine, msg)
    }

    pub fn processor(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Processor, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// From impls: decode failures are always codec errors
// ---------------------------------------------------------------------------

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::codec(e.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::codec(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::codec(e.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::codec(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = Error::storage("disk full").with_context("topic 'orders'");
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.message(), "topic 'orders': disk full");
        assert_eq!(format!("{err:?}"), "[storage] topic 'orders': disk full");
    }

    #[test]
    fn utf8_errors_are_codec_errors() {
        let err: Error = String::from_utf8(vec![0xff, 0xfe]).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
