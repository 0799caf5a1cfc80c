use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tester_api::Codec;

use crate::error::EngineError;
use crate::lock::{read, write};

/// topic → codec. A topic keeps the codec it was first registered with;
/// registering a different codec type for it is an error.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: RwLock<HashMap<String, Arc<dyn Codec>>>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let codecs = read(&self.codecs, "codec registry");
        f.debug_map()
            .entries(codecs.iter().map(|(t, c)| (t, c.codec_name())))
            .finish()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, topic: &str, codec: &Arc<dyn Codec>) -> Result<(), EngineError> {
        let mut codecs = write(&self.codecs, "codec registry");
        match codecs.get(topic) {
            Some(existing) if existing.codec_name() != codec.codec_name() => {
                Err(EngineError::CodecConflict {
                    topic: topic.to_string(),
                    existing: existing.codec_name(),
                    new: codec.codec_name(),
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::debug!(topic, codec = codec.codec_name(), "codec registered");
                codecs.insert(topic.to_string(), codec.clone());
                Ok(())
            }
        }
    }

    pub fn get(&self, topic: &str) -> Option<Arc<dyn Codec>> {
        read(&self.codecs, "codec registry").get(topic).cloned()
    }

    pub fn contains(&self, topic: &str) -> bool {
        read(&self.codecs, "codec registry").contains_key(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tester_api::Error;

    struct Upper;
    struct Lower;

    impl Codec for Upper {
        fn encode(&self, v: &serde_json::Value) -> Result<Vec<u8>, Error> {
            Ok(v.to_string().to_uppercase().into_bytes())
        }
        fn decode(&self, d: &[u8]) -> Result<serde_json::Value, Error> {
            Ok(serde_json::from_slice(d)?)
        }
    }

    impl Codec for Lower {
        fn encode(&self, v: &serde_json::Value) -> Result<Vec<u8>, Error> {
            Ok(v.to_string().to_lowercase().into_bytes())
        }
        fn decode(&self, d: &[u8]) -> Result<serde_json::Value, Error> {
            Ok(serde_json::from_slice(d)?)
        }
    }

    #[test]
    fn same_codec_type_registers_twice() {
        let registry = CodecRegistry::new();
        let first: Arc<dyn Codec> = Arc::new(Upper);
        let second: Arc<dyn Codec> = Arc::new(Upper);
        registry.register("t", &first).unwrap();
        registry.register("t", &second).unwrap();
        assert!(Arc::ptr_eq(&registry.get("t").unwrap(), &first));
    }

    #[test]
    fn different_codec_type_conflicts() {
        let registry = CodecRegistry::new();
        registry.register("t", &(Arc::new(Upper) as Arc<dyn Codec>)).unwrap();
        let err = registry
            .register("t", &(Arc::new(Lower) as Arc<dyn Codec>))
            .unwrap_err();
        assert!(matches!(err, EngineError::CodecConflict { ref topic, .. } if topic == "t"));
        assert!(registry.get("t").unwrap().codec_name().ends_with("Upper"));
        assert!(!registry.contains("other"));
    }
}
