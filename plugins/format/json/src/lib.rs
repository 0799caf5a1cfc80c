use tester_api::{Codec, Error};

/// Values as JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, data: &[u8]) -> Result<serde_json::Value, Error> {
        let s = std::str::from_utf8(data)?;
        Ok(serde_json::from_str(s)?)
    }
}
