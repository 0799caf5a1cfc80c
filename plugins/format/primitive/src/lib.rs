use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use tester_api::{Codec, Error};

/// UTF-8 text. Only JSON strings encode.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, Error> {
        match value {
            serde_json::Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(Error::codec(format!("string codec: cannot encode {other}"))),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<serde_json::Value, Error> {
        let s = std::str::from_utf8(data)?;
        Ok(serde_json::Value::String(s.to_string()))
    }
}

/// Raw bytes. The value form is a base64 string.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl BytesCodec {
    /// Value form of raw bytes, suitable for `Tester::consume`.
    pub fn value(bytes: &[u8]) -> serde_json::Value {
        serde_json::Value::String(STANDARD.encode(bytes))
    }
}

impl Codec for BytesCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, Error> {
        match value {
            serde_json::Value::String(s) => Ok(STANDARD.decode(s)?),
            other => Err(Error::codec(format!("bytes codec: expected base64 string, got {other}"))),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<serde_json::Value, Error> {
        Ok(Self::value(data))
    }
}

/// Signed 64-bit integer as decimal ASCII.
#[derive(Debug, Default, Clone, Copy)]
pub struct Int64Codec;

impl Codec for Int64Codec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, Error> {
        value
            .as_i64()
            .map(|n| n.to_string().into_bytes())
            .ok_or_else(|| Error::codec(format!("int64 codec: cannot encode {value}")))
    }

    fn decode(&self, data: &[u8]) -> Result<serde_json::Value, Error> {
        let n: i64 = std::str::from_utf8(data)?.trim().parse()?;
        Ok(serde_json::Value::from(n))
    }
}
