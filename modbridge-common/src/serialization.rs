use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Payload encoding for events and commands.
///
/// Events go out in the configured format. Commands are accepted in
/// either, see [`decode_auto`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    /// Compact binary, preferred for short interval subscriptions.
    Cbor,
}

impl Format {
    /// Guess the encoding of an incoming payload.
    ///
    /// A JSON command is always an object, so anything whose first
    /// non-whitespace byte is `{` is JSON. CBOR maps start with a major
    /// type 5 byte (`0xa0..=0xbf`), which never collides.
    pub fn detect(data: &[u8]) -> Format {
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Format::Json,
            _ => Format::Cbor,
        }
    }
}

pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(|e| Error::encode(format, e)),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf).map_err(|e| Error::encode(format, e))?;
            Ok(buf)
        }
    }
}

pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(|e| Error::decode(format, e)),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::decode(format, e)),
    }
}

/// Decode a payload of unknown encoding.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, Format::detect(data))
}
