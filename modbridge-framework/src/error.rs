//! Errors raised while starting or running the bridge.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to parse {source_name}: {message}")]
    ConfigParse {
        source_name: String,
        message: String,
    },

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Failed to subscribe to {key}: {message}")]
    Subscribe { key: String, message: String },

    #[error("Failed to encode payload for {key}: {message}")]
    Encode { key: String, message: String },

    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    /// Bridge token declaration or client watch failure.
    #[error("Liveliness error: {0}")]
    Liveliness(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    pub fn liveliness(msg: impl Into<String>) -> Self {
        Self::Liveliness(msg.into())
    }
}

impl From<zenoh::Error> for BridgeError {
    fn from(err: zenoh::Error) -> Self {
        Self::Zenoh(err.to_string())
    }
}

/// Session setup failures from the common crate.
impl From<modbridge_common::Error> for BridgeError {
    fn from(err: modbridge_common::Error) -> Self {
        Self::Zenoh(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_source() {
        let err = BridgeError::ConfigParse {
            source_name: "plant.json5".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse plant.json5: expected value");
    }

    #[test]
    fn test_common_error_maps_to_zenoh() {
        let err: BridgeError = modbridge_common::Error::Config("bad endpoint".to_string()).into();
        assert!(matches!(err, BridgeError::Zenoh(msg) if msg.contains("bad endpoint")));
    }
}
