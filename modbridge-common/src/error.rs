use thiserror::Error;

use crate::serialization::Format;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("Failed to encode {format:?} payload: {message}")]
    Encode { format: Format, message: String },

    #[error("Failed to decode {format:?} payload: {message}")]
    Decode { format: Format, message: String },
}

impl Error {
    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Error::Encode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        Error::Decode {
            format,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
