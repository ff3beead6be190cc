//! Loading and validating the bridge configuration file.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{Format, LoggingConfig, ZenohConfig};

/// A bridge configuration document.
///
/// Implementors expose the sections the runner needs and may add their own
/// validation, which runs after every successful parse.
pub trait BridgeConfig: Sized + DeserializeOwned {
    fn zenoh(&self) -> &ZenohConfig;

    fn logging(&self) -> &LoggingConfig;

    /// Prefix under which every key of this bridge lives.
    fn key_prefix(&self) -> &str;

    /// Serialization format for published events.
    fn format(&self) -> Format {
        Format::default()
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse a JSON5 document and validate it.
    fn parse(source_name: &str, content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content).map_err(|e| BridgeError::ConfigParse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&path.display().to_string(), &content)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}
