use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Zenoh session role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZenohMode {
    #[default]
    Peer,
    Client,
    Router,
}

impl ZenohMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZenohMode::Peer => "peer",
            ZenohMode::Client => "client",
            ZenohMode::Router => "router",
        }
    }
}

impl std::fmt::Display for ZenohMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zenoh connection settings shared by the bridge and its tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    #[serde(default)]
    pub mode: ZenohMode,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

impl ZenohConfig {
    /// Build the native Zenoh configuration.
    pub fn to_zenoh_config(&self) -> Result<zenoh::Config> {
        let mut config = zenoh::Config::default();

        insert(&mut config, "mode", &self.mode.as_str())?;
        if !self.connect.is_empty() {
            insert(&mut config, "connect/endpoints", &self.connect)?;
        }
        if !self.listen.is_empty() {
            insert(&mut config, "listen/endpoints", &self.listen)?;
        }

        Ok(config)
    }
}

fn insert<T: Serialize + ?Sized>(config: &mut zenoh::Config, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| Error::Config(format!("Failed to serialize {}: {}", key, e)))?;
    config
        .insert_json5(key, &json)
        .map_err(|e| Error::Config(format!("Failed to set {}: {}", key, e)))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "modbridge=debug".
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zenoh_section() {
        let config: ZenohConfig = json5::from_str(
            r#"{ mode: "client", connect: ["tcp/localhost:7447"] }"#,
        )
        .unwrap();

        assert_eq!(config.mode, ZenohMode::Client);
        assert_eq!(config.connect, vec!["tcp/localhost:7447"]);
        assert!(config.listen.is_empty());
        assert!(config.to_zenoh_config().is_ok());
    }

    #[test]
    fn test_defaults() {
        let zenoh: ZenohConfig = json5::from_str("{}").unwrap();
        assert_eq!(zenoh.mode, ZenohMode::Peer);
        assert_eq!(zenoh, ZenohConfig::default());

        let logging: LoggingConfig = json5::from_str("{}").unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Text);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let result: std::result::Result<ZenohConfig, _> = json5::from_str(r#"{ mode: "mesh" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_logging_format() {
        let logging: LoggingConfig =
            json5::from_str(r#"{ level: "debug", format: "json" }"#).unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Json);
    }
}
