//! Configuration for the Modbus bridge.

use modbridge_common::config::ZenohConfig;
use modbridge_common::{Format, KEY_PREFIX, LoggingConfig};
use modbridge_framework::{BridgeConfig, BridgeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest register count a single read may carry on the bus.
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(msg) => BridgeError::ConfigValidation(msg),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Modbus-specific settings
    pub modbus: ModbusConfig,

    /// Payload encoding for events
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Key expression prefix (default: "modbridge")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// How the bus is reached
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Per-transaction timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Capacity of the device worker queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Caching and polling policy
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_queue_depth() -> usize {
    64
}

fn default_event_capacity() -> usize {
    1024
}

/// Where the bus is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Tcp(TcpConfig),
    Rtu(SerialConfig),
    /// In-memory device, used when no bus is configured.
    #[default]
    Simulated,
}

impl ConnectionConfig {
    /// Short human-readable description for logs and status.
    pub fn describe(&self) -> String {
        match self {
            ConnectionConfig::Tcp(tcp) => format!("tcp://{}:{}", tcp.host, tcp.port),
            ConnectionConfig::Rtu(serial) => {
                format!(
                    "rtu://{}@{}/{}{}{}",
                    serial.port,
                    serial.baud_rate,
                    serial.data_bits,
                    serial.parity.letter(),
                    serial.stop_bits
                )
            }
            ConnectionConfig::Simulated => "simulated".to_string(),
        }
    }
}

/// Modbus TCP gateway or device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// IP address or hostname.
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
}

/// Modbus RTU serial line. Defaults to 9600 8N1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. "/dev/ttyUSB0" or "COM3".
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    /// The letter used in line settings such as "8N1".
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Caching and polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Use the demand-driven cache. When false, every read goes straight to the bus.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a polled answer may be served from cache
    #[serde(default = "default_valid_answer_window_ms")]
    pub valid_answer_window_ms: u64,

    /// How long an unanswered request stays in the poll queue
    #[serde(default = "default_forget_ask_window_ms")]
    pub forget_ask_window_ms: u64,

    /// Minimum gap between two cache-served broadcasts of the same range
    #[serde(default = "default_resend_wait_window_ms")]
    pub resend_wait_window_ms: u64,

    /// Most registers requested in one bus transaction
    #[serde(default = "default_max_batch_length")]
    pub max_batch_length: u16,

    /// Scheduler tick period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Drop cells idle for this long (disabled when absent)
    #[serde(default)]
    pub idle_eviction_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_valid_answer_window_ms() -> u64 {
    5000
}

fn default_forget_ask_window_ms() -> u64 {
    10000
}

fn default_resend_wait_window_ms() -> u64 {
    1000
}

fn default_max_batch_length() -> u16 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            valid_answer_window_ms: default_valid_answer_window_ms(),
            forget_ask_window_ms: default_forget_ask_window_ms(),
            resend_wait_window_ms: default_resend_wait_window_ms(),
            max_batch_length: default_max_batch_length(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_eviction_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ModbusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ModbusBridgeConfig {
    /// Validate the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        let modbus = &self.modbus;

        if modbus.key_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "key_prefix cannot be empty".to_string(),
            ));
        }

        if modbus.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if modbus.queue_depth == 0 || modbus.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "queue_depth and event_capacity must be greater than 0".to_string(),
            ));
        }

        let cache = &modbus.cache;
        for (name, value) in [
            ("valid_answer_window_ms", cache.valid_answer_window_ms),
            ("forget_ask_window_ms", cache.forget_ask_window_ms),
            ("poll_interval_ms", cache.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "cache.{} must be greater than 0",
                    name
                )));
            }
        }

        if cache.max_batch_length == 0 || cache.max_batch_length > MODBUS_MAX_READ_REGISTERS {
            return Err(ConfigError::Validation(format!(
                "cache.max_batch_length must be 1-{}",
                MODBUS_MAX_READ_REGISTERS
            )));
        }

        if cache.idle_eviction_ms == Some(0) {
            return Err(ConfigError::Validation(
                "cache.idle_eviction_ms must be greater than 0 when set".to_string(),
            ));
        }

        match &modbus.connection {
            ConnectionConfig::Tcp(tcp) if tcp.host.is_empty() => {
                return Err(ConfigError::Validation(
                    "tcp connection requires a host".to_string(),
                ));
            }
            ConnectionConfig::Rtu(serial) => {
                if serial.port.is_empty() || serial.baud_rate == 0 {
                    return Err(ConfigError::Validation(
                        "rtu connection requires a port and a baud rate".to_string(),
                    ));
                }
                if !(5..=8).contains(&serial.data_bits) {
                    return Err(ConfigError::Validation(format!(
                        "invalid data_bits {} (use 5-8)",
                        serial.data_bits
                    )));
                }
                if !matches!(serial.stop_bits, 1 | 2) {
                    return Err(ConfigError::Validation(format!(
                        "invalid stop_bits {} (use 1 or 2)",
                        serial.stop_bits
                    )));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

impl BridgeConfig for ModbusBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.modbus.key_prefix
    }

    fn format(&self) -> Format {
        self.serialization
    }

    fn validate(&self) -> modbridge_framework::Result<()> {
        self.check().map_err(BridgeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_config() {
        let json = r#"{
            zenoh: { mode: "peer" },
            modbus: {
                connection: { type: "tcp", host: "192.168.1.10" },
            }
        }"#;

        let config: ModbusBridgeConfig = json5::from_str(json).unwrap();
        config.check().unwrap();

        assert_eq!(
            config.modbus.connection,
            ConnectionConfig::Tcp(TcpConfig {
                host: "192.168.1.10".to_string(),
                port: 502,
            })
        );
        assert_eq!(config.modbus.connection.describe(), "tcp://192.168.1.10:502");
    }

    #[test]
    fn test_parse_rtu_config() {
        let json = r#"{
            modbus: {
                connection: {
                    type: "rtu",
                    port: "/dev/ttyUSB0",
                    baud_rate: 19200,
                    parity: "even"
                },
            }
        }"#;

        let config: ModbusBridgeConfig = json5::from_str(json).unwrap();
        config.check().unwrap();

        let ConnectionConfig::Rtu(serial) = &config.modbus.connection else {
            panic!("Expected RTU connection");
        };
        assert_eq!(serial.port, "/dev/ttyUSB0");
        assert_eq!(serial.baud_rate, 19200);
        assert_eq!(serial.parity, Parity::Even);
        assert_eq!(serial.data_bits, 8);
        assert_eq!(config.modbus.connection.describe(), "rtu:///dev/ttyUSB0@19200/8E1");
    }

    #[test]
    fn test_defaults() {
        let config: ModbusBridgeConfig = json5::from_str("{ modbus: {} }").unwrap();
        config.check().unwrap();

        assert_eq!(config.modbus.key_prefix, "modbridge");
        assert!(matches!(
            config.modbus.connection,
            ConnectionConfig::Simulated
        ));
        assert_eq!(config.modbus.timeout_ms, 1000);
        assert_eq!(config.serialization, Format::Json);

        let cache = config.modbus.cache;
        assert!(cache.enabled);
        assert_eq!(cache.valid_answer_window_ms, 5000);
        assert_eq!(cache.forget_ask_window_ms, 10000);
        assert_eq!(cache.resend_wait_window_ms, 1000);
        assert_eq!(cache.max_batch_length, 10);
        assert_eq!(cache.poll_interval_ms, 1000);
        assert_eq!(cache.idle_eviction_ms, None);
    }

    #[test]
    fn test_passthrough_and_no_resend_wait() {
        let json = r#"{
            modbus: {
                cache: { enabled: false, resend_wait_window_ms: 0, poll_interval_ms: 200 },
            },
            serialization: "cbor",
        }"#;

        let config: ModbusBridgeConfig = json5::from_str(json).unwrap();
        config.check().unwrap();

        assert!(!config.modbus.cache.enabled);
        assert_eq!(config.modbus.cache.resend_wait_window_ms, 0);
        assert_eq!(config.modbus.cache.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.format(), Format::Cbor);
    }

    #[test]
    fn test_validate_batch_length() {
        for bad in ["0", "126"] {
            let json = format!("{{ modbus: {{ cache: {{ max_batch_length: {} }} }} }}", bad);
            let config: ModbusBridgeConfig = json5::from_str(&json).unwrap();
            assert!(config.check().is_err(), "batch length {} accepted", bad);
        }
    }

    #[test]
    fn test_validate_zero_windows() {
        for field in [
            "valid_answer_window_ms",
            "forget_ask_window_ms",
            "poll_interval_ms",
            "idle_eviction_ms",
        ] {
            let json = format!("{{ modbus: {{ cache: {{ {}: 0 }} }} }}", field);
            let config: ModbusBridgeConfig = json5::from_str(&json).unwrap();
            let err = config.check().unwrap_err();
            assert!(err.to_string().contains(field), "{}", err);
        }
    }

    #[test]
    fn test_unknown_parity_rejected() {
        let json = r#"{
            modbus: { connection: { type: "rtu", port: "/dev/ttyS0", parity: "mark" } }
        }"#;

        assert!(json5::from_str::<ModbusBridgeConfig>(json).is_err());
    }

    #[test]
    fn test_validate_serial_framing() {
        for framing in ["data_bits: 9", "stop_bits: 3"] {
            let json = format!(
                r#"{{ modbus: {{ connection: {{ type: "rtu", port: "/dev/ttyS0", {} }} }} }}"#,
                framing
            );
            let config: ModbusBridgeConfig = json5::from_str(&json).unwrap();
            assert!(
                matches!(config.check(), Err(ConfigError::Validation(_))),
                "{} accepted",
                framing
            );
        }
    }

    #[test]
    fn test_validation_maps_to_bridge_error() {
        let json = r#"{ modbus: { key_prefix: "" } }"#;
        let config: ModbusBridgeConfig = json5::from_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigValidation(_))
        ));
    }
}
