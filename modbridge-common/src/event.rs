use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::register::{RegisterData, RegisterType};

/// Why a data event was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    /// Values read from the device (fresh poll or cache hit).
    Get,
    /// Values just written to the device.
    Set,
}

/// Register values pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEvent {
    /// Modbus unit (slave) id.
    pub unit: u8,

    /// Register table.
    #[serde(rename = "type")]
    pub register_type: RegisterType,

    /// First address covered by `data`.
    pub address: u16,

    /// Values, booleans for bit tables.
    pub data: RegisterData,

    pub flag: Flag,

    /// Unix epoch milliseconds when the event was emitted.
    #[serde(default)]
    pub timestamp: i64,
}

impl DataEvent {
    /// Create a data event stamped with the current time.
    pub fn new(
        unit: u8,
        register_type: RegisterType,
        address: u16,
        data: RegisterData,
        flag: Flag,
    ) -> Self {
        Self {
            unit,
            register_type,
            address,
            data,
            flag,
            timestamp: current_timestamp_millis(),
        }
    }
}

/// A failed bus transaction or cache operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub err: String,

    #[serde(default)]
    pub timestamp: i64,
}

impl ErrorEvent {
    pub fn new(err: impl Into<String>) -> Self {
        Self {
            err: err.into(),
            timestamp: current_timestamp_millis(),
        }
    }
}

/// Everything the bridge broadcasts to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum BridgeEvent {
    Data(DataEvent),
    Error(ErrorEvent),
}

impl BridgeEvent {
    /// The data event, if this is one.
    pub fn as_data(&self) -> Option<&DataEvent> {
        match self {
            BridgeEvent::Data(event) => Some(event),
            BridgeEvent::Error(_) => None,
        }
    }

    /// The error event, if this is one.
    pub fn as_error(&self) -> Option<&ErrorEvent> {
        match self {
            BridgeEvent::Error(event) => Some(event),
            BridgeEvent::Data(_) => None,
        }
    }
}

impl From<DataEvent> for BridgeEvent {
    fn from(event: DataEvent) -> Self {
        BridgeEvent::Data(event)
    }
}

impl From<ErrorEvent> for BridgeEvent {
    fn from(event: ErrorEvent) -> Self {
        BridgeEvent::Error(event)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
