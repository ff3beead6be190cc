//! Commands sent by subscribers to the bridge.
//!
//! Commands are published as a single object tagged by `command`:
//!
//! ```json
//! { "command": "readHoldingRegisters", "unit": 1, "address": 8, "length": 3,
//!   "client": "dashboard-7", "interval": 500 }
//! ```
//!
//! Earlier command names (`getHoldingRegisters`, `setRegisters`,
//! `forceCoil`, ...) are accepted as aliases.

use serde::{Deserialize, Serialize};

use crate::register::RegisterType;

/// A command plus the optional repeat and client information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Issuing client; its liveliness token scopes `interval` timers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    /// Repeat period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    #[serde(flatten)]
    pub command: BridgeCommand,
}

impl CommandEnvelope {
    /// Wrap a command that runs once.
    pub fn once(command: BridgeCommand) -> Self {
        Self {
            client: None,
            interval: None,
            command,
        }
    }

    /// Repeat the command every `interval_ms` on behalf of `client`.
    pub fn repeating(command: BridgeCommand, client: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            client: Some(client.into()),
            interval: Some(interval_ms),
            command,
        }
    }
}

/// Inbound subscriber commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum BridgeCommand {
    #[serde(alias = "getCoils")]
    ReadCoils(ReadRequest),
    #[serde(alias = "getDiscreteInputs")]
    ReadDiscreteInputs(ReadRequest),
    #[serde(alias = "getHoldingRegisters", alias = "getRegisters")]
    ReadHoldingRegisters(ReadRequest),
    #[serde(alias = "getInputRegisters")]
    ReadInputRegisters(ReadRequest),
    #[serde(alias = "forceCoil")]
    WriteCoil(WriteCoilRequest),
    #[serde(alias = "setRegisters")]
    WriteRegisters(WriteRegistersRequest),
}

impl BridgeCommand {
    /// Register table this command targets.
    pub fn register_type(&self) -> RegisterType {
        match self {
            BridgeCommand::ReadCoils(_) | BridgeCommand::WriteCoil(_) => RegisterType::Coil,
            BridgeCommand::ReadDiscreteInputs(_) => RegisterType::DiscreteInput,
            BridgeCommand::ReadHoldingRegisters(_) | BridgeCommand::WriteRegisters(_) => {
                RegisterType::HoldingRegister
            }
            BridgeCommand::ReadInputRegisters(_) => RegisterType::InputRegister,
        }
    }

    /// The read request, if this is a read command.
    pub fn as_read(&self) -> Option<&ReadRequest> {
        match self {
            BridgeCommand::ReadCoils(req)
            | BridgeCommand::ReadDiscreteInputs(req)
            | BridgeCommand::ReadHoldingRegisters(req)
            | BridgeCommand::ReadInputRegisters(req) => Some(req),
            _ => None,
        }
    }
}

/// Read a contiguous range of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub unit: u8,
    pub address: u16,
    #[serde(default = "default_length")]
    pub length: u16,
}

fn default_length() -> u16 {
    1
}

/// Force a single coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCoilRequest {
    pub unit: u8,
    pub address: u16,
    pub state: bool,
}

/// Preset a block of holding registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRegistersRequest {
    pub unit: u8,
    pub address: u16,
    pub values: Vec<u16>,
}
