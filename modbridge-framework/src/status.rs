//! Bridge status reports on `<prefix>/@/status`.

use serde::{Deserialize, Serialize};

use modbridge_common::current_timestamp_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
    /// A bridge task stopped on its own.
    Failed,
}

/// One status report.
///
/// `metadata` is flattened into the report, so a running bridge reads as
/// `{"bridge":"modbus","state":"running","connection":"tcp://...",...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub bridge: String,
    pub version: String,
    pub state: BridgeState,
    /// Milliseconds since the Unix epoch.
    pub since: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    pub fn new(bridge: impl Into<String>, version: impl Into<String>, state: BridgeState) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            state,
            since: current_timestamp_millis(),
            reason: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
