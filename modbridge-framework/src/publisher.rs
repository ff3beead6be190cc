//! Event publisher for Zenoh.

use std::sync::Arc;

use modbridge_common::{BridgeEvent, Format, KeyExprBuilder, encode};

use crate::error::{BridgeError, Result};
use crate::status::BridgeStatus;

/// Routes bridge events onto the Zenoh session.
///
/// Data events go to `<prefix>/data/<unit>/<type>/<address>` and error
/// events to `<prefix>/error`, both in the configured format. Status
/// reports are always JSON.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl Publisher {
    pub fn new(
        session: Arc<zenoh::Session>,
        key_prefix: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            session,
            keys: KeyExprBuilder::new(key_prefix),
            format,
        }
    }

    pub fn keys(&self) -> &KeyExprBuilder {
        &self.keys
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Key expression an event is published under.
    pub fn event_key(&self, event: &BridgeEvent) -> String {
        event_key(&self.keys, event)
    }

    pub async fn publish_event(&self, event: &BridgeEvent) -> Result<()> {
        let key = self.event_key(event);
        let payload = encode(event, self.format).map_err(|e| BridgeError::Encode {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.put(&key, payload).await
    }

    /// Publish a status report to `<prefix>/@/status`.
    pub async fn publish_status(&self, status: &BridgeStatus) -> Result<()> {
        let key = self.keys.status();
        let payload = serde_json::to_vec(status).map_err(|e| BridgeError::Encode {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.put(&key, payload).await
    }

    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

fn event_key(keys: &KeyExprBuilder, event: &BridgeEvent) -> String {
    match event {
        BridgeEvent::Data(data) => keys.data(data.unit, data.register_type, data.address),
        BridgeEvent::Error(_) => keys.error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbridge_common::{DataEvent, ErrorEvent, Flag, RegisterData, RegisterType};

    #[test]
    fn test_event_keys() {
        let keys = KeyExprBuilder::new("plant/modbus");

        let data: BridgeEvent = DataEvent::new(
            3,
            RegisterType::InputRegister,
            100,
            RegisterData::Words(vec![1, 2]),
            Flag::Get,
        )
        .into();
        assert_eq!(event_key(&keys, &data), "plant/modbus/data/3/input/100");

        let error: BridgeEvent = ErrorEvent::new("timeout").into();
        assert_eq!(event_key(&keys, &error), "plant/modbus/error");
    }

    #[test]
    fn test_coil_event_key() {
        let keys = KeyExprBuilder::new("modbus");
        let data: BridgeEvent = DataEvent::new(
            1,
            RegisterType::Coil,
            7,
            RegisterData::Bits(vec![true]),
            Flag::Set,
        )
        .into();
        assert_eq!(event_key(&keys, &data), "modbus/data/1/coil/7");
    }
}
