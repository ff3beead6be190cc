//! Command dispatch for cached and passthrough modes.

use tracing::debug;

use modbridge_common::BridgeCommand;

use crate::cache::RegisterCache;
use crate::emitter::EventEmitter;
use crate::error::{CacheError, Result};
use crate::passthrough::Passthrough;
use crate::store::CellRange;

/// The bridge core the command relay talks to.
#[derive(Debug, Clone)]
pub enum Bridge {
    Cached(RegisterCache),
    Passthrough(Passthrough),
}

impl Bridge {
    pub fn emitter(&self) -> &EventEmitter {
        match self {
            Bridge::Cached(cache) => cache.emitter(),
            Bridge::Passthrough(passthrough) => passthrough.emitter(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Bridge::Cached(_))
    }

    /// Apply one client command.
    ///
    /// Failures have already been broadcast as error events when this returns.
    pub async fn execute(&self, command: &BridgeCommand) -> Result<()> {
        debug!(?command, "Executing command");

        match command {
            BridgeCommand::WriteCoil(req) => match self {
                Bridge::Cached(cache) => cache.write_coil(req.unit, req.address, req.state).await,
                Bridge::Passthrough(p) => p.write_coil(req.unit, req.address, req.state).await,
            },
            BridgeCommand::WriteRegisters(req) => {
                let values = req.values.clone();
                match self {
                    Bridge::Cached(cache) => {
                        cache.write_registers(req.unit, req.address, values).await
                    }
                    Bridge::Passthrough(p) => {
                        p.write_registers(req.unit, req.address, values).await
                    }
                }
            }
            read => {
                let range = self.read_range(read)?;
                match self {
                    Bridge::Cached(cache) => cache.request(range).map(|_| ()),
                    Bridge::Passthrough(p) => p.read(range).await,
                }
            }
        }
    }

    fn read_range(&self, command: &BridgeCommand) -> Result<CellRange> {
        let register_type = command.register_type();
        let range = command.as_read().and_then(|req| {
            CellRange::new(req.unit, register_type, req.address, req.length)
        });

        range.ok_or_else(|| {
            let err = CacheError::InvalidRange(match command.as_read() {
                Some(req) => format!(
                    "{} read of {} values at {}",
                    register_type, req.length, req.address
                ),
                None => format!("{:?} is not a read", command),
            });
            self.emitter().emit_error(&err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::device_channel;
    use crate::simulator::SimulatedDevice;
    use crate::store::CachePolicy;
    use modbridge_common::{CommandEnvelope, Flag, RegisterData};

    fn cached() -> Bridge {
        let (worker, handle) =
            device_channel(Box::new(SimulatedDevice::new()), Duration::from_secs(1), 8);
        tokio::spawn(worker.run());
        Bridge::Cached(RegisterCache::new(
            CachePolicy::default(),
            handle,
            EventEmitter::new(16),
        ))
    }

    fn command(json: &str) -> BridgeCommand {
        serde_json::from_str::<CommandEnvelope>(json)
            .unwrap()
            .command
    }

    #[tokio::test]
    async fn test_cached_read_is_deferred() {
        let bridge = cached();
        let mut rx = bridge.emitter().subscribe();

        bridge
            .execute(&command(
                r#"{"command": "readHoldingRegisters", "unit": 1, "address": 0, "length": 4}"#,
            ))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_registers_emits_set() {
        let bridge = cached();
        let mut rx = bridge.emitter().subscribe();

        bridge
            .execute(&command(
                r#"{"command": "setRegisters", "unit": 1, "address": 8, "values": [88, 123, 47]}"#,
            ))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        let data = event.as_data().unwrap();
        assert_eq!(data.flag, Flag::Set);
        assert_eq!(data.data, RegisterData::Words(vec![88, 123, 47]));
    }

    #[tokio::test]
    async fn test_invalid_read_range_emits_error() {
        let bridge = cached();
        let mut rx = bridge.emitter().subscribe();

        let result = bridge
            .execute(&command(
                r#"{"command": "readCoils", "unit": 1, "address": 65535, "length": 2}"#,
            ))
            .await;

        assert!(matches!(result, Err(CacheError::InvalidRange(_))));
        assert!(rx.recv().await.unwrap().as_error().is_some());
    }
}
