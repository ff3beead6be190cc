//! Uncached operation: every command is one bus transaction.

use tracing::warn;

use modbridge_common::{Flag, RegisterData, RegisterType};

use crate::device::DeviceHandle;
use crate::emitter::EventEmitter;
use crate::error::{CacheError, Result};
use crate::store::CellRange;

#[derive(Debug, Clone)]
pub struct Passthrough {
    device: DeviceHandle,
    emitter: EventEmitter,
}

impl Passthrough {
    pub fn new(device: DeviceHandle, emitter: EventEmitter) -> Self {
        Self { device, emitter }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Read the range from the device and broadcast the answer.
    pub async fn read(&self, range: CellRange) -> Result<()> {
        match self.device.read(range).await {
            Ok(values) => {
                self.emitter.emit_values(&range, &values, Flag::Get);
                Ok(())
            }
            Err(e) => Err(self.failed(&range, e.into())),
        }
    }

    pub async fn write_coil(&self, unit: u8, address: u16, state: bool) -> Result<()> {
        let range = self.range(unit, RegisterType::Coil, address, 1)?;
        match self.device.write_coil(unit, address, state).await {
            Ok(()) => {
                self.emitter
                    .emit_data(&range, RegisterData::Bit(state), Flag::Set);
                Ok(())
            }
            Err(e) => Err(self.failed(&range, e.into())),
        }
    }

    pub async fn write_registers(&self, unit: u8, address: u16, values: Vec<u16>) -> Result<()> {
        let length = u16::try_from(values.len()).unwrap_or(0);
        let range = self.range(unit, RegisterType::HoldingRegister, address, length)?;
        match self
            .device
            .write_registers(unit, address, values.clone())
            .await
        {
            Ok(()) => {
                self.emitter
                    .emit_data(&range, RegisterData::Words(values), Flag::Set);
                Ok(())
            }
            Err(e) => Err(self.failed(&range, e.into())),
        }
    }

    fn range(
        &self,
        unit: u8,
        register_type: RegisterType,
        address: u16,
        length: u16,
    ) -> Result<CellRange> {
        CellRange::new(unit, register_type, address, length).ok_or_else(|| {
            let err = CacheError::InvalidRange(format!(
                "{} write of {} values at {}",
                register_type, length, address
            ));
            self.emitter.emit_error(&err);
            err
        })
    }

    fn failed(&self, range: &CellRange, err: CacheError) -> CacheError {
        warn!(%range, error = %err, "Passthrough transaction failed");
        self.emitter.emit_error(&err);
        err
    }
}
