//! In-memory Modbus device.
//!
//! Used when no bus is configured and in tests. Every unit behaves the same:
//!
//! - input register `N` always holds `N`
//! - holding registers and coils start at zero and keep what is written
//! - discrete inputs mirror the coils at the same address

use std::collections::HashMap;

use async_trait::async_trait;

use modbridge_common::RegisterType;

use crate::error::TransportError;
use crate::master::ModbusMaster;

#[derive(Debug, Default, Clone)]
pub struct SimulatedDevice {
    holding: HashMap<(u8, u16), u16>,
    coils: HashMap<(u8, u16), bool>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_span(address: u16, count: u16) -> Result<(), TransportError> {
        if count == 0 || address.checked_add(count - 1).is_none() {
            return Err(TransportError::Exception(format!(
                "IllegalDataAddress ({} + {})",
                address, count
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ModbusMaster for SimulatedDevice {
    async fn read(
        &mut self,
        unit: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        Self::check_span(address, count)?;
        let values = (address..=address + (count - 1))
            .map(|addr| match register_type {
                RegisterType::InputRegister => addr,
                RegisterType::HoldingRegister => {
                    self.holding.get(&(unit, addr)).copied().unwrap_or(0)
                }
                RegisterType::Coil | RegisterType::DiscreteInput => {
                    u16::from(self.coils.get(&(unit, addr)).copied().unwrap_or(false))
                }
            })
            .collect();
        Ok(values)
    }

    async fn write_coil(
        &mut self,
        unit: u8,
        address: u16,
        state: bool,
    ) -> Result<(), TransportError> {
        self.coils.insert((unit, address), state);
        Ok(())
    }

    async fn write_registers(
        &mut self,
        unit: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let count = u16::try_from(values.len())
            .map_err(|_| TransportError::Exception("IllegalDataValue".to_string()))?;
        Self::check_span(address, count)?;
        for (addr, value) in (address..).zip(values) {
            self.holding.insert((unit, addr), *value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_input_registers_hold_their_address() {
        let mut device = SimulatedDevice::new();
        let values = device
            .read(1, RegisterType::InputRegister, 8, 3)
            .await
            .unwrap();
        assert_eq!(values, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn test_holding_write_then_read() {
        let mut device = SimulatedDevice::new();
        device.write_registers(1, 8, &[88, 123, 47]).await.unwrap();

        let values = device
            .read(1, RegisterType::HoldingRegister, 7, 5)
            .await
            .unwrap();
        assert_eq!(values, vec![0, 88, 123, 47, 0]);

        // Units are independent.
        let other = device
            .read(2, RegisterType::HoldingRegister, 8, 1)
            .await
            .unwrap();
        assert_eq!(other, vec![0]);
    }

    #[tokio::test]
    async fn test_discrete_inputs_mirror_coils() {
        let mut device = SimulatedDevice::new();
        device.write_coil(1, 3, true).await.unwrap();

        let coils = device.read(1, RegisterType::Coil, 2, 3).await.unwrap();
        let discrete = device
            .read(1, RegisterType::DiscreteInput, 2, 3)
            .await
            .unwrap();
        assert_eq!(coils, vec![0, 1, 0]);
        assert_eq!(discrete, coils);
    }

    #[tokio::test]
    async fn test_out_of_range() {
        let mut device = SimulatedDevice::new();
        assert!(
            device
                .read(1, RegisterType::InputRegister, u16::MAX, 2)
                .await
                .is_err()
        );
        assert!(device.write_registers(1, u16::MAX, &[1, 2]).await.is_err());
    }
}
