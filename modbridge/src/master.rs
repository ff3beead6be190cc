//! Modbus master: performs bus transactions.
//!
//! [`ModbusMaster`] is the seam between the bridge and the bus. The device
//! worker owns exactly one master and drives it one transaction at a time.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use modbridge_common::RegisterType;

use crate::config::{ConnectionConfig, Parity, SerialConfig, TcpConfig};
use crate::error::TransportError;
use crate::simulator::SimulatedDevice;

/// A Modbus bus endpoint.
///
/// Bit tables are returned as raw 0/1 values.
#[async_trait]
pub trait ModbusMaster: Send {
    async fn read(
        &mut self,
        unit: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_coil(&mut self, unit: u8, address: u16, state: bool)
    -> Result<(), TransportError>;

    async fn write_registers(
        &mut self,
        unit: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;

    /// Drop any connection state after a failed or abandoned transaction.
    fn reset(&mut self) {}
}

/// Build the master for a configured connection.
pub fn open(connection: &ConnectionConfig) -> Box<dyn ModbusMaster> {
    match connection {
        ConnectionConfig::Simulated => {
            info!("Using simulated Modbus device");
            Box::new(SimulatedDevice::new())
        }
        other => Box::new(TokioModbusMaster::new(other.clone())),
    }
}

/// Master backed by tokio-modbus over TCP or a serial line.
///
/// Connects on first use and reconnects after a transport failure.
pub struct TokioModbusMaster {
    connection: ConnectionConfig,
    ctx: Option<Context>,
}

impl TokioModbusMaster {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            ctx: None,
        }
    }

    async fn context(&mut self, unit: u8) -> Result<&mut Context, TransportError> {
        let ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => connect(&self.connection).await?,
        };
        let ctx = self.ctx.insert(ctx);
        ctx.set_slave(Slave(unit));
        Ok(ctx)
    }

    fn check<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if let Err(TransportError::Io(ref e)) = result {
            warn!(
                connection = %self.connection.describe(),
                error = %e,
                "Dropping Modbus connection"
            );
            self.ctx = None;
        }
        result
    }
}

#[async_trait]
impl ModbusMaster for TokioModbusMaster {
    async fn read(
        &mut self,
        unit: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let ctx = self.context(unit).await?;
        let result = match register_type {
            RegisterType::Coil => ctx
                .read_coils(address, count)
                .await
                .map(|r| r.map(bits_to_raw)),
            RegisterType::DiscreteInput => ctx
                .read_discrete_inputs(address, count)
                .await
                .map(|r| r.map(bits_to_raw)),
            RegisterType::HoldingRegister => ctx.read_holding_registers(address, count).await,
            RegisterType::InputRegister => ctx.read_input_registers(address, count).await,
        };
        let result = result
            .map_err(|e| TransportError::Io(e.to_string()))
            .and_then(|r| r.map_err(|e| TransportError::Exception(format!("{:?}", e))));
        self.check(result)
    }

    async fn write_coil(
        &mut self,
        unit: u8,
        address: u16,
        state: bool,
    ) -> Result<(), TransportError> {
        let ctx = self.context(unit).await?;
        let result = ctx
            .write_single_coil(address, state)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
            .and_then(|r| r.map_err(|e| TransportError::Exception(format!("{:?}", e))));
        self.check(result)
    }

    async fn write_registers(
        &mut self,
        unit: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let ctx = self.context(unit).await?;
        let result = ctx
            .write_multiple_registers(address, values)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
            .and_then(|r| r.map_err(|e| TransportError::Exception(format!("{:?}", e))));
        self.check(result)
    }

    fn reset(&mut self) {
        if self.ctx.take().is_some() {
            debug!(connection = %self.connection.describe(), "Modbus connection reset");
        }
    }
}

/// Line settings for a serial port. Framing values are checked at load time.
fn serial_builder(serial: &SerialConfig) -> tokio_serial::SerialPortBuilder {
    let parity = match serial.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    };
    let data_bits = match serial.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let stop_bits = match serial.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    tokio_serial::new(&serial.port, serial.baud_rate)
        .parity(parity)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
}

fn bits_to_raw(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}

/// Open a TCP or RTU context. The unit is set per transaction.
async fn connect(connection: &ConnectionConfig) -> Result<Context, TransportError> {
    match connection {
        ConnectionConfig::Tcp(TcpConfig { host, port }) => {
            let addr: SocketAddr = tokio::net::lookup_host((host.as_str(), *port))
                .await
                .map_err(|e| TransportError::Connection(format!("Invalid address: {}", e)))?
                .next()
                .ok_or_else(|| {
                    TransportError::Connection(format!("No address for {}:{}", host, port))
                })?;

            let ctx = tcp::connect(addr)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            info!(%addr, "Connected to Modbus TCP device");
            Ok(ctx)
        }
        ConnectionConfig::Rtu(serial) => {
            let stream = tokio_serial::SerialStream::open(&serial_builder(serial))
                .map_err(|e| TransportError::Connection(format!("Serial open failed: {}", e)))?;

            info!(port = %serial.port, baud_rate = serial.baud_rate, "Opened Modbus RTU port");
            Ok(rtu::attach(stream))
        }
        ConnectionConfig::Simulated => Err(TransportError::Connection(
            "simulated device has no bus connection".to_string(),
        )),
    }
}
