//! Device worker: the single owner of the bus.
//!
//! Transactions are queued on an mpsc channel and executed strictly one at a
//! time. Callers hold a cloneable [`DeviceHandle`] and await the answer on a
//! oneshot channel, so polls, writes and passthrough reads from any task are
//! serialized on the bus.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::master::ModbusMaster;
use crate::store::CellRange;

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

enum Transaction {
    Read {
        range: CellRange,
        reply: Reply<Vec<u16>>,
    },
    WriteCoil {
        unit: u8,
        address: u16,
        state: bool,
        reply: Reply<()>,
    },
    WriteRegisters {
        unit: u8,
        address: u16,
        values: Vec<u16>,
        reply: Reply<()>,
    },
}

/// Create a worker around `master` and a handle to feed it.
pub fn device_channel(
    master: Box<dyn ModbusMaster>,
    timeout: Duration,
    queue_depth: usize,
) -> (DeviceWorker, DeviceHandle) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    (
        DeviceWorker {
            master,
            rx,
            timeout,
        },
        DeviceHandle { tx },
    )
}

/// Executes queued transactions against one master.
pub struct DeviceWorker {
    master: Box<dyn ModbusMaster>,
    rx: mpsc::Receiver<Transaction>,
    timeout: Duration,
}

impl DeviceWorker {
    /// Run until every handle has been dropped.
    pub async fn run(mut self) {
        info!(timeout_ms = self.timeout_ms(), "Device worker started");

        while let Some(transaction) = self.rx.recv().await {
            self.execute(transaction).await;
        }

        debug!("Device worker stopped");
    }

    async fn execute(&mut self, transaction: Transaction) {
        match transaction {
            Transaction::Read { range, reply } => {
                trace!(%range, "Bus read");
                let result = self.read(&range).await;
                let _ = reply.send(result);
            }
            Transaction::WriteCoil {
                unit,
                address,
                state,
                reply,
            } => {
                trace!(unit, address, state, "Bus coil write");
                let result =
                    timeout(self.timeout, self.master.write_coil(unit, address, state)).await;
                let _ = reply.send(self.settle(result));
            }
            Transaction::WriteRegisters {
                unit,
                address,
                values,
                reply,
            } => {
                trace!(unit, address, count = values.len(), "Bus register write");
                let result = timeout(
                    self.timeout,
                    self.master.write_registers(unit, address, &values),
                )
                .await;
                let _ = reply.send(self.settle(result));
            }
        }
    }

    async fn read(&mut self, range: &CellRange) -> Result<Vec<u16>, TransportError> {
        let result = timeout(
            self.timeout,
            self.master
                .read(range.unit, range.register_type, range.address, range.length),
        )
        .await;
        let mut values = self.settle(result)?;

        let expected = usize::from(range.length);
        if values.len() < expected {
            return Err(TransportError::ShortResponse {
                expected,
                got: values.len(),
            });
        }
        // Bit reads come back padded to whole bytes.
        values.truncate(expected);
        Ok(values)
    }

    fn settle<T>(
        &mut self,
        result: Result<Result<T, TransportError>, Elapsed>,
    ) -> Result<T, TransportError> {
        match result {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms(), "Modbus transaction timed out");
                self.master.reset();
                Err(TransportError::Timeout(self.timeout_ms()))
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Cloneable handle for submitting transactions to the device worker.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<Transaction>,
}

impl DeviceHandle {
    /// Read `range` from the device.
    pub async fn read(&self, range: CellRange) -> Result<Vec<u16>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Transaction::Read { range, reply }, rx).await
    }

    pub async fn write_coil(
        &self,
        unit: u8,
        address: u16,
        state: bool,
    ) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.submit(
            Transaction::WriteCoil {
                unit,
                address,
                state,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn write_registers(
        &self,
        unit: u8,
        address: u16,
        values: Vec<u16>,
    ) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.submit(
            Transaction::WriteRegisters {
                unit,
                address,
                values,
                reply,
            },
            rx,
        )
        .await
    }

    async fn submit<T>(
        &self,
        transaction: Transaction,
        rx: oneshot::Receiver<Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        self.tx
            .send(transaction)
            .await
            .map_err(|_| TransportError::WorkerClosed)?;
        rx.await.map_err(|_| TransportError::WorkerClosed)?
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transaction::Read { range, .. } => write!(f, "Read({})", range),
            Transaction::WriteCoil { unit, address, .. } => {
                write!(f, "WriteCoil(unit {} @ {})", unit, address)
            }
            Transaction::WriteRegisters {
                unit,
                address,
                values,
                ..
            } => write!(
                f,
                "WriteRegisters(unit {} @ {} x{})",
                unit,
                address,
                values.len()
            ),
        }
    }
}
