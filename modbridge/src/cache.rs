//! Demand-driven register cache.
//!
//! Client reads only record demand: a range that is fresh and not recently
//! broadcast is answered from the store at once, anything else waits for the
//! poll scheduler. Polls and writes go through the device worker and always
//! broadcast their result.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use modbridge_common::{Flag, RegisterData, RegisterType, current_timestamp_millis};

use crate::device::DeviceHandle;
use crate::emitter::EventEmitter;
use crate::error::{CacheError, Result};
use crate::store::{CachePolicy, CellRange, RegisterStore};

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending.
    Idle,
    /// The range was read and broadcast.
    Polled(CellRange),
    /// The cycle failed; an error event was emitted.
    Failed(CacheError),
}

/// Shared handle to the register store, the device and the emitter.
#[derive(Debug, Clone)]
pub struct RegisterCache {
    store: Arc<Mutex<RegisterStore>>,
    device: DeviceHandle,
    emitter: EventEmitter,
}

impl RegisterCache {
    pub fn new(policy: CachePolicy, device: DeviceHandle, emitter: EventEmitter) -> Self {
        Self {
            store: Arc::new(Mutex::new(RegisterStore::new(policy))),
            device,
            emitter,
        }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Number of cells currently held.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Run `f` against the store, e.g. to inspect cells.
    pub fn with_store<T>(&self, f: impl FnOnce(&RegisterStore) -> T) -> Result<T> {
        Ok(f(&*self.lock()?))
    }

    /// Record demand for a range.
    ///
    /// Returns `true` when the range was answered from cache right away.
    pub fn request(&self, range: CellRange) -> Result<bool> {
        self.request_at(range, current_timestamp_millis())
    }

    pub fn request_at(&self, range: CellRange, now: i64) -> Result<bool> {
        let served = self.reported(|| {
            let mut store = self.lock()?;
            store.ensure(&range);
            store.mark_requested(&range, now);
            let values = store.servable_values(&range, now);
            if values.is_some() {
                store.mark_broadcast(&range, now);
            }
            Ok(values)
        })?;

        match served {
            Some(values) => {
                debug!(%range, "Served from cache");
                self.emitter.emit_values(&range, &values, Flag::Get);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll the next pending range, if any.
    pub async fn poll_next_group(&self) -> PollOutcome {
        self.poll_next_group_at(current_timestamp_millis()).await
    }

    /// Poll the next pending range as of `now`.
    ///
    /// Exactly one device read is issued when something is pending.
    pub async fn poll_next_group_at(&self, now: i64) -> PollOutcome {
        let range = match self.reported(|| Ok(self.lock()?.next_pending_batch(now))) {
            Ok(Some(range)) => range,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => return PollOutcome::Failed(e),
        };

        debug!(%range, "Polling");

        let values = match self.device.read(range).await {
            Ok(values) => values,
            Err(e) => {
                warn!(%range, error = %e, "Poll failed");
                self.emitter.emit_error(&e);
                return PollOutcome::Failed(e.into());
            }
        };

        let stored = self.reported(|| {
            let mut store = self.lock()?;
            store.record_answer(&range, &values, now);
            store.mark_broadcast(&range, now);
            Ok(())
        });
        if let Err(e) = stored {
            return PollOutcome::Failed(e);
        }

        self.emitter.emit_values(&range, &values, Flag::Get);
        PollOutcome::Polled(range)
    }

    /// Force a single coil, then invalidate it and broadcast the new state.
    pub async fn write_coil(&self, unit: u8, address: u16, state: bool) -> Result<()> {
        let range = self.write_range(unit, RegisterType::Coil, address, 1)?;
        self.reported(|| {
            self.lock()?.ensure(&range);
            Ok(())
        })?;

        if let Err(e) = self.device.write_coil(unit, address, state).await {
            warn!(%range, error = %e, "Coil write failed");
            self.emitter.emit_error(&e);
            return Err(e.into());
        }

        self.reported(|| {
            self.lock()?.invalidate(&range);
            Ok(())
        })?;
        self.emitter
            .emit_data(&range, RegisterData::Bit(state), Flag::Set);
        Ok(())
    }

    /// Preset a block of holding registers, then invalidate it and broadcast
    /// the written values.
    pub async fn write_registers(&self, unit: u8, address: u16, values: Vec<u16>) -> Result<()> {
        let length = u16::try_from(values.len()).unwrap_or(0);
        let range = self.write_range(unit, RegisterType::HoldingRegister, address, length)?;
        self.reported(|| {
            self.lock()?.ensure(&range);
            Ok(())
        })?;

        if let Err(e) = self
            .device
            .write_registers(unit, address, values.clone())
            .await
        {
            warn!(%range, error = %e, "Register write failed");
            self.emitter.emit_error(&e);
            return Err(e.into());
        }

        self.reported(|| {
            self.lock()?.invalidate(&range);
            Ok(())
        })?;
        self.emitter
            .emit_data(&range, RegisterData::Words(values), Flag::Set);
        Ok(())
    }

    /// Drop cells idle for `idle_ms`. Returns how many were removed.
    pub fn evict_idle_at(&self, idle_ms: i64, now: i64) -> Result<usize> {
        self.reported(|| Ok(self.lock()?.evict_idle(idle_ms, now)))
    }

    fn write_range(
        &self,
        unit: u8,
        register_type: RegisterType,
        address: u16,
        length: u16,
    ) -> Result<CellRange> {
        self.reported(|| {
            CellRange::new(unit, register_type, address, length).ok_or_else(|| {
                CacheError::InvalidRange(format!(
                    "{} write of {} values at {}",
                    register_type, length, address
                ))
            })
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegisterStore>> {
        Ok(self.store.lock()?)
    }

    /// Run a store step, broadcasting its error if it fails.
    fn reported<T>(&self, step: impl FnOnce() -> Result<T>) -> Result<T> {
        step().inspect_err(|e| self.emitter.emit_error(e))
    }
}
