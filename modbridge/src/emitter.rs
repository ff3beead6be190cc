//! Event fan-out to subscribers.
//!
//! The emitter does not decide freshness; callers choose when to emit.

use tokio::sync::broadcast;
use tracing::trace;

use modbridge_common::{BridgeEvent, DataEvent, ErrorEvent, Flag, RegisterData};

use crate::store::CellRange;

/// Broadcasts bridge events to every live subscriber.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        // Nobody listening is not an error.
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(receivers, "Event emitted");
    }

    /// Emit raw cell values for a range, presented for its table.
    pub fn emit_values(&self, range: &CellRange, values: &[u16], flag: Flag) {
        let data = RegisterData::from_raw(range.register_type, values);
        self.emit_data(range, data, flag);
    }

    pub fn emit_data(&self, range: &CellRange, data: RegisterData, flag: Flag) {
        self.emit(
            DataEvent::new(range.unit, range.register_type, range.address, data, flag).into(),
        );
    }

    pub fn emit_error(&self, err: impl std::fmt::Display) {
        self.emit(ErrorEvent::new(err.to_string()).into());
    }
}
