//! In-memory register store.
//!
//! Cells are kept in an ordered map keyed by `(unit, type, address)`, so all
//! cells of one unit/type sit next to each other and a register range is a
//! contiguous range scan. The store is volatile and starts empty.
//!
//! All timestamps are milliseconds since the Unix epoch; zero means "never".

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use modbridge_common::RegisterType;

use crate::config::CacheConfig;

/// Key of one register cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub unit: u8,
    pub register_type: RegisterType,
    pub address: u16,
}

impl CellKey {
    pub fn new(unit: u8, register_type: RegisterType, address: u16) -> Self {
        Self {
            unit,
            register_type,
            address,
        }
    }
}

/// Cached state of one register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterCell {
    /// Last value read from or written to the device (0/1 for bit tables).
    pub value: u16,
    /// When a client last asked for this cell while it was not pending.
    pub requested_at: i64,
    /// When the device last answered for this cell.
    pub answered_at: i64,
    /// When this cell's value was last pushed to subscribers.
    pub broadcast_at: i64,
}

/// A contiguous run of registers on one unit and table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub unit: u8,
    pub register_type: RegisterType,
    pub address: u16,
    pub length: u16,
}

impl CellRange {
    /// Build a range, rejecting empty ranges and ranges past address 65535.
    pub fn new(unit: u8, register_type: RegisterType, address: u16, length: u16) -> Option<Self> {
        if length == 0 {
            return None;
        }
        address.checked_add(length - 1)?;
        Some(Self {
            unit,
            register_type,
            address,
            length,
        })
    }

    /// Last address covered (inclusive).
    pub fn last(&self) -> u16 {
        self.address + (self.length - 1)
    }

    pub fn addresses(&self) -> RangeInclusive<u16> {
        self.address..=self.last()
    }

    fn first_key(&self) -> CellKey {
        CellKey::new(self.unit, self.register_type, self.address)
    }

    fn last_key(&self) -> CellKey {
        CellKey::new(self.unit, self.register_type, self.last())
    }

    fn keys(&self) -> RangeInclusive<CellKey> {
        self.first_key()..=self.last_key()
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unit {} {} [{}..={}]",
            self.unit,
            self.register_type,
            self.address,
            self.last()
        )
    }
}

/// Timing windows and batch bound, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub valid_answer_window: i64,
    pub forget_ask_window: i64,
    pub resend_wait_window: i64,
    pub max_batch_length: u16,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            valid_answer_window: millis(config.valid_answer_window_ms),
            forget_ask_window: millis(config.forget_ask_window_ms),
            resend_wait_window: millis(config.resend_wait_window_ms),
            max_batch_length: config.max_batch_length.max(1),
        }
    }
}

fn millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// The register cache state.
#[derive(Debug, Default)]
pub struct RegisterStore {
    cells: BTreeMap<CellKey, RegisterCell>,
    policy: CachePolicy,
}

impl RegisterStore {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            cells: BTreeMap::new(),
            policy,
        }
    }

    /// Number of cells held.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Create any missing cells in the range with zeroed state.
    pub fn ensure(&mut self, range: &CellRange) {
        for address in range.addresses() {
            self.cells
                .entry(CellKey::new(range.unit, range.register_type, address))
                .or_default();
        }
    }

    /// All cells in the range, or `None` if any is missing.
    pub fn get(&self, range: &CellRange) -> Option<Vec<RegisterCell>> {
        let cells: Vec<RegisterCell> = self.cells.range(range.keys()).map(|(_, c)| *c).collect();
        (cells.len() == usize::from(range.length)).then_some(cells)
    }

    pub fn cell(&self, key: &CellKey) -> Option<&RegisterCell> {
        self.cells.get(key)
    }

    /// Whether a cell is waiting for a poll at `now`.
    pub fn is_pending(&self, cell: &RegisterCell, now: i64) -> bool {
        cell.requested_at > 0 && cell.requested_at > now - self.policy.forget_ask_window
    }

    /// Put unrequested or forgotten cells of the range into the poll queue.
    ///
    /// Cells that are already pending keep their original request time.
    pub fn mark_requested(&mut self, range: &CellRange, now: i64) {
        let forget = self.policy.forget_ask_window;
        for (_, cell) in self.cells.range_mut(range.keys()) {
            if cell.requested_at == 0 || cell.requested_at <= now - forget {
                cell.requested_at = now;
            }
        }
    }

    /// Values of the range if every cell is fresh and not recently broadcast.
    pub fn servable_values(&self, range: &CellRange, now: i64) -> Option<Vec<u16>> {
        let cells = self.get(range)?;
        let servable = cells.iter().all(|cell| {
            cell.answered_at > 0
                && cell.answered_at > now - self.policy.valid_answer_window
                && cell.broadcast_at < now - self.policy.resend_wait_window
        });
        servable.then(|| cells.iter().map(|c| c.value).collect())
    }

    pub fn mark_broadcast(&mut self, range: &CellRange, now: i64) {
        for (_, cell) in self.cells.range_mut(range.keys()) {
            cell.broadcast_at = now;
        }
    }

    /// Store a device answer and take the cells out of the poll queue.
    ///
    /// `values` is matched to the range address by address; surplus values
    /// are ignored.
    pub fn record_answer(&mut self, range: &CellRange, values: &[u16], now: i64) {
        for (address, value) in range.addresses().zip(values) {
            let cell = self
                .cells
                .entry(CellKey::new(range.unit, range.register_type, address))
                .or_default();
            cell.value = *value;
            cell.answered_at = now;
            cell.requested_at = 0;
        }
    }

    /// Forget everything known about the range so the next read re-polls it.
    pub fn invalidate(&mut self, range: &CellRange) {
        for (_, cell) in self.cells.range_mut(range.keys()) {
            cell.requested_at = 0;
            cell.answered_at = 0;
            cell.broadcast_at = 0;
        }
    }

    /// Select the next range to poll.
    ///
    /// The anchor is the pending cell with the oldest request time (address,
    /// then unit, then type break ties). The batch spans from the anchor to
    /// the highest pending address of the same unit and type that fits in
    /// `max_batch_length` registers. Addresses in between are read too.
    pub fn next_pending_batch(&self, now: i64) -> Option<CellRange> {
        let (anchor, _) = self
            .cells
            .iter()
            .filter(|(_, cell)| self.is_pending(cell, now))
            .min_by_key(|(key, cell)| {
                (
                    cell.requested_at,
                    key.address,
                    key.unit,
                    key.register_type,
                )
            })?;

        let room = u32::from(u16::MAX) - u32::from(anchor.address) + 1;
        let span = room.min(u32::from(self.policy.max_batch_length));
        let window = CellRange::new(
            anchor.unit,
            anchor.register_type,
            anchor.address,
            u16::try_from(span).ok()?,
        )?;

        let last = self
            .cells
            .range(window.keys())
            .filter(|(_, cell)| self.is_pending(cell, now))
            .map(|(key, _)| key.address)
            .max()
            .unwrap_or(anchor.address);

        CellRange::new(
            anchor.unit,
            anchor.register_type,
            anchor.address,
            last - anchor.address + 1,
        )
    }

    /// Drop cells that are neither pending nor touched within `idle` ms.
    ///
    /// Returns how many cells were removed.
    pub fn evict_idle(&mut self, idle: i64, now: i64) -> usize {
        let forget = self.policy.forget_ask_window;
        let before = self.cells.len();
        self.cells.retain(|_, cell| {
            let pending = cell.requested_at > 0 && cell.requested_at > now - forget;
            let last_touch = cell
                .requested_at
                .max(cell.answered_at)
                .max(cell.broadcast_at);
            pending || last_touch > now - idle
        });
        before - self.cells.len()
    }
}
