//! Coalescing reconciliation triggers.
//!
//! While a market's worker is busy, any number of incoming triggers
//! collapse into a single retry carrying the strongest kind seen.
//! Private and periodic triggers outrank book ticks because they bypass
//! the book-trigger rate limit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Why a reconciliation is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TriggerKind {
    /// Order-book delta; rate-limited.
    Book = 1,
    /// Periodic pull or registry change; bypasses the rate limit.
    Periodic = 2,
    /// Own fill or order update; bypasses the rate limit.
    Private = 3,
}

impl TriggerKind {
    fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(TriggerKind::Book),
            2 => Some(TriggerKind::Periodic),
            3 => Some(TriggerKind::Private),
            _ => None,
        }
    }

    pub fn bypasses_rate_limit(&self) -> bool {
        !matches!(self, TriggerKind::Book)
    }
}

/// One market's pending-trigger slot.
#[derive(Default)]
pub struct TriggerCell {
    level: AtomicU8,
    notify: Notify,
}

impl TriggerCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger; a stronger pending kind is kept.
    pub fn fire(&self, kind: TriggerKind) {
        self.level.fetch_max(kind as u8, Ordering::AcqRel);
        self.notify.notify_one();
    }

    /// Wait for the next trigger, consuming the pending slot.
    pub async fn wait(&self) -> TriggerKind {
        loop {
            let notified = self.notify.notified();
            if let Some(kind) = TriggerKind::from_level(self.level.swap(0, Ordering::AcqRel)) {
                return kind;
            }
            notified.await;
        }
    }

    /// Non-blocking probe used in tests.
    pub fn pending(&self) -> Option<TriggerKind> {
        TriggerKind::from_level(self.level.load(Ordering::Acquire))
    }
}

/// condition_id → trigger cell, shared by streams and the scheduler.
#[derive(Default, Clone)]
pub struct TriggerBus {
    cells: Arc<RwLock<HashMap<String, Arc<TriggerCell>>>>,
}

impl TriggerBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell for a market, created on first use.
    pub fn cell(&self, condition_id: &str) -> Arc<TriggerCell> {
        if let Some(cell) = self.cells.read().get(condition_id) {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write();
        Arc::clone(
            cells
                .entry(condition_id.to_string())
                .or_insert_with(|| Arc::new(TriggerCell::new())),
        )
    }

    pub fn fire(&self, condition_id: &str, kind: TriggerKind) {
        self.cell(condition_id).fire(kind);
    }

    pub fn remove(&self, condition_id: &str) {
        self.cells.write().remove(condition_id);
    }
}
