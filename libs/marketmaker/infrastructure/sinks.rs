//! Structured output sinks.
//!
//! Trade-log and snapshot records are append-only JSON lines. Sinks are
//! best-effort: a failed write warns and drops the record rather than
//! disturbing trading.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::domain::position::Side;

/// One local fill.
#[derive(Debug, Clone, Serialize)]
pub struct FillRecord {
    pub timestamp: DateTime<Utc>,
    pub trade_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// One open order at snapshot time (reward accounting input).
#[derive(Debug, Clone, Serialize)]
pub struct RewardSnapshotRecord {
    pub timestamp: DateTime<Utc>,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub order_id: String,
    pub price: f64,
    pub size: f64,
}

/// One nonzero position at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshotRecord {
    pub timestamp: DateTime<Utc>,
    pub token_id: String,
    pub size: f64,
    pub avg_price: f64,
}

pub trait TradeLog: Send + Sync {
    fn record_fill(&self, record: &FillRecord);
}

pub trait SnapshotSink: Send + Sync {
    fn record_rewards(&self, records: &[RewardSnapshotRecord]);
    fn record_positions(&self, records: &[PositionSnapshotRecord]);
}

/// Append-only JSON-lines file sink.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn append<T: Serialize>(&self, record: &T) {
        let mut writer = self.writer.lock();
        let outcome = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = outcome {
            warn!("[Sink] Dropped record: {}", e);
        }
    }
}

impl TradeLog for JsonlSink {
    fn record_fill(&self, record: &FillRecord) {
        self.append(record);
    }
}

impl SnapshotSink for JsonlSink {
    fn record_rewards(&self, records: &[RewardSnapshotRecord]) {
        for record in records {
            self.append(record);
        }
    }

    fn record_positions(&self, records: &[PositionSnapshotRecord]) {
        for record in records {
            self.append(record);
        }
    }
}

/// Discards everything; handy in tests and dry runs.
#[derive(Default)]
pub struct NullSink;

impl TradeLog for NullSink {
    fn record_fill(&self, _: &FillRecord) {}
}

impl SnapshotSink for NullSink {
    fn record_rewards(&self, _: &[RewardSnapshotRecord]) {}
    fn record_positions(&self, _: &[PositionSnapshotRecord]) {}
}
