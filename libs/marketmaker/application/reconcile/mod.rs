//! Per-market reconciliation: trigger plumbing and the serialized worker.

pub mod reconciler;
pub mod trigger;

pub use reconciler::{MarketWorker, WorkerCtx, WorkerSet};
pub use trigger::{TriggerBus, TriggerCell, TriggerKind};
