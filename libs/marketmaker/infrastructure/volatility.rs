//! Volatility input.
//!
//! The price-history collector is an external collaborator; the core only
//! reads one scalar per market through this interface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub trait VolatilitySource: Send + Sync {
    /// Latest volatility reading for a market; `None` means no data yet,
    /// which the engine treats as calm.
    fn volatility(&self, condition_id: &str) -> Option<f64>;
}

/// Shared table the collector writes into and the core reads from.
#[derive(Default)]
pub struct VolatilityTable {
    values: RwLock<HashMap<String, f64>>,
}

pub type SharedVolatility = Arc<dyn VolatilitySource>;

impl VolatilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, condition_id: &str, value: f64) {
        self.values
            .write()
            .insert(condition_id.to_string(), value);
    }

    pub fn remove(&self, condition_id: &str) {
        self.values.write().remove(condition_id);
    }
}

impl VolatilitySource for VolatilityTable {
    fn volatility(&self, condition_id: &str) -> Option<f64> {
        self.values.read().get(condition_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_readings() {
        let table = VolatilityTable::new();
        assert_eq!(table.volatility("c1"), None);
        table.set("c1", 12.5);
        assert_eq!(table.volatility("c1"), Some(12.5));
        table.remove("c1");
        assert_eq!(table.volatility("c1"), None);
    }
}
