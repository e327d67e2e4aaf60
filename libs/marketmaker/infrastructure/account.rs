//! Position and open-order store.
//!
//! Updated eagerly from the private stream and replaced by authoritative
//! pulls every few seconds. The pull merge is pending-aware: while trade
//! intents are outstanding for a token, only the average price is taken
//! from the pull because REST size lags fills we have already booked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::position::{OpenOrder, Position, Side};
use crate::infrastructure::exchange::{OpenOrderRecord, PositionRecord};
use crate::infrastructure::pending::PendingIntents;

const EPSILON: f64 = 1e-9;

/// The (at most) one tracked order per side of a token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideOrders {
    pub buy: Option<OpenOrder>,
    pub sell: Option<OpenOrder>,
}

impl SideOrders {
    pub fn get(&self, side: Side) -> Option<&OpenOrder> {
        match side {
            Side::Buy => self.buy.as_ref(),
            Side::Sell => self.sell.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<OpenOrder> {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_none() && self.sell.is_none()
    }
}

#[derive(Default)]
struct Inner {
    positions: HashMap<String, Position>,
    orders: HashMap<String, SideOrders>,
    /// order_id → (token, side) so stream removals need no token hint.
    order_index: HashMap<String, (String, Side)>,
}

#[derive(Default)]
pub struct AccountState {
    inner: RwLock<Inner>,
}

pub type SharedAccount = Arc<AccountState>;

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, token_id: &str) -> Position {
        self.inner
            .read()
            .positions
            .get(token_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn orders(&self, token_id: &str) -> SideOrders {
        self.inner
            .read()
            .orders
            .get(token_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Which (token, side) an order id belongs to, if tracked.
    pub fn lookup_order(&self, order_id: &str) -> Option<(String, Side)> {
        self.inner.read().order_index.get(order_id).cloned()
    }

    /// Eagerly book a fill from the private stream.
    pub fn apply_fill(&self, token_id: &str, side: Side, size: f64, price: f64) {
        let mut inner = self.inner.write();
        let position = inner.positions.entry(token_id.to_string()).or_default();
        match side {
            Side::Buy => position.apply_buy(size, price),
            Side::Sell => position.apply_sell(size),
        }
        if position.is_flat() {
            inner.positions.remove(token_id);
        }
    }

    /// Track a newly acknowledged order, replacing any previous order on
    /// the same side.
    pub fn apply_order_ack(
        &self,
        token_id: &str,
        side: Side,
        order_id: &str,
        price: f64,
        size: f64,
    ) {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let slot = inner
            .orders
            .entry(token_id.to_string())
            .or_default()
            .slot_mut(side);
        if let Some(previous) = slot.replace(OpenOrder::new(order_id.to_string(), price, size)) {
            inner.order_index.remove(&previous.order_id);
        }
        inner
            .order_index
            .insert(order_id.to_string(), (token_id.to_string(), side));
    }

    /// Remove an order that was cancelled or fully filled. Unknown ids
    /// are state errors: warn and rely on the next pull.
    pub fn apply_order_gone(&self, order_id: &str) {
        let mut inner = self.inner.write();
        let Some((token_id, side)) = inner.order_index.remove(order_id) else {
            warn!("[Account] Removal for unknown order {}", order_id);
            return;
        };
        if let Some(side_orders) = inner.orders.get_mut(&token_id) {
            let slot = side_orders.slot_mut(side);
            if slot.as_ref().map(|o| o.order_id == order_id).unwrap_or(false) {
                *slot = None;
            }
            if side_orders.is_empty() {
                inner.orders.remove(&token_id);
            }
        }
    }

    /// Shrink a tracked order's remaining size after a partial fill.
    pub fn apply_order_remaining(&self, order_id: &str, remaining: f64) {
        let mut inner = self.inner.write();
        let Some((token_id, side)) = inner.order_index.get(order_id).cloned() else {
            warn!("[Account] Update for unknown order {}", order_id);
            return;
        };
        if let Some(side_orders) = inner.orders.get_mut(&token_id) {
            if let Some(order) = side_orders.slot_mut(side).as_mut() {
                if order.order_id == order_id {
                    order.size = remaining.max(0.0);
                }
            }
        }
    }

    /// Replace state from an authoritative pull.
    ///
    /// Orders beyond one per (token, side) collapse to total size at the
    /// volume-weighted price under the earliest order's id. Positions for
    /// tokens with pending intents keep local size and adopt only the
    /// pulled average price. Returns tokens whose view materially
    /// changed, for reconciliation triggers.
    pub fn merge_authoritative(
        &self,
        positions: Vec<PositionRecord>,
        orders: Vec<OpenOrderRecord>,
        pending: &PendingIntents,
    ) -> Vec<String> {
        let mut new_positions: HashMap<String, Position> = HashMap::new();
        for record in positions {
            if record.size <= EPSILON {
                continue;
            }
            new_positions.insert(
                record.token_id.clone(),
                Position::new(record.size, record.avg_price),
            );
        }

        let mut new_orders: HashMap<String, SideOrders> = HashMap::new();
        let mut new_index: HashMap<String, (String, Side)> = HashMap::new();
        for record in orders {
            let slot = new_orders
                .entry(record.token_id.clone())
                .or_default()
                .slot_mut(record.side);
            match slot {
                Some(existing) => {
                    // Aggregate view: VWAP price, summed size, first id.
                    let total = existing.size + record.size;
                    existing.price =
                        (existing.price * existing.size + record.price * record.size) / total;
                    existing.size = total;
                }
                None => {
                    let mut order =
                        OpenOrder::new(record.order_id.clone(), record.price, record.size);
                    if let Some(created) = record.created_at {
                        order.placed_at = created;
                    }
                    new_index.insert(record.order_id.clone(), (record.token_id.clone(), record.side));
                    *slot = Some(order);
                }
            }
        }

        let mut inner = self.inner.write();

        // Pending-aware position merge.
        let tokens: HashSet<String> = inner
            .positions
            .keys()
            .chain(new_positions.keys())
            .cloned()
            .collect();
        let mut changed: HashSet<String> = HashSet::new();

        for token in tokens {
            let local = inner.positions.get(&token).copied().unwrap_or_default();
            let pulled = new_positions.get(&token).copied();

            let merged = if pending.has_token(&token) {
                let mut kept = local;
                if let Some(pulled) = pulled {
                    if let Some(avg) = pulled.avg_price() {
                        kept.set_avg_price(avg);
                    }
                }
                debug!(
                    "[Account] Pending intents for {}: keeping local size {:.2}",
                    token, kept.size
                );
                kept
            } else {
                pulled.unwrap_or_default()
            };

            if !positions_equal(&local, &merged) {
                changed.insert(token.clone());
            }
            if merged.is_flat() {
                inner.positions.remove(&token);
            } else {
                inner.positions.insert(token, merged);
            }
        }

        // Orders replace wholesale.
        let order_tokens: HashSet<String> = inner
            .orders
            .keys()
            .chain(new_orders.keys())
            .cloned()
            .collect();
        for token in order_tokens {
            let before = inner.orders.get(&token);
            let after = new_orders.get(&token);
            if !orders_equal(before, after) {
                changed.insert(token.clone());
            }
        }
        inner.orders = new_orders;
        inner.order_index = new_index;

        changed.into_iter().collect()
    }
}

fn positions_equal(a: &Position, b: &Position) -> bool {
    (a.size - b.size).abs() < EPSILON
        && match (a.avg_price(), b.avg_price()) {
            (Some(x), Some(y)) => (x - y).abs() < EPSILON,
            (None, None) => true,
            _ => false,
        }
}

fn orders_equal(a: Option<&SideOrders>, b: Option<&SideOrders>) -> bool {
    fn side_eq(a: Option<&OpenOrder>, b: Option<&OpenOrder>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => {
                a.order_id == b.order_id
                    && (a.price - b.price).abs() < EPSILON
                    && (a.size - b.size).abs() < EPSILON
            }
            (None, None) => true,
            _ => false,
        }
    }
    let empty = SideOrders::default();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    side_eq(a.buy.as_ref(), b.buy.as_ref()) && side_eq(a.sell.as_ref(), b.sell.as_ref())
}
