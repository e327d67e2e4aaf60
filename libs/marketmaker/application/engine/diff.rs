//! Per-side reconciliation decision.
//!
//! Hysteresis thresholds keep small drifts from churning orders: a
//! resting order is replaced only when price or size moves materially.

use crate::domain::position::OpenOrder;

use super::quotes::Quote;

/// What to do with one side of a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SideAction {
    /// Existing order (or lack of one) already matches the desire.
    Keep,
    /// Nothing resting; place the desired quote.
    Place(Quote),
    /// Resting order drifted; cancel it and place the desired quote.
    Replace(Quote),
    /// Resting order no longer wanted.
    Cancel,
}

impl SideAction {
    /// Does this action require the resting order to go away?
    pub fn needs_cancel(&self) -> bool {
        matches!(self, SideAction::Replace(_) | SideAction::Cancel)
    }

    pub fn quote(&self) -> Option<Quote> {
        match self {
            SideAction::Place(q) | SideAction::Replace(q) => Some(*q),
            _ => None,
        }
    }
}

/// Replacement thresholds for one side.
#[derive(Debug, Clone, Copy)]
pub struct SideThresholds {
    pub price_tol: f64,
    pub size_frac: f64,
}

/// Decide one side by comparing the tracked order against the desire.
pub fn side_action(
    existing: Option<&OpenOrder>,
    desired: Option<&Quote>,
    thresholds: SideThresholds,
) -> SideAction {
    match (existing, desired) {
        (None, None) => SideAction::Keep,
        (None, Some(quote)) => SideAction::Place(*quote),
        (Some(_), None) => SideAction::Cancel,
        (Some(order), Some(quote)) => {
            let price_drift = (order.price - quote.price).abs();
            let size_drift = if order.size > 0.0 {
                (order.size - quote.size).abs() / order.size
            } else {
                f64::INFINITY
            };
            if price_drift > thresholds.price_tol || size_drift > thresholds.size_frac {
                SideAction::Replace(*quote)
            } else {
                SideAction::Keep
            }
        }
    }
}
