//! Positions and tracked open orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SIZE_EPSILON: f64 = 1e-9;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse the wire-format side; unknown strings map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Long position in a single outcome token.
///
/// `avg_price` is the size-weighted mean of unmatched buys and is only
/// meaningful while `size > 0`; use [`Position::avg_price`] which encodes
/// that invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub size: f64,
    avg_price: f64,
}

impl Position {
    pub fn new(size: f64, avg_price: f64) -> Self {
        if size > SIZE_EPSILON {
            Self { size, avg_price }
        } else {
            Self::default()
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size <= SIZE_EPSILON
    }

    /// Average entry price, defined iff the position is open.
    pub fn avg_price(&self) -> Option<f64> {
        if self.is_flat() {
            None
        } else {
            Some(self.avg_price)
        }
    }

    /// Cost basis in stablecoin (size × avg price), zero when flat.
    pub fn notional(&self) -> f64 {
        if self.is_flat() {
            0.0
        } else {
            self.size * self.avg_price
        }
    }

    /// Fold a buy fill into the weighted average.
    pub fn apply_buy(&mut self, fill_size: f64, fill_price: f64) {
        if fill_size <= 0.0 {
            return;
        }
        let new_size = self.size + fill_size;
        self.avg_price = (self.avg_price * self.size + fill_price * fill_size) / new_size;
        self.size = new_size;
    }

    /// Apply a sell fill. Size never goes negative; the average survives
    /// while anything remains and resets once flat.
    pub fn apply_sell(&mut self, fill_size: f64) {
        if fill_size <= 0.0 {
            return;
        }
        self.size = (self.size - fill_size).max(0.0);
        if self.is_flat() {
            *self = Self::default();
        }
    }

    /// Replace the average price, keeping local size (pending-aware merge).
    pub fn set_avg_price(&mut self, avg_price: f64) {
        if !self.is_flat() {
            self.avg_price = avg_price;
        }
    }
}

/// The single tracked open order per (token, side).
///
/// When the exchange holds several orders on a side they are collapsed to
/// this aggregate (total size, volume-weighted price) at pull time.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: String,
    pub price: f64,
    pub size: f64,
    pub placed_at: DateTime<Utc>,
}

impl OpenOrder {
    pub fn new(order_id: String, price: f64, size: f64) -> Self {
        Self {
            order_id,
            price,
            size,
            placed_at: Utc::now(),
        }
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_fill_updates_weighted_average() {
        let mut pos = Position::default();
        pos.apply_buy(40.0, 0.50);
        assert_eq!(pos.size, 40.0);
        assert_eq!(pos.avg_price(), Some(0.50));

        pos.apply_buy(40.0, 0.60);
        assert_eq!(pos.size, 80.0);
        assert!((pos.avg_price().unwrap() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn sell_fill_keeps_average_until_flat() {
        let mut pos = Position::new(40.0, 0.50);
        pos.apply_sell(10.0);
        assert_eq!(pos.size, 30.0);
        assert_eq!(pos.avg_price(), Some(0.50));

        pos.apply_sell(100.0); // oversell clamps at zero
        assert!(pos.is_flat());
        assert_eq!(pos.avg_price(), None);
    }

    #[test]
    fn avg_price_undefined_when_flat() {
        let pos = Position::default();
        assert!(pos.is_flat());
        assert_eq!(pos.avg_price(), None);
        assert_eq!(pos.notional(), 0.0);

        // constructing with zero size discards the price
        let pos = Position::new(0.0, 0.73);
        assert_eq!(pos.avg_price(), None);
    }

    #[test]
    fn size_never_negative() {
        let mut pos = Position::new(5.0, 0.40);
        pos.apply_sell(7.0);
        assert_eq!(pos.size, 0.0);
    }

    #[test]
    fn side_parse_is_case_insensitive() {
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("cancel"), None);
    }
}
