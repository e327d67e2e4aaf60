//! Per-token order book.
//!
//! Prices and sizes are held as integer micros (1e-6 units). A side is
//! a price-ascending Vec regardless of direction; "best" is simply one
//! end of it (highest bid, lowest ask). Exchange depth is tens of
//! levels, small enough that a keyed binary search into a flat Vec
//! beats tree structures in practice.

use serde::{Deserialize, Serialize};

/// One price level as it arrives on the wire. Strings sidestep float
/// precision in transit; conversion happens exactly once, here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub size: String,
}

/// Convert a decimal string ("0.52") to integer micros (520000).
#[inline]
pub fn to_micros(value: &str) -> u64 {
    (value.parse::<f64>().unwrap_or(0.0) * 1_000_000.0).round() as u64
}

#[inline]
pub fn micros_to_f64(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Top-of-book view handed to the quote engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopOfBook {
    pub best_bid: Option<(f64, f64)>,
    pub best_ask: Option<(f64, f64)>,
}

impl TopOfBook {
    pub fn bid_price(&self) -> Option<f64> {
        self.best_bid.map(|(p, _)| p)
    }

    pub fn ask_price(&self) -> Option<f64> {
        self.best_ask.map(|(p, _)| p)
    }

    /// `best_ask - best_bid`; `None` unless both sides are present.
    pub fn spread(&self) -> Option<f64> {
        match (self.bid_price(), self.ask_price()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.bid_price(), self.ask_price()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

/// One side of a book: `(price_micros, size_micros)` levels, ascending
/// by price. The side itself is direction-agnostic; [`Book`] decides
/// which end of each side is the touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookSide {
    levels: Vec<(u64, u64)>,
}

impl BookSide {
    /// Replace the whole side from a snapshot. Zero-size levels are
    /// dropped on entry so they can never linger.
    pub fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels = levels
            .iter()
            .filter_map(|level| {
                let size = to_micros(&level.size);
                (size > 0).then(|| (to_micros(&level.price), size))
            })
            .collect();
        self.levels.sort_unstable_by_key(|&(price, _)| price);
    }

    /// Apply one delta. Size zero deletes the level.
    pub fn apply(&mut self, price: u64, size: u64) {
        match self.levels.binary_search_by_key(&price, |&(p, _)| p) {
            Ok(i) if size == 0 => {
                self.levels.remove(i);
            }
            Ok(i) => self.levels[i].1 = size,
            Err(i) if size > 0 => self.levels.insert(i, (price, size)),
            Err(_) => {}
        }
    }

    /// Highest-priced level: the touch when this side holds bids.
    #[inline]
    pub fn highest(&self) -> Option<(u64, u64)> {
        self.levels.last().copied()
    }

    /// Lowest-priced level: the touch when this side holds asks.
    #[inline]
    pub fn lowest(&self) -> Option<(u64, u64)> {
        self.levels.first().copied()
    }

    /// Number of populated price levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels in ascending price order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.levels.iter().copied()
    }
}

/// Complete book for one outcome token.
#[derive(Debug, Clone)]
pub struct Book {
    pub token_id: String,
    pub bids: BookSide,
    pub asks: BookSide,
}

impl Book {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BookSide::default(),
            asks: BookSide::default(),
        }
    }

    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.replace(bids);
        self.asks.replace(asks);
    }

    /// Apply one delta. `side` is the wire-format "BUY"/"SELL"; unknown
    /// sides are dropped (bad-event recovery, never a panic).
    pub fn apply_delta(&mut self, side: &str, price: &str, size: &str) {
        let price = to_micros(price);
        let size = to_micros(size);

        match side.to_ascii_uppercase().as_str() {
            "BUY" => self.bids.apply(price, size),
            "SELL" => self.asks.apply(price, size),
            other => {
                tracing::warn!("Dropping book delta with unknown side '{}'", other);
            }
        }
    }

    pub fn best_bid(&self) -> Option<(u64, u64)> {
        self.bids.highest()
    }

    pub fn best_ask(&self) -> Option<(u64, u64)> {
        self.asks.lowest()
    }

    /// Top of book in decimal units. Crossed books (bid >= ask) are passed
    /// through as-is; downstream gating treats them like any tight market.
    pub fn top(&self) -> TopOfBook {
        let decimal =
            |level: Option<(u64, u64)>| level.map(|(p, s)| (micros_to_f64(p), micros_to_f64(s)));
        TopOfBook {
            best_bid: decimal(self.best_bid()),
            best_ask: decimal(self.best_ask()),
        }
    }
}
