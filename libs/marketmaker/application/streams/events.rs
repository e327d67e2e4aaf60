//! Wire-format messages for both websocket channels.
//!
//! Prices and sizes arrive as strings and stay strings here; conversion
//! happens where the numbers are used.

use serde::{Deserialize, Serialize};

use crate::domain::orderbook::PriceLevel;

// =============================================================================
// Market channel
// =============================================================================

/// Subscription payload for the market channel.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSubscription {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub channel: String,
}

impl MarketSubscription {
    pub fn new(assets_ids: Vec<String>) -> Self {
        Self {
            assets_ids,
            channel: "market".to_string(),
        }
    }
}

/// Full book snapshot for one token.
#[derive(Debug, Clone, Deserialize)]
pub struct BookEvent {
    pub event_type: String,
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// Level deltas, possibly for several tokens at once.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeEvent {
    pub event_type: String,
    #[serde(default)]
    pub market: String,
    #[serde(default, rename = "price_changes")]
    pub changes: Vec<PriceChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub asset_id: String,
    pub price: String,
    pub size: String,
    pub side: String,
}

#[derive(Debug, Clone)]
pub enum MarketEvent {
    Books(Vec<BookEvent>),
    PriceChange(PriceChangeEvent),
    Pong,
    Unknown(String),
}

/// Parse one market-channel frame. The initial subscription response is
/// an array of book snapshots; later snapshots arrive singly.
pub fn parse_market_event(text: &str) -> MarketEvent {
    if text == "PONG" {
        return MarketEvent::Pong;
    }

    if let Ok(events) = serde_json::from_str::<Vec<BookEvent>>(text) {
        if events.first().map(|e| e.event_type.as_str()) == Some("book") {
            return MarketEvent::Books(events);
        }
    }

    if let Ok(event) = serde_json::from_str::<BookEvent>(text) {
        if event.event_type == "book" {
            return MarketEvent::Books(vec![event]);
        }
    }

    if let Ok(event) = serde_json::from_str::<PriceChangeEvent>(text) {
        if event.event_type == "price_change" {
            return MarketEvent::PriceChange(event);
        }
    }

    MarketEvent::Unknown(text.to_string())
}

// =============================================================================
// User channel
// =============================================================================

/// Authenticated subscription payload for the user channel.
#[derive(Debug, Clone, Serialize)]
pub struct UserSubscription {
    #[serde(rename = "type")]
    pub channel: String,
    pub auth: AuthPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthPayload {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl UserSubscription {
    pub fn new(api_key: String, secret: String, passphrase: String) -> Self {
        Self {
            channel: "user".to_string(),
            auth: AuthPayload {
                api_key,
                secret,
                passphrase,
            },
        }
    }
}

/// Trade event: one of our orders participated in a match.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    pub event_type: String,
    pub asset_id: String,
    /// Exchange-assigned trade id.
    pub id: String,
    /// Condition id of the market.
    pub market: String,
    #[serde(default)]
    pub maker_orders: Vec<MakerFill>,
    pub price: String,
    /// Taker side of the trade.
    pub side: String,
    pub size: String,
    /// MATCHED on first sight, then MINED / CONFIRMED / FAILED updates.
    pub status: String,
    #[serde(default)]
    pub taker_order_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MakerFill {
    pub asset_id: String,
    pub matched_amount: String,
    pub order_id: String,
    pub price: String,
}

/// Order lifecycle event: PLACEMENT, UPDATE, or CANCELLATION.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    pub event_type: String,
    pub asset_id: String,
    pub id: String,
    pub market: String,
    pub price: String,
    pub side: String,
    pub original_size: String,
    #[serde(default)]
    pub size_matched: String,
    #[serde(rename = "type")]
    pub msg_type: String,
}

#[derive(Debug, Clone)]
pub enum UserEvent {
    Trade(Box<TradeEvent>),
    Order(Box<OrderEvent>),
    Pong,
    Unknown(String),
}

pub fn parse_user_event(text: &str) -> UserEvent {
    if text == "PONG" {
        return UserEvent::Pong;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        match value.get("event_type").and_then(|v| v.as_str()) {
            Some("trade") => {
                if let Ok(event) = serde_json::from_value::<TradeEvent>(value) {
                    return UserEvent::Trade(Box::new(event));
                }
            }
            Some("order") => {
                if let Ok(event) = serde_json::from_value::<OrderEvent>(value) {
                    return UserEvent::Order(Box::new(event));
                }
            }
            _ => {}
        }
    }

    UserEvent::Unknown(text.to_string())
}
