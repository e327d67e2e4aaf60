//! Public market channel: book snapshots and level deltas.
//!
//! Single writer for the book store. Every event ends with a book-level
//! reconciliation trigger for the owning market; a reconnect forces a
//! full pull because deltas may have been missed.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, warn};

use streamkit::{spawn_stream, StreamConfig, StreamConsumer, StreamHandle};

use crate::application::reconcile::{TriggerBus, TriggerKind};
use crate::infrastructure::books::SharedBooks;
use crate::infrastructure::registry::MarketRegistry;

use super::events::{parse_market_event, MarketEvent, MarketSubscription};

/// Shared, mutable subscription set; the registry refresh updates it and
/// asks the stream handle to resubscribe.
pub type SharedTokenSet = Arc<RwLock<Vec<String>>>;

pub struct MarketStreamConsumer {
    books: SharedBooks,
    registry: Arc<MarketRegistry>,
    bus: TriggerBus,
    tokens: SharedTokenSet,
    pull_now: Arc<Notify>,
}

impl MarketStreamConsumer {
    pub fn new(
        books: SharedBooks,
        registry: Arc<MarketRegistry>,
        bus: TriggerBus,
        tokens: SharedTokenSet,
        pull_now: Arc<Notify>,
    ) -> Self {
        Self {
            books,
            registry,
            bus,
            tokens,
            pull_now,
        }
    }

    fn trigger_for_token(&self, token_id: &str) {
        match self.registry.condition_for_token(token_id) {
            Some(condition_id) => self.bus.fire(&condition_id, TriggerKind::Book),
            None => debug!("[MarketWS] Event for unmapped token {}", token_id),
        }
    }
}

impl StreamConsumer for MarketStreamConsumer {
    fn subscription(&self) -> Option<String> {
        let tokens = self.tokens.read().clone();
        if tokens.is_empty() {
            return None;
        }
        serde_json::to_string(&MarketSubscription::new(tokens)).ok()
    }

    fn ping_text(&self) -> Option<String> {
        Some("PING".to_string())
    }

    fn on_text(&mut self, text: &str) {
        match parse_market_event(text) {
            MarketEvent::Books(events) => {
                for event in &events {
                    self.books
                        .apply_snapshot(&event.asset_id, &event.bids, &event.asks);
                    self.trigger_for_token(&event.asset_id);
                }
            }
            MarketEvent::PriceChange(event) => {
                for change in &event.changes {
                    self.books.apply_delta(
                        &change.asset_id,
                        &change.side,
                        &change.price,
                        &change.size,
                    );
                    self.trigger_for_token(&change.asset_id);
                }
            }
            MarketEvent::Pong => debug!("[MarketWS] Pong"),
            MarketEvent::Unknown(text) => debug!("[MarketWS] Ignoring: {}", text),
        }
    }

    fn on_connected(&mut self, reconnect: bool) {
        if reconnect {
            // Deltas may have been lost while down; refresh everything.
            warn!("[MarketWS] Reconnected, forcing full pull");
            self.pull_now.notify_one();
        }
    }
}

pub fn spawn_market_stream(
    url: &str,
    books: SharedBooks,
    registry: Arc<MarketRegistry>,
    bus: TriggerBus,
    tokens: SharedTokenSet,
    pull_now: Arc<Notify>,
) -> StreamHandle {
    let consumer = MarketStreamConsumer::new(books, registry, bus, tokens, pull_now);
    spawn_stream(StreamConfig::new("MarketWS", url), consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Market, StrategyParameters, StrategyProfile, TradeConfig};
    use crate::infrastructure::books::BookStore;
    use crate::infrastructure::registry::{MarketRow, MarketUniverse};
    use std::collections::HashMap;

    fn registry_with_market() -> Arc<MarketRegistry> {
        let registry = MarketRegistry::new();
        registry.refresh(MarketUniverse {
            default_profile: StrategyProfile::Default,
            profiles: HashMap::from([(
                StrategyProfile::Default,
                StrategyParameters {
                    stop_loss_threshold: -15.0,
                    take_profit_threshold: 10.0,
                    volatility_threshold: 20.0,
                    spread_threshold: 0.05,
                    sleep_period_hours: 4.0,
                },
            )]),
            markets: vec![MarketRow {
                market: Market {
                    condition_id: "cond-1".to_string(),
                    token_a: "tok-1".to_string(),
                    token_b: "tok-2".to_string(),
                    neg_risk: false,
                    tick_size: 0.01,
                    min_size: 5.0,
                    max_spread: 0.10,
                    strategy_profile: None,
                },
                trade: TradeConfig {
                    trade_size: 20.0,
                    max_size: 60.0,
                    enabled: true,
                },
            }],
        });
        Arc::new(registry)
    }

    fn consumer() -> (MarketStreamConsumer, SharedBooks, TriggerBus) {
        let books: SharedBooks = Arc::new(BookStore::new());
        let bus = TriggerBus::new();
        let consumer = MarketStreamConsumer::new(
            Arc::clone(&books),
            registry_with_market(),
            bus.clone(),
            Arc::new(RwLock::new(vec!["tok-1".to_string(), "tok-2".to_string()])),
            Arc::new(Notify::new()),
        );
        (consumer, books, bus)
    }

    #[test]
    fn snapshot_populates_book_and_fires_trigger() {
        let (mut consumer, books, bus) = consumer();
        consumer.on_text(
            r#"[{"event_type":"book","asset_id":"tok-1","market":"cond-1",
                "bids":[{"price":"0.50","size":"100"}],
                "asks":[{"price":"0.52","size":"100"}]}]"#,
        );

        assert_eq!(books.top("tok-1").unwrap().bid_price(), Some(0.50));
        assert_eq!(bus.cell("cond-1").pending(), Some(TriggerKind::Book));
    }

    #[test]
    fn delta_updates_book() {
        let (mut consumer, books, _) = consumer();
        consumer.on_text(
            r#"[{"event_type":"book","asset_id":"tok-1","market":"cond-1",
                "bids":[{"price":"0.50","size":"100"}],"asks":[]}]"#,
        );
        consumer.on_text(
            r#"{"event_type":"price_change","market":"cond-1","price_changes":
                [{"asset_id":"tok-1","price":"0.51","size":"30","side":"BUY"}]}"#,
        );

        assert_eq!(books.top("tok-1").unwrap().bid_price(), Some(0.51));
    }

    #[test]
    fn subscription_covers_current_tokens() {
        let (consumer, _, _) = consumer();
        let payload = consumer.subscription().unwrap();
        assert!(payload.contains("tok-1"));
        assert!(payload.contains("tok-2"));
        assert!(payload.contains("\"type\":\"market\""));
    }
}
