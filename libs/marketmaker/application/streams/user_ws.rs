//! Private user channel: our fills and order lifecycle events.
//!
//! Fills are booked eagerly and registered as pending intents so the
//! next pull cannot double count them. Order events keep the tracked
//! open-order view current between pulls. Every event ends with a
//! private-level trigger, which bypasses the book rate limit.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use streamkit::{spawn_stream, StreamConfig, StreamConsumer, StreamHandle};

use crate::application::reconcile::{TriggerBus, TriggerKind};
use crate::domain::position::Side;
use crate::infrastructure::account::SharedAccount;
use crate::infrastructure::config::ApiCredentials;
use crate::infrastructure::pending::PendingIntents;
use crate::infrastructure::sinks::{FillRecord, TradeLog};

use super::events::{parse_user_event, OrderEvent, TradeEvent, UserEvent, UserSubscription};

pub struct UserStreamConsumer {
    account: SharedAccount,
    pending: Arc<PendingIntents>,
    bus: TriggerBus,
    trade_log: Arc<dyn TradeLog>,
    credentials: ApiCredentials,
    pull_now: Arc<Notify>,
}

impl UserStreamConsumer {
    pub fn new(
        account: SharedAccount,
        pending: Arc<PendingIntents>,
        bus: TriggerBus,
        trade_log: Arc<dyn TradeLog>,
        credentials: ApiCredentials,
        pull_now: Arc<Notify>,
    ) -> Self {
        Self {
            account,
            pending,
            bus,
            trade_log,
            credentials,
            pull_now,
        }
    }

    fn handle_trade(&mut self, trade: &TradeEvent) {
        // Only MATCHED creates inventory; later status updates rework the
        // same trade id.
        if trade.status != "MATCHED" {
            debug!("[UserWS] Trade {} status {}", trade.id, trade.status);
            return;
        }

        let Some(taker_side) = Side::parse(&trade.side) else {
            warn!("[UserWS] Trade {} with unknown side {}", trade.id, trade.side);
            return;
        };

        // Classify which legs are ours via the tracked order ids.
        let mut fills: Vec<(String, Side, f64, f64)> = Vec::new();
        if let Some(taker_order_id) = &trade.taker_order_id {
            if self.account.lookup_order(taker_order_id).is_some() {
                let size = parse_decimal(&trade.size);
                let price = parse_decimal(&trade.price);
                fills.push((trade.asset_id.clone(), taker_side, size, price));
            }
        }
        for maker in &trade.maker_orders {
            if self.account.lookup_order(&maker.order_id).is_some() {
                fills.push((
                    maker.asset_id.clone(),
                    taker_side.opposite(),
                    parse_decimal(&maker.matched_amount),
                    parse_decimal(&maker.price),
                ));
            }
        }

        if fills.is_empty() {
            // Fill for an order we are not tracking (e.g. placed before a
            // restart): discard and let the next pull tell the truth.
            warn!(
                "[UserWS] Trade {} matched no tracked order, deferring to pull",
                trade.id
            );
            self.pull_now.notify_one();
            return;
        }

        if !self.pending.insert(&trade.id, &trade.asset_id) {
            debug!("[UserWS] Duplicate trade {}", trade.id);
            return;
        }

        for (token_id, side, size, price) in fills {
            if size <= 0.0 || price <= 0.0 {
                warn!("[UserWS] Trade {} carried bad numbers, skipping leg", trade.id);
                continue;
            }
            self.account.apply_fill(&token_id, side, size, price);
            self.trade_log.record_fill(&FillRecord {
                timestamp: Utc::now(),
                trade_id: trade.id.clone(),
                condition_id: trade.market.clone(),
                token_id: token_id.clone(),
                side,
                price,
                size,
            });
        }

        self.bus.fire(&trade.market, TriggerKind::Private);
    }

    fn handle_order(&mut self, order: &OrderEvent) {
        match order.msg_type.as_str() {
            "PLACEMENT" => {
                let Some(side) = Side::parse(&order.side) else {
                    warn!("[UserWS] Order {} with unknown side {}", order.id, order.side);
                    return;
                };
                self.account.apply_order_ack(
                    &order.asset_id,
                    side,
                    &order.id,
                    parse_decimal(&order.price),
                    parse_decimal(&order.original_size),
                );
            }
            "UPDATE" => {
                let remaining =
                    (parse_decimal(&order.original_size) - parse_decimal(&order.size_matched))
                        .max(0.0);
                if remaining > 0.0 {
                    self.account.apply_order_remaining(&order.id, remaining);
                } else {
                    self.account.apply_order_gone(&order.id);
                }
            }
            "CANCELLATION" => self.account.apply_order_gone(&order.id),
            other => debug!("[UserWS] Order {} with type {}", order.id, other),
        }

        self.bus.fire(&order.market, TriggerKind::Private);
    }
}

fn parse_decimal(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

impl StreamConsumer for UserStreamConsumer {
    fn subscription(&self) -> Option<String> {
        let sub = UserSubscription::new(
            self.credentials.api_key.clone(),
            self.credentials.secret.clone(),
            self.credentials.passphrase.clone(),
        );
        serde_json::to_string(&sub).ok()
    }

    fn ping_text(&self) -> Option<String> {
        Some("PING".to_string())
    }

    fn on_text(&mut self, text: &str) {
        match parse_user_event(text) {
            UserEvent::Trade(trade) => self.handle_trade(&trade),
            UserEvent::Order(order) => self.handle_order(&order),
            UserEvent::Pong => debug!("[UserWS] Pong"),
            UserEvent::Unknown(text) => debug!("[UserWS] Ignoring: {}", text),
        }
    }

    fn on_connected(&mut self, reconnect: bool) {
        if reconnect {
            warn!("[UserWS] Reconnected, forcing full pull");
            self.pull_now.notify_one();
        }
    }
}

pub fn spawn_user_stream(
    url: &str,
    account: SharedAccount,
    pending: Arc<PendingIntents>,
    bus: TriggerBus,
    trade_log: Arc<dyn TradeLog>,
    credentials: ApiCredentials,
    pull_now: Arc<Notify>,
) -> StreamHandle {
    let consumer =
        UserStreamConsumer::new(account, pending, bus, trade_log, credentials, pull_now);
    spawn_stream(StreamConfig::new("UserWS", url), consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::account::AccountState;
    use crate::infrastructure::sinks::NullSink;

    fn consumer() -> (UserStreamConsumer, SharedAccount, Arc<PendingIntents>, TriggerBus) {
        let account: SharedAccount = Arc::new(AccountState::new());
        let pending = Arc::new(PendingIntents::default());
        let bus = TriggerBus::new();
        let consumer = UserStreamConsumer::new(
            Arc::clone(&account),
            Arc::clone(&pending),
            bus.clone(),
            Arc::new(NullSink),
            ApiCredentials {
                api_key: "k".to_string(),
                secret: "s".to_string(),
                passphrase: "p".to_string(),
            },
            Arc::new(Notify::new()),
        );
        (consumer, account, pending, bus)
    }

    fn maker_trade(trade_id: &str) -> String {
        format!(
            r#"{{"event_type":"trade","asset_id":"tok-1","id":"{}","market":"cond-1",
                "maker_orders":[{{"asset_id":"tok-1","matched_amount":"15","order_id":"o-1","price":"0.50"}}],
                "price":"0.50","side":"SELL","size":"15","status":"MATCHED",
                "taker_order_id":"not-ours"}}"#,
            trade_id
        )
    }

    #[test]
    fn maker_fill_books_opposite_of_taker_side() {
        let (mut consumer, account, pending, bus) = consumer();
        // our resting bid
        account.apply_order_ack("tok-1", Side::Buy, "o-1", 0.50, 40.0);

        consumer.on_text(&maker_trade("t-1"));

        // taker sold into us, so our side is a buy
        let pos = account.position("tok-1");
        assert_eq!(pos.size, 15.0);
        assert_eq!(pos.avg_price(), Some(0.50));
        assert!(pending.has_token("tok-1"));
        assert_eq!(bus.cell("cond-1").pending(), Some(TriggerKind::Private));
    }

    #[test]
    fn duplicate_trade_id_books_once() {
        let (mut consumer, account, _, _) = consumer();
        account.apply_order_ack("tok-1", Side::Buy, "o-1", 0.50, 40.0);

        consumer.on_text(&maker_trade("t-1"));
        consumer.on_text(&maker_trade("t-1"));

        assert_eq!(account.position("tok-1").size, 15.0);
    }

    #[test]
    fn untracked_trade_is_discarded() {
        let (mut consumer, account, pending, _) = consumer();
        consumer.on_text(&maker_trade("t-1")); // no tracked orders at all
        assert!(account.position("tok-1").is_flat());
        assert!(pending.is_empty());
    }

    #[test]
    fn order_lifecycle_tracks_remaining_size() {
        let (mut consumer, account, _, _) = consumer();

        consumer.on_text(
            r#"{"event_type":"order","asset_id":"tok-1","id":"o-1","market":"cond-1",
                "price":"0.50","side":"BUY","original_size":"40","size_matched":"0",
                "type":"PLACEMENT"}"#,
        );
        assert_eq!(account.orders("tok-1").buy.as_ref().unwrap().size, 40.0);

        consumer.on_text(
            r#"{"event_type":"order","asset_id":"tok-1","id":"o-1","market":"cond-1",
                "price":"0.50","side":"BUY","original_size":"40","size_matched":"10",
                "type":"UPDATE"}"#,
        );
        assert_eq!(account.orders("tok-1").buy.as_ref().unwrap().size, 30.0);

        consumer.on_text(
            r#"{"event_type":"order","asset_id":"tok-1","id":"o-1","market":"cond-1",
                "price":"0.50","side":"BUY","original_size":"40","size_matched":"10",
                "type":"CANCELLATION"}"#,
        );
        assert!(account.orders("tok-1").buy.is_none());
    }
}
