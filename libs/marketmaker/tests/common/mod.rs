//! Shared fixtures: a scripted mock exchange and universe builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use marketmaker::domain::market::{
    Market, StrategyParameters, StrategyProfile, TradeConfig,
};
use marketmaker::domain::position::Side;
use marketmaker::infrastructure::exchange::{
    ExchangeClient, ExchangeError, OpenOrderRecord, OrderAck, OrderRequest, PositionRecord,
};
use marketmaker::infrastructure::registry::{MarketRow, MarketUniverse};

/// Exchange call log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create {
        token_id: String,
        side: Side,
        price: f64,
        size: f64,
    },
    CancelToken(String),
    Merge {
        condition_id: String,
        amount_microshares: u64,
    },
}

/// Records every mutating call; pull endpoints serve scripted data.
#[derive(Default)]
pub struct MockExchange {
    pub calls: Mutex<Vec<Call>>,
    pub open_orders: Mutex<Vec<OpenOrderRecord>>,
    pub positions: Mutex<Vec<PositionRecord>>,
    /// When set, `create_order` never resolves (timeout simulation).
    pub hang_creates: std::sync::atomic::AtomicBool,
    next_id: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn creates(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn create_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        if self.hang_creates.load(Ordering::Acquire) {
            tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
            return Err(ExchangeError::Transport("hung".to_string()));
        }
        self.calls.lock().push(Call::Create {
            token_id: request.token_id.clone(),
            side: request.side,
            price: request.price,
            size: request.size,
        });
        Ok(OrderAck {
            order_id: format!("mock-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
        })
    }

    async fn cancel_all_for_token(&self, token_id: &str) -> Result<(), ExchangeError> {
        self.calls.lock().push(Call::CancelToken(token_id.to_string()));
        Ok(())
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrderRecord>, ExchangeError> {
        Ok(self.open_orders.lock().clone())
    }

    async fn list_positions(&self) -> Result<Vec<PositionRecord>, ExchangeError> {
        Ok(self.positions.lock().clone())
    }

    async fn stablecoin_balance(&self) -> Result<f64, ExchangeError> {
        Ok(1000.0)
    }

    async fn merge_complementary(
        &self,
        condition_id: &str,
        amount_microshares: u64,
        _neg_risk: bool,
    ) -> Result<(), ExchangeError> {
        self.calls.lock().push(Call::Merge {
            condition_id: condition_id.to_string(),
            amount_microshares,
        });
        Ok(())
    }
}

pub fn default_parameters() -> StrategyParameters {
    StrategyParameters {
        stop_loss_threshold: -15.0,
        take_profit_threshold: 10.0,
        volatility_threshold: 20.0,
        spread_threshold: 0.05,
        sleep_period_hours: 4.0,
    }
}

pub fn test_market() -> Market {
    Market {
        condition_id: "cond-1".to_string(),
        token_a: "tok-a".to_string(),
        token_b: "tok-b".to_string(),
        neg_risk: false,
        tick_size: 0.01,
        min_size: 5.0,
        max_spread: 0.10,
        strategy_profile: None,
    }
}

pub fn test_universe() -> MarketUniverse {
    MarketUniverse {
        default_profile: StrategyProfile::Default,
        profiles: HashMap::from([(StrategyProfile::Default, default_parameters())]),
        markets: vec![MarketRow {
            market: test_market(),
            trade: TradeConfig {
                trade_size: 20.0,
                max_size: 60.0,
                enabled: true,
            },
        }],
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
