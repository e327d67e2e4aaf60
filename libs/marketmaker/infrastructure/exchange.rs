//! Exchange client interface.
//!
//! The core never formats HTTP or signs anything; a live client
//! implementing this trait is wired in from outside. Every call site
//! wraps the future in [`call_with_timeout`] so a stuck transport cannot
//! wedge a market's reconciliation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::domain::position::Side;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("exchange rejected request: {0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ExchangeError {
    /// Transport-class failures are retried by backoff at the call site;
    /// semantic rejections are not.
    pub fn is_transport(&self) -> bool {
        matches!(self, ExchangeError::Timeout | ExchangeError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub post_only: bool,
}

impl OrderRequest {
    pub fn new(token_id: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Self {
            token_id: token_id.into(),
            side,
            price,
            size,
            post_only: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
}

/// Open order as reported by an authoritative pull.
#[derive(Debug, Clone)]
pub struct OpenOrderRecord {
    pub order_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Position as reported by an authoritative pull.
#[derive(Debug, Clone)]
pub struct PositionRecord {
    pub token_id: String,
    pub size: f64,
    pub avg_price: f64,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Place a resting limit order; returns the exchange-assigned id.
    async fn create_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// Cancel every open order on a token. The venue offers no per-side
    /// cancel, which is why reconciliation batches per-side decisions.
    async fn cancel_all_for_token(&self, token_id: &str) -> Result<(), ExchangeError>;

    async fn list_open_orders(&self) -> Result<Vec<OpenOrderRecord>, ExchangeError>;

    async fn list_positions(&self) -> Result<Vec<PositionRecord>, ExchangeError>;

    async fn stablecoin_balance(&self) -> Result<f64, ExchangeError>;

    /// Merge `amount_microshares` of both outcome tokens back into
    /// stablecoin (external settlement tool).
    async fn merge_complementary(
        &self,
        condition_id: &str,
        amount_microshares: u64,
        neg_risk: bool,
    ) -> Result<(), ExchangeError>;
}

pub type SharedExchange = std::sync::Arc<dyn ExchangeClient>;

/// Bound an exchange future; elapsed deadlines surface as
/// [`ExchangeError::Timeout`].
pub async fn call_with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, ExchangeError>>,
) -> Result<T, ExchangeError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Timeout),
    }
}

/// Shares → exchange microshares (1e6 units).
pub fn shares_to_microshares(shares: f64) -> u64 {
    (shares * 1_000_000.0).round() as u64
}

// =============================================================================
// Dry-run client
// =============================================================================

/// Acknowledges orders with generated ids and logs every intent. Used by
/// the binary when no live client is wired in. It does not simulate
/// matching; it only exercises the full order lifecycle plumbing.
#[derive(Default)]
pub struct DryRunExchange {
    next_id: AtomicU64,
}

impl DryRunExchange {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeClient for DryRunExchange {
    async fn create_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let order_id = format!("dry-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            "[DryRun] {} {} {:.4} x {:.2} -> {}",
            request.side.as_str(),
            request.token_id,
            request.price,
            request.size,
            order_id
        );
        Ok(OrderAck { order_id })
    }

    async fn cancel_all_for_token(&self, token_id: &str) -> Result<(), ExchangeError> {
        info!("[DryRun] cancel all for {}", token_id);
        Ok(())
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrderRecord>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn list_positions(&self) -> Result<Vec<PositionRecord>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn stablecoin_balance(&self) -> Result<f64, ExchangeError> {
        Ok(0.0)
    }

    async fn merge_complementary(
        &self,
        condition_id: &str,
        amount_microshares: u64,
        neg_risk: bool,
    ) -> Result<(), ExchangeError> {
        info!(
            "[DryRun] merge {} microshares on {} (neg_risk={})",
            amount_microshares, condition_id, neg_risk
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_assigns_distinct_ids() {
        let ex = DryRunExchange::new();
        let req = OrderRequest::new("tok", Side::Buy, 0.50, 40.0);
        let a = ex.create_order(&req).await.unwrap();
        let b = ex.create_order(&req).await.unwrap();
        assert_ne!(a.order_id, b.order_id);
    }

    #[tokio::test]
    async fn timeout_maps_to_exchange_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), ExchangeError>(())
        };
        let result = call_with_timeout(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(ExchangeError::Timeout)));
    }

    #[test]
    fn microshare_conversion_rounds() {
        assert_eq!(shares_to_microshares(20.0), 20_000_000);
        assert_eq!(shares_to_microshares(0.5), 500_000);
    }
}
