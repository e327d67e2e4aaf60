//! Per-market reconciliation worker.
//!
//! One task per condition id is the serialization primitive: everything
//! touching a market's orders and position happens on its worker, so no
//! two reconciliations of the same market can overlap while distinct
//! markets run in parallel. Each cycle snapshots the stores, runs the
//! pure engines, then issues the minimum cancel/place sequence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::engine::{
    desired_quotes, evaluate_risk, side_action, Quote, QuoteInputs, RiskInputs, SideAction,
    SideThresholds,
};
use crate::domain::orderbook::TopOfBook;
use crate::domain::position::{Position, Side};
use crate::infrastructure::account::{SharedAccount, SideOrders};
use crate::infrastructure::books::SharedBooks;
use crate::infrastructure::config::EngineTuning;
use crate::infrastructure::exchange::{
    call_with_timeout, shares_to_microshares, ExchangeError, OrderRequest, SharedExchange,
};
use crate::infrastructure::registry::{MarketEntry, MarketRegistry};
use crate::infrastructure::risk_registry::{RiskOffReason, RiskOffRegistry};
use crate::infrastructure::volatility::VolatilitySource;

use super::trigger::{TriggerBus, TriggerCell, TriggerKind};

/// Shared handles a worker needs; cheap to clone per market.
#[derive(Clone)]
pub struct WorkerCtx {
    pub books: SharedBooks,
    pub account: SharedAccount,
    pub risk: Arc<RiskOffRegistry>,
    pub registry: Arc<MarketRegistry>,
    pub exchange: SharedExchange,
    pub volatility: Arc<dyn VolatilitySource>,
    pub tuning: EngineTuning,
    /// Asks the scheduler for an immediate authoritative pull.
    pub pull_now: Arc<Notify>,
    /// Bumped by the scheduler after each successful pull; lets workers
    /// know a timed-out side may act again.
    pub pull_epoch: Arc<AtomicU64>,
}

impl WorkerCtx {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.tuning.exchange_timeout_secs)
    }

    fn buy_thresholds(&self) -> SideThresholds {
        SideThresholds {
            price_tol: self.tuning.buy_replace_price_tol,
            size_frac: self.tuning.buy_replace_size_frac,
        }
    }

    fn sell_thresholds(&self) -> SideThresholds {
        SideThresholds {
            price_tol: self.tuning.sell_replace_price_tol,
            size_frac: self.tuning.sell_replace_size_frac,
        }
    }
}

pub struct MarketWorker {
    condition_id: String,
    ctx: WorkerCtx,
    cell: Arc<TriggerCell>,
    shutdown: watch::Receiver<bool>,
    last_action: Option<Instant>,
    /// Sides whose last exchange call timed out; untouched until the next
    /// authoritative pull lands.
    blocked: HashSet<(String, Side)>,
    /// Pull epoch at the time the sides were parked.
    blocked_at_epoch: u64,
    /// Cooldown after invoking the merge tool, so the same inventory is
    /// not merged twice before a pull reflects it.
    merge_backoff_until: Option<Instant>,
}

impl MarketWorker {
    pub fn new(
        condition_id: String,
        ctx: WorkerCtx,
        cell: Arc<TriggerCell>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            condition_id,
            ctx,
            cell,
            shutdown,
            last_action: None,
            blocked: HashSet::new(),
            blocked_at_epoch: 0,
            merge_backoff_until: None,
        }
    }

    fn park(&mut self, token: &str, side: Side) {
        self.blocked.insert((token.to_string(), side));
        self.blocked_at_epoch = self.ctx.pull_epoch.load(Ordering::Acquire);
    }

    pub async fn run(mut self) {
        debug!("[Reconciler:{}] Started", self.condition_id);

        loop {
            let kind = tokio::select! {
                kind = self.cell.wait() => kind,
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            if *self.shutdown.borrow() {
                break;
            }

            // Book ticks are rate-limited; fills and pulls are not.
            if !kind.bypasses_rate_limit() {
                if let Some(last) = self.last_action {
                    let min_gap =
                        Duration::from_secs(self.ctx.tuning.book_trigger_min_interval_secs);
                    if last.elapsed() < min_gap {
                        continue;
                    }
                }
            }

            match self.reconcile_once().await {
                Ok(true) => self.last_action = Some(Instant::now()),
                Ok(false) => {}
                Err(e) => warn!(
                    "[Reconciler:{}] Cycle failed: {} (retrying on next trigger)",
                    self.condition_id, e
                ),
            }
        }

        debug!("[Reconciler:{}] Stopped", self.condition_id);
    }

    /// One full cycle. Returns whether any exchange action was taken.
    pub async fn reconcile_once(&mut self) -> Result<bool, ExchangeError> {
        let Some(entry) = self.ctx.registry.entry(&self.condition_id) else {
            return Ok(false);
        };

        // Sides parked after a timeout may act again once a fresh
        // authoritative pull has landed.
        if !self.blocked.is_empty()
            && self.ctx.pull_epoch.load(Ordering::Acquire) > self.blocked_at_epoch
        {
            debug!(
                "[Reconciler:{}] Unblocking {} side(s) after pull",
                self.condition_id,
                self.blocked.len()
            );
            self.blocked.clear();
        }

        let now = Utc::now();
        if self.ctx.risk.is_paused(&self.condition_id, now) {
            debug!("[Reconciler:{}] Risk-off, sleeping", self.condition_id);
            return Ok(false);
        }
        if self.ctx.risk.get(&self.condition_id).is_some() {
            if let Err(e) = self.ctx.risk.clear(&self.condition_id) {
                warn!(
                    "[Reconciler:{}] Could not clear expired risk-off record: {}",
                    self.condition_id, e
                );
            } else {
                info!("[Reconciler:{}] Risk-off expired, resuming", self.condition_id);
            }
        }

        if !entry.trade.enabled {
            return self.retire_orders(&entry).await;
        }

        let volatility = self
            .ctx
            .volatility
            .volatility(&self.condition_id)
            .unwrap_or(0.0);

        // Risk pass first: a trip preempts quoting entirely.
        for token in entry.market.tokens() {
            let position = self.ctx.account.position(token);
            if position.is_flat() {
                continue;
            }
            let top = self.ctx.books.top(token).unwrap_or_default();
            let inputs = RiskInputs {
                position,
                top,
                volatility,
            };
            if let Some(reason) = evaluate_risk(&inputs, &entry.params) {
                self.trip_risk_off(&entry, token, position, top, reason, now)
                    .await?;
                return Ok(true);
            }
        }

        let mut acted = false;
        for token in entry.market.tokens() {
            acted |= self.reconcile_token(&entry, token, volatility).await?;
        }
        acted |= self.maybe_merge(&entry).await?;
        Ok(acted)
    }

    async fn reconcile_token(
        &mut self,
        entry: &MarketEntry,
        token: &str,
        volatility: f64,
    ) -> Result<bool, ExchangeError> {
        let reverse_token = match entry.market.reverse(token) {
            Some(t) => t,
            None => return Ok(false),
        };

        // Snapshot everything, then decide with no locks held.
        let top = self.ctx.books.top(token).unwrap_or_default();
        let position = self.ctx.account.position(token);
        let reverse_position = self.ctx.account.position(reverse_token);
        let orders = self.ctx.account.orders(token);

        let desired = desired_quotes(&QuoteInputs {
            top,
            position,
            reverse_position,
            market: &entry.market,
            params: &entry.params,
            trade: &entry.trade,
            tuning: &self.ctx.tuning,
            volatility,
            risk_off: false, // checked at cycle entry
        });

        let buy_blocked = self.is_blocked(token, Side::Buy);
        let sell_blocked = self.is_blocked(token, Side::Sell);

        let buy_action = if buy_blocked {
            SideAction::Keep
        } else {
            side_action(orders.buy.as_ref(), desired.buy.as_ref(), self.ctx.buy_thresholds())
        };
        let sell_action = if sell_blocked {
            SideAction::Keep
        } else {
            side_action(
                orders.sell.as_ref(),
                desired.sell.as_ref(),
                self.ctx.sell_thresholds(),
            )
        };

        // The venue only cancels token-wide, so a cancel is issued once,
        // and only when a side that needs it actually has a live order.
        let cancel_token = (buy_action.needs_cancel() && orders.buy.is_some())
            || (sell_action.needs_cancel() && orders.sell.is_some());

        let mut places: Vec<(Side, Quote)> = Vec::new();
        if cancel_token {
            // Cancelling wipes both sides; re-place everything desired.
            if let (Some(quote), false) = (desired.buy, buy_blocked) {
                places.push((Side::Buy, quote));
            }
            if let (Some(quote), false) = (desired.sell, sell_blocked) {
                places.push((Side::Sell, quote));
            }
        } else {
            if let SideAction::Place(quote) = buy_action {
                places.push((Side::Buy, quote));
            }
            if let SideAction::Place(quote) = sell_action {
                places.push((Side::Sell, quote));
            }
        }

        if !cancel_token && places.is_empty() {
            return Ok(false);
        }

        if cancel_token {
            self.cancel_token_orders(token, &orders).await?;
        }
        for (side, quote) in places {
            self.place(token, side, quote).await;
        }
        Ok(true)
    }

    fn is_blocked(&self, token: &str, side: Side) -> bool {
        self.blocked.contains(&(token.to_string(), side))
    }

    /// Token-wide cancel with optimistic store update. A timeout leaves
    /// the outcome unknown: both sides park until the next pull.
    async fn cancel_token_orders(
        &mut self,
        token: &str,
        orders: &SideOrders,
    ) -> Result<(), ExchangeError> {
        match call_with_timeout(
            self.ctx.timeout(),
            self.ctx.exchange.cancel_all_for_token(token),
        )
        .await
        {
            Ok(()) => {
                for order in [&orders.buy, &orders.sell].into_iter().flatten() {
                    self.ctx.account.apply_order_gone(&order.order_id);
                }
                Ok(())
            }
            Err(ExchangeError::Timeout) => {
                warn!(
                    "[Reconciler:{}] Cancel timed out for {}, parking both sides",
                    self.condition_id, token
                );
                self.park(token, Side::Buy);
                self.park(token, Side::Sell);
                self.ctx.pull_now.notify_one();
                Err(ExchangeError::Timeout)
            }
            Err(e) => {
                self.ctx.pull_now.notify_one();
                Err(e)
            }
        }
    }

    /// Place one order. The tracked order is only installed on an ack, so
    /// a failed place has nothing to revert; the private stream supplies
    /// the authoritative view either way.
    async fn place(&mut self, token: &str, side: Side, quote: Quote) -> bool {
        let request = OrderRequest::new(token, side, quote.price, quote.size);
        match call_with_timeout(self.ctx.timeout(), self.ctx.exchange.create_order(&request)).await
        {
            Ok(ack) => {
                debug!(
                    "[Reconciler:{}] Placed {} {} {:.4} x {:.2}",
                    self.condition_id,
                    side.as_str(),
                    token,
                    quote.price,
                    quote.size
                );
                self.ctx
                    .account
                    .apply_order_ack(token, side, &ack.order_id, quote.price, quote.size);
                true
            }
            Err(ExchangeError::Timeout) => {
                warn!(
                    "[Reconciler:{}] Place timed out for {} {}, parking side",
                    self.condition_id,
                    side.as_str(),
                    token
                );
                self.park(token, side);
                self.ctx.pull_now.notify_one();
                false
            }
            Err(e) => {
                warn!(
                    "[Reconciler:{}] Place rejected for {} {}: {}",
                    self.condition_id,
                    side.as_str(),
                    token,
                    e
                );
                self.ctx.pull_now.notify_one();
                false
            }
        }
    }

    /// Risk trip: pull all quotes on the market, fire a single
    /// liquidation sell at best bid, and persist the pause.
    async fn trip_risk_off(
        &mut self,
        entry: &MarketEntry,
        token: &str,
        position: Position,
        top: TopOfBook,
        reason: RiskOffReason,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        warn!(
            "[Reconciler:{}] Risk-off trip ({}) on {}",
            self.condition_id, reason, token
        );

        for t in entry.market.tokens() {
            let orders = self.ctx.account.orders(t);
            if !orders.is_empty() {
                self.cancel_token_orders(t, &orders).await?;
            }
        }

        match top.bid_price() {
            Some(bid) if !position.is_flat() => {
                let quote = Quote {
                    price: bid,
                    size: position.size,
                };
                self.place(token, Side::Sell, quote).await;
            }
            _ => warn!(
                "[Reconciler:{}] No bid to liquidate {} into",
                self.condition_id, token
            ),
        }

        let sleep_secs = (entry.params.sleep_period_hours * 3600.0) as i64;
        let sleep_until = now + chrono::Duration::seconds(sleep_secs);
        if let Err(e) = self.ctx.risk.trip(&self.condition_id, reason, sleep_until) {
            warn!(
                "[Reconciler:{}] Failed to persist risk-off record: {}",
                self.condition_id, e
            );
        }
        Ok(())
    }

    /// Invoke the complementary-merge tool when both legs hold enough.
    async fn maybe_merge(&mut self, entry: &MarketEntry) -> Result<bool, ExchangeError> {
        let pos_a = self.ctx.account.position(&entry.market.token_a);
        let pos_b = self.ctx.account.position(&entry.market.token_b);
        let pairs = pos_a.size.min(pos_b.size);
        if pairs < self.ctx.tuning.merge_min_shares {
            return Ok(false);
        }
        if let Some(until) = self.merge_backoff_until {
            if Instant::now() < until {
                return Ok(false);
            }
        }

        info!(
            "[Reconciler:{}] Merging {:.2} complementary pairs",
            self.condition_id, pairs
        );
        let result = call_with_timeout(
            self.ctx.timeout(),
            self.ctx.exchange.merge_complementary(
                &self.condition_id,
                shares_to_microshares(pairs),
                entry.market.neg_risk,
            ),
        )
        .await;

        // Either way, wait for a pull to reflect the outcome before
        // considering another merge.
        self.merge_backoff_until = Some(Instant::now() + Duration::from_secs(60));
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("[Reconciler:{}] Merge failed: {}", self.condition_id, e);
                self.ctx.pull_now.notify_one();
                Ok(false)
            }
        }
    }

    /// Disabled market: clear anything still resting.
    async fn retire_orders(&mut self, entry: &MarketEntry) -> Result<bool, ExchangeError> {
        let mut acted = false;
        for token in entry.market.tokens() {
            let orders = self.ctx.account.orders(token);
            if !orders.is_empty() {
                self.cancel_token_orders(token, &orders).await?;
                acted = true;
            }
        }
        Ok(acted)
    }
}

// =============================================================================
// WorkerSet
// =============================================================================

/// Spawns and retires market workers as the registry changes.
pub struct WorkerSet {
    ctx: WorkerCtx,
    bus: TriggerBus,
    shutdown: watch::Receiver<bool>,
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl WorkerSet {
    pub fn new(ctx: WorkerCtx, bus: TriggerBus, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ctx,
            bus,
            shutdown,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Bring the worker set in line with the enabled markets. New workers
    /// get an immediate periodic trigger so they quote without waiting
    /// for the next pull.
    pub fn sync(&self, condition_ids: &[String]) {
        let wanted: HashSet<&String> = condition_ids.iter().collect();
        let mut workers = self.workers.lock();

        workers.retain(|condition_id, handle| {
            if wanted.contains(condition_id) {
                true
            } else {
                info!("[Workers] Retiring worker for {}", condition_id);
                handle.abort();
                self.bus.remove(condition_id);
                false
            }
        });

        for condition_id in condition_ids {
            if workers.contains_key(condition_id) {
                continue;
            }
            info!("[Workers] Spawning worker for {}", condition_id);
            let worker = MarketWorker::new(
                condition_id.clone(),
                self.ctx.clone(),
                self.bus.cell(condition_id),
                self.shutdown.clone(),
            );
            workers.insert(condition_id.clone(), tokio::spawn(worker.run()));
            self.bus.fire(condition_id, TriggerKind::Periodic);
        }
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Wait for workers to observe shutdown and finish their cycles.
    pub async fn join_all(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = self.workers.lock().drain().collect();
        for (condition_id, handle) in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("[Workers] Worker for {} ended abnormally: {}", condition_id, e);
                }
            }
        }
    }
}
