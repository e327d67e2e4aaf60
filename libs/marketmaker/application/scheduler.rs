//! Periodic control loop.
//!
//! One task, three cadences: authoritative position/order pulls (fast),
//! market-registry reloads (slow), and reward/position snapshots
//! (slower). Streams and workers can also demand an immediate pull or
//! reload through the shared notifies.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use streamkit::StreamHandle;

use crate::application::reconcile::{TriggerBus, TriggerKind, WorkerSet};
use crate::application::streams::market_ws::SharedTokenSet;
use crate::domain::position::Side;
use crate::infrastructure::account::SharedAccount;
use crate::infrastructure::books::SharedBooks;
use crate::infrastructure::config::{CadenceConfig, EngineTuning};
use crate::infrastructure::exchange::{call_with_timeout, SharedExchange};
use crate::infrastructure::pending::PendingIntents;
use crate::infrastructure::registry::{MarketRegistry, MarketSource};
use crate::infrastructure::sinks::{PositionSnapshotRecord, RewardSnapshotRecord, SnapshotSink};

/// Shared handles the scheduler drives.
pub struct SchedulerCtx {
    pub exchange: SharedExchange,
    pub account: SharedAccount,
    pub pending: Arc<PendingIntents>,
    pub registry: Arc<MarketRegistry>,
    pub source: Arc<dyn MarketSource>,
    pub books: SharedBooks,
    pub bus: TriggerBus,
    pub workers: Arc<WorkerSet>,
    pub snapshots: Arc<dyn SnapshotSink>,
    pub tokens: SharedTokenSet,
    pub market_stream: Arc<StreamHandle>,
    pub tuning: EngineTuning,
    pub cadence: CadenceConfig,
    pub pull_epoch: Arc<AtomicU64>,
}

pub struct Scheduler {
    ctx: SchedulerCtx,
    pull_now: Arc<Notify>,
    reload_now: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        ctx: SchedulerCtx,
        pull_now: Arc<Notify>,
        reload_now: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            pull_now,
            reload_now,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            "[Scheduler] Started (pull {}s, registry {}s, snapshot {}s)",
            self.ctx.cadence.pull_secs, self.ctx.cadence.registry_secs, self.ctx.cadence.snapshot_secs
        );

        let mut pull_tick = tokio::time::interval(Duration::from_secs(self.ctx.cadence.pull_secs));
        let mut registry_tick =
            tokio::time::interval(Duration::from_secs(self.ctx.cadence.registry_secs));
        let mut snapshot_tick =
            tokio::time::interval(Duration::from_secs(self.ctx.cadence.snapshot_secs));
        for tick in [&mut pull_tick, &mut registry_tick, &mut snapshot_tick] {
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        }

        loop {
            tokio::select! {
                _ = pull_tick.tick() => self.pull().await,
                _ = registry_tick.tick() => self.reload().await,
                _ = snapshot_tick.tick() => self.snapshot(),
                _ = self.pull_now.notified() => self.pull().await,
                _ = self.reload_now.notified() => self.reload().await,
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[Scheduler] Stopped");
    }

    /// Authoritative pull: replace the account view, sweep expired
    /// pending intents, and trigger markets that materially changed.
    async fn pull(&self) {
        let timeout = Duration::from_secs(self.ctx.tuning.exchange_timeout_secs);

        let orders = match call_with_timeout(timeout, self.ctx.exchange.list_open_orders()).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("[Scheduler] Order pull failed: {}", e);
                return;
            }
        };
        let positions = match call_with_timeout(timeout, self.ctx.exchange.list_positions()).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!("[Scheduler] Position pull failed: {}", e);
                return;
            }
        };

        let changed_tokens = self
            .ctx
            .account
            .merge_authoritative(positions, orders, &self.ctx.pending);
        self.ctx.pending.sweep();
        self.ctx.pull_epoch.fetch_add(1, Ordering::AcqRel);

        let conditions: HashSet<String> = changed_tokens
            .iter()
            .filter_map(|token| self.ctx.registry.condition_for_token(token))
            .collect();
        for condition_id in &conditions {
            self.ctx.bus.fire(condition_id, TriggerKind::Periodic);
        }
        if !conditions.is_empty() {
            debug!("[Scheduler] Pull changed {} market(s)", conditions.len());
        }
    }

    /// Slow-cadence reload of the market universe.
    async fn reload(&self) {
        let universe = match self.ctx.source.load().await {
            Ok(universe) => universe,
            Err(e) => {
                warn!("[Scheduler] Registry reload failed: {}", e);
                return;
            }
        };

        let diff = self.ctx.registry.refresh(universe);

        let enabled: Vec<String> = self
            .ctx
            .registry
            .enabled_markets()
            .into_iter()
            .map(|entry| entry.market.condition_id)
            .collect();
        self.ctx.workers.sync(&enabled);

        if !diff.added_tokens.is_empty() || !diff.removed_tokens.is_empty() {
            info!(
                "[Scheduler] Subscription set changed (+{} -{})",
                diff.added_tokens.len(),
                diff.removed_tokens.len()
            );
            let tokens = self.ctx.registry.subscription_tokens();
            let keep: HashSet<String> = tokens.iter().cloned().collect();
            *self.ctx.tokens.write() = tokens;
            self.ctx.books.retain_tokens(&keep);
            self.ctx.market_stream.resubscribe();
        }

        for condition_id in &diff.changed_markets {
            self.ctx.bus.fire(condition_id, TriggerKind::Periodic);
        }

        let timeout = Duration::from_secs(self.ctx.tuning.exchange_timeout_secs);
        match call_with_timeout(timeout, self.ctx.exchange.stablecoin_balance()).await {
            Ok(balance) => info!("[Scheduler] Stablecoin balance: {:.2}", balance),
            Err(e) => debug!("[Scheduler] Balance check failed: {}", e),
        }
    }

    /// Snapshot open orders and positions to the sink.
    fn snapshot(&self) {
        let now = Utc::now();
        let mut rewards = Vec::new();
        let mut positions = Vec::new();

        for entry in self.ctx.registry.enabled_markets() {
            for token in entry.market.tokens() {
                let orders = self.ctx.account.orders(token);
                for (side, order) in [(Side::Buy, orders.buy), (Side::Sell, orders.sell)] {
                    if let Some(order) = order {
                        rewards.push(RewardSnapshotRecord {
                            timestamp: now,
                            condition_id: entry.market.condition_id.clone(),
                            token_id: token.to_string(),
                            side,
                            order_id: order.order_id,
                            price: order.price,
                            size: order.size,
                        });
                    }
                }

                let position = self.ctx.account.position(token);
                if let Some(avg_price) = position.avg_price() {
                    positions.push(PositionSnapshotRecord {
                        timestamp: now,
                        token_id: token.to_string(),
                        size: position.size,
                        avg_price,
                    });
                }
            }
        }

        debug!(
            "[Scheduler] Snapshot: {} orders, {} positions",
            rewards.len(),
            positions.len()
        );
        self.ctx.snapshots.record_rewards(&rewards);
        self.ctx.snapshots.record_positions(&positions);
    }
}
