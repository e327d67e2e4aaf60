//! Wiring: builds the shared state, spawns streams, workers, and the
//! scheduler, and supervises graceful shutdown.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::info;

use crate::application::reconcile::{TriggerBus, WorkerCtx, WorkerSet};
use crate::application::scheduler::{Scheduler, SchedulerCtx};
use crate::application::streams::market_ws::{spawn_market_stream, SharedTokenSet};
use crate::application::streams::user_ws::spawn_user_stream;
use crate::infrastructure::account::AccountState;
use crate::infrastructure::books::BookStore;
use crate::infrastructure::config::{ApiCredentials, AppConfig, ConfigError};
use crate::infrastructure::exchange::{DryRunExchange, SharedExchange};
use crate::infrastructure::pending::PendingIntents;
use crate::infrastructure::registry::{
    FileMarketSource, MarketRegistry, MarketSource, RegistryError,
};
use crate::infrastructure::risk_registry::RiskOffRegistry;
use crate::infrastructure::sinks::{JsonlSink, SnapshotSink, TradeLog};
use crate::infrastructure::volatility::{VolatilitySource, VolatilityTable};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder collecting the external collaborators. Anything not provided
/// gets the default wiring: file-based market source, JSONL sinks, an
/// empty volatility table, and the dry-run exchange.
pub struct TradingCoreBuilder {
    config: AppConfig,
    exchange: Option<SharedExchange>,
    source: Option<Arc<dyn MarketSource>>,
    volatility: Option<Arc<dyn VolatilitySource>>,
    trade_log: Option<Arc<dyn TradeLog>>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
    credentials: Option<ApiCredentials>,
}

impl TradingCoreBuilder {
    pub fn exchange(mut self, exchange: SharedExchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn market_source(mut self, source: Arc<dyn MarketSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn volatility(mut self, volatility: Arc<dyn VolatilitySource>) -> Self {
        self.volatility = Some(volatility);
        self
    }

    pub fn trade_log(mut self, trade_log: Arc<dyn TradeLog>) -> Self {
        self.trade_log = Some(trade_log);
        self
    }

    pub fn snapshots(mut self, snapshots: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> Result<TradingCore, CoreError> {
        let config = self.config;
        config.validate()?;

        let exchange = self
            .exchange
            .unwrap_or_else(|| Arc::new(DryRunExchange::new()));
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FileMarketSource::new(&config.markets_file)));
        let volatility = self
            .volatility
            .unwrap_or_else(|| Arc::new(VolatilityTable::new()));
        let trade_log: Arc<dyn TradeLog> = match self.trade_log {
            Some(sink) => sink,
            None => Arc::new(JsonlSink::open(&config.trade_log_file)?),
        };
        let snapshots: Arc<dyn SnapshotSink> = match self.snapshots {
            Some(sink) => sink,
            None => Arc::new(JsonlSink::open(&config.snapshot_file)?),
        };
        // Missing credentials are fatal at startup, not at first use.
        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => ApiCredentials::from_env()?,
        };

        Ok(TradingCore {
            config,
            exchange,
            source,
            volatility,
            trade_log,
            snapshots,
            credentials,
        })
    }
}

pub struct TradingCore {
    config: AppConfig,
    exchange: SharedExchange,
    source: Arc<dyn MarketSource>,
    volatility: Arc<dyn VolatilitySource>,
    trade_log: Arc<dyn TradeLog>,
    snapshots: Arc<dyn SnapshotSink>,
    credentials: ApiCredentials,
}

impl TradingCore {
    pub fn builder(config: AppConfig) -> TradingCoreBuilder {
        TradingCoreBuilder {
            config,
            exchange: None,
            source: None,
            volatility: None,
            trade_log: None,
            snapshots: None,
            credentials: None,
        }
    }

    /// Run until `shutdown` flips to true. `reload_registry` forces a
    /// registry reload out of cadence (the SIGHUP surface).
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        reload_registry: Arc<Notify>,
    ) -> Result<(), CoreError> {
        self.config.log();

        // Shared state owned by the core.
        let books = Arc::new(BookStore::new());
        let account = Arc::new(AccountState::new());
        let pending = Arc::new(PendingIntents::new(Duration::from_secs(
            self.config.tuning.pending_ttl_secs,
        )));
        let risk = Arc::new(RiskOffRegistry::open(&self.config.risk_state_dir)?);
        let registry = Arc::new(MarketRegistry::new());
        let bus = TriggerBus::new();
        let pull_now = Arc::new(Notify::new());
        let pull_epoch = Arc::new(AtomicU64::new(0));

        // First universe load is fatal on failure; later reloads are not.
        let universe = self.source.load().await?;
        registry.refresh(universe);
        let enabled: Vec<String> = registry
            .enabled_markets()
            .into_iter()
            .map(|entry| entry.market.condition_id)
            .collect();
        info!(
            "[Core] Universe: {} markets, {} enabled",
            registry.len(),
            enabled.len()
        );

        let tokens: SharedTokenSet = Arc::new(RwLock::new(registry.subscription_tokens()));

        let market_stream = Arc::new(spawn_market_stream(
            &self.config.streams.market_ws_url,
            Arc::clone(&books),
            Arc::clone(&registry),
            bus.clone(),
            Arc::clone(&tokens),
            Arc::clone(&pull_now),
        ));
        let user_stream = spawn_user_stream(
            &self.config.streams.user_ws_url,
            Arc::clone(&account),
            Arc::clone(&pending),
            bus.clone(),
            Arc::clone(&self.trade_log),
            self.credentials.clone(),
            Arc::clone(&pull_now),
        );

        let worker_ctx = WorkerCtx {
            books: Arc::clone(&books),
            account: Arc::clone(&account),
            risk: Arc::clone(&risk),
            registry: Arc::clone(&registry),
            exchange: Arc::clone(&self.exchange),
            volatility: Arc::clone(&self.volatility),
            tuning: self.config.tuning,
            pull_now: Arc::clone(&pull_now),
            pull_epoch: Arc::clone(&pull_epoch),
        };
        let workers = Arc::new(WorkerSet::new(worker_ctx, bus.clone(), shutdown.clone()));
        workers.sync(&enabled);

        let scheduler = Scheduler::new(
            SchedulerCtx {
                exchange: Arc::clone(&self.exchange),
                account: Arc::clone(&account),
                pending: Arc::clone(&pending),
                registry: Arc::clone(&registry),
                source: Arc::clone(&self.source),
                books: Arc::clone(&books),
                bus: bus.clone(),
                workers: Arc::clone(&workers),
                snapshots: Arc::clone(&self.snapshots),
                tokens: Arc::clone(&tokens),
                market_stream: Arc::clone(&market_stream),
                tuning: self.config.tuning,
                cadence: self.config.cadence,
                pull_epoch: Arc::clone(&pull_epoch),
            },
            Arc::clone(&pull_now),
            reload_registry,
            shutdown.clone(),
        );
        let scheduler_task = tokio::spawn(scheduler.run());

        info!("[Core] Running");
        while shutdown.changed().await.is_ok() {
            if *shutdown.borrow() {
                break;
            }
        }

        info!("[Core] Shutting down");
        let _ = market_stream.shutdown().await;
        let _ = user_stream.shutdown().await;
        let _ = scheduler_task.await;
        workers.join_all().await;
        info!("[Core] Stopped");
        Ok(())
    }
}
